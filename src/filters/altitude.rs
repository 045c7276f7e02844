use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AltitudeConfig {
    /// Low-pass smoothing factor for raw pressure
    pub pressure_alpha: f64,
    /// GPS altitude accuracy (m) at or below which a fix may anchor/correct
    pub good_gps_accuracy_m: f64,
    /// Barometric scale height (m)
    pub barometric_constant: f64,
    /// Fraction of the GPS-vs-baro residual folded into the anchor per good fix
    pub drift_correction_beta: f64,
}

impl Default for AltitudeConfig {
    fn default() -> Self {
        Self {
            pressure_alpha: 0.25,
            good_gps_accuracy_m: 8.0,
            barometric_constant: 8434.0,
            drift_correction_beta: 0.02,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AltitudeAnchor {
    pub pressure_hpa: f64,
    pub altitude_m: f64,
}

/// Barometric altitude pinned to a single good GPS altitude.
///
/// Pressure gives smooth relative altitude but drifts with weather; GPS
/// altitude is noisy but unbiased. After the first good GPS fix sets the
/// anchor, altitude follows pressure and each later good fix nudges the
/// anchor by `beta` of the residual.
#[derive(Clone, Debug)]
pub struct AltitudeFuser {
    config: AltitudeConfig,
    filtered_pressure: Option<f64>,
    anchor: Option<AltitudeAnchor>,
    last_fused: Option<f64>,
}

impl AltitudeFuser {
    pub fn new(config: AltitudeConfig) -> Self {
        AltitudeFuser {
            config,
            filtered_pressure: None,
            anchor: None,
            last_fused: None,
        }
    }

    /// Fuse one sample. Returns the best altitude estimate available, or
    /// `None` when neither pressure nor GPS has produced anything yet.
    pub fn update(
        &mut self,
        pressure_hpa: Option<f64>,
        gps_altitude: Option<f64>,
        gps_altitude_accuracy: Option<f64>,
    ) -> Option<f64> {
        let pressure = pressure_hpa
            .filter(|p| p.is_finite() && *p > 0.0)
            .map(|p| self.smooth_pressure(p));

        let good_gps = match (gps_altitude, gps_altitude_accuracy) {
            (Some(alt), Some(acc)) if acc > 0.0 && acc <= self.config.good_gps_accuracy_m => {
                Some(alt)
            }
            _ => None,
        };

        let fused = match (pressure, self.anchor) {
            (Some(p), Some(anchor)) => {
                let fused = self.barometric_altitude(anchor, p);
                if let (Some(gps), Some(anchor)) = (good_gps, self.anchor.as_mut()) {
                    anchor.altitude_m += self.config.drift_correction_beta * (gps - fused);
                }
                Some(fused)
            }
            (Some(p), None) => match good_gps {
                Some(gps) => {
                    debug!("altitude anchored at {:.1} m / {:.2} hPa", gps, p);
                    self.anchor = Some(AltitudeAnchor {
                        pressure_hpa: p,
                        altitude_m: gps,
                    });
                    Some(gps)
                }
                None => gps_altitude.or(self.last_fused),
            },
            (None, _) => gps_altitude.or(self.last_fused),
        };

        if fused.is_some() {
            self.last_fused = fused;
        }
        fused
    }

    fn smooth_pressure(&mut self, raw: f64) -> f64 {
        let next = match self.filtered_pressure {
            Some(prev) => prev + self.config.pressure_alpha * (raw - prev),
            None => raw,
        };
        self.filtered_pressure = Some(next);
        next
    }

    fn barometric_altitude(&self, anchor: AltitudeAnchor, pressure_hpa: f64) -> f64 {
        anchor.altitude_m + self.config.barometric_constant * (anchor.pressure_hpa / pressure_hpa).ln()
    }

    pub fn anchor(&self) -> Option<AltitudeAnchor> {
        self.anchor
    }

    pub fn reset(&mut self) {
        self.filtered_pressure = None;
        self.anchor = None;
        self.last_fused = None;
    }
}

impl Default for AltitudeFuser {
    fn default() -> Self {
        Self::new(AltitudeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_falls_back_to_gps_before_anchor() {
        let mut fuser = AltitudeFuser::default();
        assert_eq!(fuser.update(None, None, None), None);
        assert_eq!(fuser.update(Some(1013.0), Some(52.0), Some(20.0)), Some(52.0));
        assert!(fuser.anchor().is_none());
        // no GPS altitude this time: hold the last value
        assert_eq!(fuser.update(Some(1013.0), None, None), Some(52.0));
    }

    #[test]
    fn test_anchor_then_relative_altitude() {
        let mut fuser = AltitudeFuser::default();
        assert_eq!(fuser.update(Some(1000.0), Some(100.0), Some(5.0)), Some(100.0));
        let anchor = fuser.anchor().unwrap();
        assert_eq!(anchor.pressure_hpa, 1000.0);

        // Hold pressure at the new value long enough for the low-pass to settle
        let mut alt = 0.0;
        for _ in 0..60 {
            alt = fuser.update(Some(990.0), None, None).unwrap();
        }
        let expected = 100.0 + 8434.0 * (1000.0f64 / 990.0).ln();
        assert_relative_eq!(alt, expected, epsilon = 0.01);
    }

    #[test]
    fn test_good_gps_nudges_anchor() {
        let mut fuser = AltitudeFuser::default();
        fuser.update(Some(1000.0), Some(100.0), Some(5.0));

        // Baro says 100 m, GPS says 150 m: anchor moves by beta * 50
        let fused = fuser.update(Some(1000.0), Some(150.0), Some(5.0)).unwrap();
        assert_relative_eq!(fused, 100.0, epsilon = 1e-9);
        assert_relative_eq!(fuser.anchor().unwrap().altitude_m, 101.0, epsilon = 1e-9);

        // Poor GPS accuracy does not touch the anchor
        fuser.update(Some(1000.0), Some(300.0), Some(30.0));
        assert_relative_eq!(fuser.anchor().unwrap().altitude_m, 101.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_clears_anchor() {
        let mut fuser = AltitudeFuser::default();
        fuser.update(Some(1000.0), Some(100.0), Some(5.0));
        fuser.reset();
        assert!(fuser.anchor().is_none());
        assert_eq!(fuser.update(None, None, None), None);
    }
}
