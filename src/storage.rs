use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::live_activity::iso8601;
use crate::session::RunContext;
use crate::types::Telemetry;

/// Write the telemetry log as compact-keyed JSON lines.
pub fn write_jsonl<W: Write>(writer: W, telemetries: &[Telemetry]) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    for record in telemetries {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a JSON-lines telemetry log. Blank lines are skipped.
pub fn read_jsonl<R: Read>(reader: R) -> Result<Vec<Telemetry>> {
    let mut out = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}

/// Open a file, transparently decompressing `.gz`.
pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().map(|ext| ext == "gz").unwrap_or(false) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

pub fn load_telemetry_log(path: &Path) -> Result<Vec<Telemetry>> {
    read_jsonl(open_maybe_gz(path)?)
}

pub fn save_telemetry_log(path: &Path, telemetries: &[Telemetry]) -> Result<()> {
    write_jsonl(File::create(path)?, telemetries)
}

#[derive(Debug, Serialize)]
pub struct GpxPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
    pub time: Option<String>,
}

/// GPX 1.1 track; paused stretches become separate track segments.
#[derive(Debug, Serialize)]
pub struct GpxTrack {
    pub name: String,
    pub segments: Vec<Vec<GpxPoint>>,
}

impl GpxTrack {
    pub fn from_telemetry(name: &str, telemetries: &[Telemetry]) -> Self {
        let mut segments: Vec<Vec<GpxPoint>> = Vec::new();
        let mut was_running = false;
        for t in telemetries {
            if !t.is_running {
                was_running = false;
                continue;
            }
            let point = GpxPoint {
                lat: t.lat,
                lon: t.lng,
                ele: t.alt,
                time: iso8601(t.time_stamp),
            };
            match segments.last_mut() {
                Some(seg) if was_running => seg.push(point),
                _ => segments.push(vec![point]),
            }
            was_running = true;
        }
        GpxTrack {
            name: name.to_string(),
            segments,
        }
    }

    pub fn to_gpx_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<gpx version=\"1.1\" creator=\"run_telemetry\">\n");
        xml.push_str("  <trk>\n");
        xml.push_str(&format!("    <name>{}</name>\n", escape_xml(&self.name)));
        for segment in &self.segments {
            xml.push_str("    <trkseg>\n");
            for point in segment {
                xml.push_str(&format!("      <trkpt lat=\"{}\" lon=\"{}\">\n", point.lat, point.lon));
                if let Some(ele) = point.ele {
                    xml.push_str(&format!("        <ele>{:.1}</ele>\n", ele));
                }
                if let Some(time) = &point.time {
                    xml.push_str(&format!("        <time>{}</time>\n", time));
                }
                xml.push_str("      </trkpt>\n");
            }
            xml.push_str("    </trkseg>\n");
        }
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");
        xml
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Stop-time handoff for the uploader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: Option<String>,
    pub duration_seconds: f64,
    pub distance_meters: f64,
    pub avg_pace_sec_per_km: Option<f64>,
    pub total_steps: u64,
    pub calories: f64,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    pub telemetry_count: usize,
    pub running_samples: usize,
    pub paused_samples: usize,
}

impl RunSummary {
    pub fn from_context(ctx: &RunContext) -> Self {
        let running_samples = ctx.telemetries.iter().filter(|t| t.is_running).count();
        if ctx.telemetries.len() != ctx.segments.last().map(|s| s.end).unwrap_or(0) {
            warn!("segment view does not cover the telemetry log");
        }
        RunSummary {
            session_id: ctx.session_id.clone(),
            duration_seconds: ctx.stats.total_time_ms as f64 / 1000.0,
            distance_meters: ctx.stats.total_distance_m,
            avg_pace_sec_per_km: ctx.stats.avg_pace_sec_per_km,
            total_steps: ctx.stats.total_steps,
            calories: ctx.stats.calories,
            elevation_gain_m: ctx.stats.gain_m,
            elevation_loss_m: ctx.stats.loss_m,
            telemetry_count: ctx.telemetries.len(),
            running_samples,
            paused_samples: ctx.telemetries.len() - running_samples,
        }
    }
}
