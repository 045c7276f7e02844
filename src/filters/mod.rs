//! Session-scoped sensor filters
//!
//! Each filter is owned by the session's sensor pipeline and reset at
//! session start and stop.

pub mod altitude;
pub mod position;

pub use altitude::{AltitudeConfig, AltitudeFuser};
pub use position::{FilteredPosition, PositionFilter, PositionFilterConfig};
