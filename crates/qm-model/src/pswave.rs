//! Travel-time table rows and the estimator result.

use serde::{Deserialize, Serialize};

/// One row of the JMA 2001 travel-time table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelTimeRow {
    pub p_time: f64,
    pub s_time: f64,
    pub depth: u32,
    pub distance: u32,
}

/// Interpolated wave-front distances; a side is `None` when the elapsed
/// time falls outside the bracketing rows for that wave.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PsWaveDistances {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s_distance: Option<f64>,
}
