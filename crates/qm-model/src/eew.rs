//! Unified Earthquake Early Warning model.
//!
//! Two independent inputs produce values of these types: the streamed
//! official telegrams (`svir` side) and the polled legacy intensity-image
//! endpoint (`kmoni` side). The arbitration middleware in the service picks
//! between the per-source [`EewView`]s; [`EewEvent`] is the normalized
//! parse result of one telegram.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::intensity::{Intensity, IntensityInterval, LgIntensity, LgIntensityInterval};

/// Lifecycle of an EEW event derived from the telegram control/info status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EewLifecycle {
    #[default]
    Normal,
    Cancelled,
    Training,
    Test,
}

/// Hypocenter depth, in positive kilometers after the coordinate-string
/// sign flip, or one of the sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Depth {
    Km(u32),
    Shallow,
    #[default]
    Unknown,
    Over700,
}

impl Depth {
    /// Canonical construction: `0` is shallow, `-1` (or anything negative)
    /// is unknown, `700` and beyond is the deep sentinel.
    pub fn from_km(km: i64) -> Self {
        match km {
            0 => Self::Shallow,
            k if k < 0 => Self::Unknown,
            k if k >= 700 => Self::Over700,
            k => Self::Km(k as u32),
        }
    }

    /// Kilometers when concrete; sentinels have no numeric depth except
    /// `Shallow` (0) and `Over700` (700).
    pub fn km(self) -> Option<u32> {
        match self {
            Self::Km(k) => Some(k),
            Self::Shallow => Some(0),
            Self::Over700 => Some(700),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Km(k) => write!(f, "{k}km"),
            Self::Shallow => write!(f, "Shallow"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Over700 => write!(f, "Over 700km"),
        }
    }
}

/// Magnitude, or the sentinels the feeds use for "not determined yet".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Magnitude {
    Value(f64),
    #[default]
    Unknown,
    Over8,
}

impl std::fmt::Display for Magnitude {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(m) => write!(f, "{m}"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Over8 => write!(f, "Over 8"),
        }
    }
}

/// Out-of-range placeholder used by the upstream feeds for unknown
/// coordinates.
pub const COORD_UNKNOWN: f64 = -200.0;

/// Hypocenter of an EEW event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypocenter {
    pub name: String,
    /// JMA region code of the epicenter area.
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: Depth,
    pub magnitude: Magnitude,
    /// True when the hypocenter is assumption-based (PLUM).
    pub is_assumption: bool,
}

impl Default for Hypocenter {
    fn default() -> Self {
        Self {
            name: String::new(),
            code: String::new(),
            latitude: COORD_UNKNOWN,
            longitude: COORD_UNKNOWN,
            depth: Depth::Unknown,
            magnitude: Magnitude::Unknown,
            is_assumption: false,
        }
    }
}

/// A wall-clock instant carried both as epoch seconds and as the
/// `%Y/%m/%d %H:%M:%S` string the read API serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventTime {
    pub unix_time: i64,
    pub time_string: String,
}

/// Arrival predicate for one forecast area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EewArrival {
    pub flag: bool,
    pub condition: String,
    pub time: String,
}

impl Default for EewArrival {
    fn default() -> Self {
        Self {
            flag: false,
            condition: String::new(),
            time: "Unknown".to_owned(),
        }
    }
}

/// One per-area forecast row of an EEW telegram. The open `above` upper
/// bound is collapsed to the lower bound before it reaches this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EewForecastArea {
    pub code: String,
    pub name: String,
    pub lowest: Intensity,
    pub highest: Intensity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lg_lowest: Option<LgIntensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lg_highest: Option<LgIntensity>,
    /// True for rows issued under the warning kind.
    pub is_warn: bool,
    pub arrival: EewArrival,
}

/// Normalized EEW event parsed from one VXSE43/VXSE44 telegram.
///
/// A cancellation yields `lifecycle == Cancelled` with every other field
/// left at its blank default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EewEvent {
    pub lifecycle: EewLifecycle,
    /// Stable id across reports of the same earthquake.
    pub event_id: String,
    /// Monotonic revision within `event_id`, from 1.
    pub serial: u32,
    pub announced: EventTime,
    pub origin: EventTime,
    pub hypocenter: Hypocenter,
    pub max_intensity: IntensityInterval,
    pub max_lg_intensity: LgIntensityInterval,
    pub is_final: bool,
    pub is_warn: bool,
    pub forecast_areas: Vec<EewForecastArea>,
}

impl EewEvent {
    /// The blank cancelled event mandated for non-issued telegrams.
    pub fn cancelled() -> Self {
        Self {
            lifecycle: EewLifecycle::Cancelled,
            ..Self::default()
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.lifecycle == EewLifecycle::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Display-side view (what the arbitrator picks between and the API serves)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EewSource {
    Svir,
    Kmoni,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EewAlert {
    #[default]
    Forecast,
    Warning,
}

/// A single expected-intensity station sample (image-decoded side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationIntensity {
    pub name: String,
    pub area_code: String,
    pub sub_area_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub intensity: Intensity,
    /// Raw scalar before bucketing, two decimals.
    pub detail_intensity: f64,
    pub is_area: bool,
}

/// A per-area expected intensity (rolled-up side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaIntensity {
    pub name: String,
    pub intensity: Intensity,
    pub latitude: f64,
    pub longitude: f64,
    pub is_area: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lg_intensity: Option<LgIntensity>,
}

/// Area coloring block: the per-area map plus whether area display is
/// recommended (any area at intensity 4 or above).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AreaColoring {
    pub areas: BTreeMap<String, AreaIntensity>,
    pub recommended_areas: bool,
}

/// Hypocenter as displayed (depth kept symbolic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EewViewHypocenter {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: Depth,
}

/// One source's current EEW as the read API shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EewView {
    pub source: EewSource,
    pub is_plum: bool,
    pub is_cancel: bool,
    pub is_test: bool,
    pub max_intensity: Intensity,
    pub report_time: String,
    pub report_timestamp: i64,
    pub occur_timestamp: i64,
    pub report_num: u32,
    pub report_flag: EewAlert,
    pub report_id: String,
    pub is_final: bool,
    pub magnitude: Magnitude,
    pub hypocenter: EewViewHypocenter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_intensities: Option<BTreeMap<String, StationIntensity>>,
    pub area_coloring: AreaColoring,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_wave: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s_wave: Option<f64>,
}

impl EewView {
    /// The blank cancelled view served after a cancellation telegram.
    pub fn cancelled(source: EewSource) -> Self {
        Self {
            source,
            is_plum: false,
            is_cancel: true,
            is_test: false,
            max_intensity: Intensity::None,
            report_time: String::new(),
            report_timestamp: 0,
            occur_timestamp: 0,
            report_num: 0,
            report_flag: EewAlert::Forecast,
            report_id: String::new(),
            is_final: true,
            magnitude: Magnitude::Unknown,
            hypocenter: EewViewHypocenter::default(),
            station_intensities: None,
            area_coloring: AreaColoring::default(),
            p_wave: None,
            s_wave: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_sentinels() {
        assert_eq!(Depth::from_km(0), Depth::Shallow);
        assert_eq!(Depth::from_km(-1), Depth::Unknown);
        assert_eq!(Depth::from_km(700), Depth::Over700);
        assert_eq!(Depth::from_km(10), Depth::Km(10));
        assert_eq!(Depth::Km(30).to_string(), "30km");
        assert_eq!(Depth::Shallow.to_string(), "Shallow");
    }

    #[test]
    fn cancelled_event_is_blank() {
        let e = EewEvent::cancelled();
        assert!(e.is_cancel());
        assert_eq!(e.serial, 0);
        assert!(e.forecast_areas.is_empty());
        assert_eq!(e.hypocenter.depth, Depth::Unknown);
    }
}
