//! Tsunami expectation and observation models.

use serde::{Deserialize, Serialize};

/// Warning grade of one tsunami forecast area, derived from the Japanese
/// category name by substring match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TsunamiGrade {
    MajorWarning,
    Warning,
    Watch,
    Forecast,
    #[default]
    Unknown,
}

/// Expected maximum height classes used by the expectation telegrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TsunamiHeight {
    #[serde(rename = "巨大")]
    Huge,
    #[serde(rename = "高い")]
    High,
    #[serde(rename = "１０ｍ超")]
    TenMeterAbove,
    #[serde(rename = "１０ｍ")]
    TenMeter,
    #[serde(rename = "５ｍ")]
    FiveMeter,
    #[serde(rename = "３ｍ")]
    ThreeMeter,
    #[serde(rename = "１ｍ")]
    OneMeter,
    #[serde(rename = "０．２ｍ未満")]
    LesserThanTwoDecimeter,
    #[default]
    Unknown,
}

impl TsunamiHeight {
    /// Total mapping from the telegram height description.
    pub fn from_description(desc: &str) -> Self {
        match desc.trim() {
            "巨大" => Self::Huge,
            "高い" => Self::High,
            "１０ｍ超" => Self::TenMeterAbove,
            "１０ｍ" => Self::TenMeter,
            "５ｍ" => Self::FiveMeter,
            "３ｍ" => Self::ThreeMeter,
            "１ｍ" => Self::OneMeter,
            "０．２ｍ未満" => Self::LesserThanTwoDecimeter,
            _ => Self::Unknown,
        }
    }
}

/// First-wave arrival: either a concrete time or one of the special
/// status values carried when only a condition is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TsunamiTime {
    #[serde(rename = "time")]
    Concrete { time: String, timestamp: i64 },
    #[serde(rename = "no_time")]
    Special { time: String, status: i8 },
}

impl TsunamiTime {
    pub fn unknown() -> Self {
        Self::Special {
            time: "Unknown".to_owned(),
            status: -1,
        }
    }

    pub fn arriving_now() -> Self {
        Self::Special {
            time: "Arriving Now".to_owned(),
            status: 0,
        }
    }

    pub fn arrival_expected() -> Self {
        Self::Special {
            time: "Arrival Expected".to_owned(),
            status: 1,
        }
    }

    pub fn arrived() -> Self {
        Self::Special {
            time: "Arrived".to_owned(),
            status: 2,
        }
    }
}

/// One area row of a tsunami expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsunamiExpectationArea {
    pub name: String,
    pub grade: TsunamiGrade,
    pub height: TsunamiHeight,
    pub time: TsunamiTime,
}

/// Which path produced the expectation snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsunamiParseOrigin {
    TsunamiExpectation,
    TsunamiWatch,
}

/// Current tsunami expectation state: warning/advisory areas and the
/// forecast ("slight sea-level change") areas, partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TsunamiExpectationSnapshot {
    pub receive_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<TsunamiParseOrigin>,
    pub areas: Vec<TsunamiExpectationArea>,
    pub forecast_areas: Vec<TsunamiExpectationArea>,
}

/// Observation condition of one tide station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsunamiObsCondition {
    /// Slight fluctuation (`微弱`).
    Weak,
    /// Still observing, no height yet.
    Observing,
    #[serde(rename = "None")]
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TsunamiHeightCondition {
    Rising,
    #[default]
    #[serde(rename = "None")]
    No,
}

/// One observed station row of a tsunami observation telegram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsunamiObservationStation {
    pub name: String,
    pub condition: TsunamiObsCondition,
    /// Textual height (`"0.2m"`), `"None"` when the condition
    /// short-circuits the numeric value.
    pub height: String,
    pub height_condition: TsunamiHeightCondition,
    /// True when the description marks the height as "or above" (`以上`).
    pub height_is_max: bool,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TsunamiObservationSnapshot {
    pub receive_time: String,
    pub areas: Vec<TsunamiObservationStation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_description_mapping_is_total() {
        assert_eq!(TsunamiHeight::from_description("巨大"), TsunamiHeight::Huge);
        assert_eq!(
            TsunamiHeight::from_description("１０ｍ超"),
            TsunamiHeight::TenMeterAbove
        );
        assert_eq!(
            TsunamiHeight::from_description("whatever"),
            TsunamiHeight::Unknown
        );
    }

    #[test]
    fn special_times_carry_status_codes() {
        assert_eq!(
            TsunamiTime::arriving_now(),
            TsunamiTime::Special {
                time: "Arriving Now".to_owned(),
                status: 0
            }
        );
        assert_eq!(
            TsunamiTime::unknown(),
            TsunamiTime::Special {
                time: "Unknown".to_owned(),
                status: -1
            }
        );
    }
}
