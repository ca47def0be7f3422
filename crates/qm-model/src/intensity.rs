//! Seismic intensity scales.
//!
//! Two scales exist side by side: the plain JMA scale (`1`..`7` with the
//! split 5/6 classes) and the long-period ground motion scale (`<1`..`4`).
//! Each has a paired "to" variant carrying an `Above` sentinel meaning
//! "at least the lower bound, upper open".
//!
//! Every `from_code` mapping is total: codes we do not recognize collapse
//! to `None` rather than failing the whole telegram.

use serde::{Deserialize, Serialize};

/// JMA seismic intensity class, ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Intensity {
    #[default]
    #[serde(rename = "0")]
    None,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5-")]
    FiveLower,
    #[serde(rename = "5+")]
    FiveUpper,
    #[serde(rename = "6-")]
    SixLower,
    #[serde(rename = "6+")]
    SixUpper,
    #[serde(rename = "7")]
    Seven,
}

impl Intensity {
    /// Total mapping from the source-specific codes seen across feeds:
    /// JMA XML (`5-`), kmoni JSON (`5弱`), and P2P numeric scales.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => Self::One,
            "2" => Self::Two,
            "3" => Self::Three,
            "4" => Self::Four,
            "5-" | "5弱" => Self::FiveLower,
            "5+" | "5強" => Self::FiveUpper,
            "6-" | "6弱" => Self::SixLower,
            "6+" | "6強" => Self::SixUpper,
            "7" => Self::Seven,
            _ => Self::None,
        }
    }

    /// P2P earthquake feeds encode intensity as `10 | 20 | ... | 70`
    /// with `45/46/50/55/60` for the split classes.
    pub fn from_p2p_scale(scale: i64) -> Self {
        match scale {
            10 => Self::One,
            20 => Self::Two,
            30 => Self::Three,
            40 => Self::Four,
            45 | 46 => Self::FiveLower,
            50 => Self::FiveUpper,
            55 => Self::SixLower,
            60 => Self::SixUpper,
            70 => Self::Seven,
            _ => Self::None,
        }
    }

    /// Numeric rank used for per-area maxima (0 = none .. 9 = seven).
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "0",
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::FiveLower => "5-",
            Self::FiveUpper => "5+",
            Self::SixLower => "6-",
            Self::SixUpper => "6+",
            Self::Seven => "7",
        }
    }
}

/// Upper bound of a forecast interval: a concrete class or the open
/// `Above` sentinel (`over` in the source XML).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntensityTo {
    Value(Intensity),
    #[serde(rename = "over")]
    Above,
}

impl IntensityTo {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "over" => Self::Above,
            other => Self::Value(Intensity::from_code(other)),
        }
    }

    /// Collapse the open interval for display: `Above` adopts `lowest`.
    pub fn resolve(self, lowest: Intensity) -> Intensity {
        match self {
            Self::Value(v) => v,
            Self::Above => lowest,
        }
    }
}

/// Long-period ground motion class, ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum LgIntensity {
    #[default]
    #[serde(rename = "不明")]
    None,
    #[serde(rename = "0")]
    LessThanOne,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
}

impl LgIntensity {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => Self::LessThanOne,
            "1" => Self::One,
            "2" => Self::Two,
            "3" => Self::Three,
            "4" => Self::Four,
            _ => Self::None,
        }
    }
}

/// Upper bound of a long-period forecast interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LgIntensityTo {
    Value(LgIntensity),
    #[serde(rename = "over")]
    Above,
}

impl LgIntensityTo {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "over" => Self::Above,
            other => Self::Value(LgIntensity::from_code(other)),
        }
    }

    pub fn resolve(self, lowest: LgIntensity) -> LgIntensity {
        match self {
            Self::Value(v) => v,
            Self::Above => lowest,
        }
    }
}

/// A forecast interval `(lowest, highest)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IntensityInterval {
    pub lowest: Intensity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest: Option<IntensityTo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LgIntensityInterval {
    pub lowest: LgIntensity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest: Option<LgIntensityTo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_ordering_follows_scale() {
        assert!(Intensity::FiveLower < Intensity::FiveUpper);
        assert!(Intensity::SixUpper < Intensity::Seven);
        assert!(Intensity::None < Intensity::One);
    }

    #[test]
    fn unknown_codes_collapse_to_none() {
        assert_eq!(Intensity::from_code("震度５弱以上未入電"), Intensity::None);
        assert_eq!(Intensity::from_code(""), Intensity::None);
        assert_eq!(LgIntensity::from_code("9"), LgIntensity::None);
    }

    #[test]
    fn kanji_and_ascii_codes_agree() {
        assert_eq!(Intensity::from_code("5弱"), Intensity::from_code("5-"));
        assert_eq!(Intensity::from_code("6強"), Intensity::from_code("6+"));
    }

    #[test]
    fn above_resolves_to_lowest() {
        assert_eq!(
            IntensityTo::Above.resolve(Intensity::FiveUpper),
            Intensity::FiveUpper
        );
        assert_eq!(
            IntensityTo::Value(Intensity::Seven).resolve(Intensity::FiveUpper),
            Intensity::Seven
        );
    }

    #[test]
    fn p2p_scale_mapping_is_total() {
        assert_eq!(Intensity::from_p2p_scale(45), Intensity::FiveLower);
        assert_eq!(Intensity::from_p2p_scale(46), Intensity::FiveLower);
        assert_eq!(Intensity::from_p2p_scale(-1), Intensity::None);
        assert_eq!(Intensity::from_p2p_scale(9999), Intensity::None);
    }
}
