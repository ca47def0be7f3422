//! Earthquake report model (intensity reports, destination reports,
//! detail-scale reports) and the per-area intensity rollup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::eew::Depth;
use crate::intensity::Intensity;

/// What kind of report a telegram (or P2P history row) is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarthquakeIssueType {
    /// Intensity-only prompt report (no hypocenter yet).
    ScalePrompt,
    /// Hypocenter (destination) report.
    Destination,
    ScaleAndDestination,
    /// Full per-station intensity + hypocenter report.
    DetailScale,
    Foreign,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DomesticTsunami {
    #[serde(rename = "None")]
    No,
    #[default]
    Unknown,
    Checking,
    NonEffective,
    Watch,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ForeignTsunami {
    #[serde(rename = "None")]
    No,
    #[default]
    Unknown,
    Checking,
    NonEffectiveNearby,
    WarningNearby,
    WarningPacific,
    WarningPacificWide,
    WarningNorthwestPacific,
    WarningIndian,
    WarningIndianWide,
    Potential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TsunamiComment {
    pub domestic: DomesticTsunami,
    pub foreign: ForeignTsunami,
}

/// Epicenter as served by the read API; blank (`None` at the report level)
/// for intensity-only reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epicenter {
    pub name: String,
    pub depth: Depth,
    pub latitude: f64,
    pub longitude: f64,
}

/// One point of the per-area intensity rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaIntensityPoint {
    pub name: String,
    pub intensity: Intensity,
    pub latitude: f64,
    pub longitude: f64,
    pub is_area: bool,
}

/// A station point additionally carries its sub-region, which drives the
/// station→area rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationIntensityPoint {
    pub name: String,
    pub intensity: Intensity,
    pub latitude: f64,
    pub longitude: f64,
    pub is_area: bool,
    pub region_code: String,
    pub region_name: String,
}

/// The rollup: every station contributes to its region; each area keeps the
/// maximum station intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AreaIntensityRollup {
    pub areas: BTreeMap<String, AreaIntensityPoint>,
    pub station: BTreeMap<String, StationIntensityPoint>,
}

impl AreaIntensityRollup {
    /// Area display is recommended when any rolled-up area reaches 4.
    pub fn recommend_areas(&self) -> bool {
        self.areas
            .values()
            .any(|a| a.intensity >= Intensity::Four)
    }
}

/// One normalized earthquake report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeReport {
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: EarthquakeIssueType,
    pub occur_time: String,
    pub receive_time: String,
    pub magnitude: String,
    pub max_intensity: Intensity,
    pub tsunami_comments: TsunamiComment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypocenter: Option<Epicenter>,
    pub area_intensity: AreaIntensityRollup,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(name: &str, intensity: Intensity) -> AreaIntensityPoint {
        AreaIntensityPoint {
            name: name.to_owned(),
            intensity,
            latitude: 35.0,
            longitude: 139.0,
            is_area: true,
        }
    }

    #[test]
    fn recommend_areas_at_four_and_above() {
        let mut rollup = AreaIntensityRollup::default();
        rollup
            .areas
            .insert("a".to_owned(), area("a", Intensity::Three));
        assert!(!rollup.recommend_areas());
        rollup
            .areas
            .insert("b".to_owned(), area("b", Intensity::Four));
        assert!(rollup.recommend_areas());
    }
}
