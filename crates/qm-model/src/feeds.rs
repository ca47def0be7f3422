//! Response models for the polled HTTP feeds: P2P earthquake history,
//! the shake-level gauge, the kmoni EEW endpoint and the CEIC global
//! seismicity list.
//!
//! Field names follow each upstream's JSON; a few fields arrive as
//! `bool | ""` or `int | ""` unions and get lenient deserializers.

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Lenient field helpers
// ---------------------------------------------------------------------------

/// kmoni booleans arrive as `true`/`false` or the empty string.
fn bool_or_blank<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::Bool(b) => b,
        Raw::Text(s) => s == "true",
    })
}

/// kmoni report numbers arrive as an integer or the empty string.
fn u32_or_blank<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Text(String),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::Num(n) => n,
        Raw::Text(s) => s.parse().unwrap_or(0),
    })
}

// ---------------------------------------------------------------------------
// P2P earthquake history (codes 551 / 552)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct P2pIssue {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub time: String,
    #[serde(rename = "type", default)]
    pub issue_type: String,
    #[serde(default)]
    pub correct: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct P2pHypocenter {
    #[serde(default)]
    pub name: String,
    #[serde(default = "coord_unknown")]
    pub latitude: f64,
    #[serde(default = "coord_unknown")]
    pub longitude: f64,
    #[serde(default = "depth_unknown")]
    pub depth: i64,
    #[serde(default = "magnitude_unknown")]
    pub magnitude: f64,
}

fn coord_unknown() -> f64 {
    crate::eew::COORD_UNKNOWN
}
fn depth_unknown() -> i64 {
    -1
}
fn magnitude_unknown() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct P2pEarthquake {
    #[serde(default)]
    pub time: String,
    pub hypocenter: Option<P2pHypocenter>,
    #[serde(rename = "maxScale", default = "scale_unknown")]
    pub max_scale: i64,
    #[serde(rename = "domesticTsunami", default)]
    pub domestic_tsunami: String,
    #[serde(rename = "foreignTsunami", default)]
    pub foreign_tsunami: String,
}

fn scale_unknown() -> i64 {
    -1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct P2pPoint {
    #[serde(default)]
    pub pref: String,
    #[serde(default)]
    pub addr: String,
    #[serde(rename = "isArea", default)]
    pub is_area: bool,
    #[serde(default = "scale_unknown")]
    pub scale: i64,
}

/// One `code = 551` history entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct P2pQuakeEntry {
    pub id: String,
    #[serde(default)]
    pub time: String,
    pub issue: P2pIssue,
    pub earthquake: P2pEarthquake,
    #[serde(default)]
    pub points: Vec<P2pPoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct P2pTsunamiArea {
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub name: String,
}

/// One `code = 552` history entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct P2pTsunamiEntry {
    pub id: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub areas: Vec<P2pTsunamiArea>,
}

// ---------------------------------------------------------------------------
// Shake-level gauge
// ---------------------------------------------------------------------------

/// Upstream gauge JSON with its one-letter field names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShakeLevelResponse {
    #[serde(rename = "l")]
    pub shake_level: i64,
    #[serde(rename = "g")]
    pub green: i64,
    #[serde(rename = "y")]
    pub yellow: i64,
    #[serde(rename = "r")]
    pub red: i64,
    #[serde(rename = "t", default)]
    pub sync_time: String,
}

/// Snapshot served by the read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShakeLevelSnapshot {
    pub status: i64,
    pub shake_level: i64,
    pub green: i64,
    pub yellow: i64,
    pub red: i64,
}

// ---------------------------------------------------------------------------
// kmoni EEW endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KmoniResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// `latest.json`: the vendor clock used to build the timestamped URLs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KmoniLatestTime {
    pub latest_time: String,
    #[serde(default)]
    pub request_time: String,
    pub result: KmoniResult,
}

/// The timestamped EEW JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KmoniEew {
    pub result: KmoniResult,
    #[serde(default)]
    pub report_time: String,
    #[serde(default)]
    pub region_code: String,
    #[serde(default)]
    pub region_name: String,
    #[serde(default)]
    pub longitude: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(deserialize_with = "bool_or_blank", default)]
    pub is_cancel: bool,
    #[serde(default)]
    pub depth: String,
    #[serde(rename = "calcintensity", default)]
    pub calculated_intensity: String,
    #[serde(deserialize_with = "bool_or_blank", default)]
    pub is_final: bool,
    #[serde(deserialize_with = "bool_or_blank", default)]
    pub is_training: bool,
    #[serde(default)]
    pub origin_time: String,
    #[serde(rename = "magunitude", default)]
    pub magnitude: String,
    #[serde(rename = "report_num", deserialize_with = "u32_or_blank", default)]
    pub report_number: u32,
    #[serde(default)]
    pub report_id: String,
    #[serde(rename = "alertflg", default)]
    pub alert_flag: Option<String>,
}

// ---------------------------------------------------------------------------
// CEIC global seismicity
// ---------------------------------------------------------------------------

/// One CEIC row; only the fields the service consumes are kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CeicEntry {
    #[serde(rename = "EPI_LAT")]
    pub latitude: String,
    #[serde(rename = "EPI_LON")]
    pub longitude: String,
    #[serde(rename = "EPI_DEPTH")]
    pub depth: f64,
    #[serde(rename = "O_TIME")]
    pub origin_time: String,
    #[serde(rename = "M")]
    pub magnitude: String,
    #[serde(rename = "LOCATION_C")]
    pub location: String,
    #[serde(rename = "SYNC_TIME", default)]
    pub sync_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEpicenter {
    pub name: String,
    pub depth: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One normalized global earthquake row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEarthquake {
    pub epicenter: GlobalEpicenter,
    pub magnitude: String,
    /// Modified Mercalli bucket derived from the Richter magnitude.
    pub mmi: u8,
    pub occur_time: String,
    pub receive_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmoni_blank_unions_deserialize() {
        let json = r#"{
            "result": {"status": "ok", "message": ""},
            "report_time": "2026/01/01 12:00:10",
            "is_cancel": "",
            "is_final": true,
            "is_training": "",
            "report_num": "",
            "calcintensity": "5弱",
            "magunitude": "6.1",
            "alertflg": "予報"
        }"#;
        let eew: KmoniEew = serde_json::from_str(json).unwrap();
        assert!(!eew.is_cancel);
        assert!(eew.is_final);
        assert_eq!(eew.report_number, 0);
        assert_eq!(eew.alert_flag.as_deref(), Some("予報"));
    }

    #[test]
    fn shake_level_uses_single_letter_aliases() {
        let json = r#"{"l": 1200, "g": 210, "y": 40, "r": 3, "t": "11:45"}"#;
        let level: ShakeLevelResponse = serde_json::from_str(json).unwrap();
        assert_eq!(level.shake_level, 1200);
        assert_eq!(level.red, 3);
    }

    #[test]
    fn p2p_entry_defaults_missing_hypocenter_fields() {
        let json = r#"{
            "id": "abc",
            "time": "2026/01/01 12:00:00",
            "issue": {"source": "", "time": "", "type": "ScalePrompt"},
            "earthquake": {"time": "2026/01/01 11:59:00", "maxScale": 45,
                           "domesticTsunami": "None", "foreignTsunami": "None",
                           "hypocenter": {"name": ""}},
            "points": []
        }"#;
        let entry: P2pQuakeEntry = serde_json::from_str(json).unwrap();
        let hypo = entry.earthquake.hypocenter.unwrap();
        assert_eq!(hypo.depth, -1);
        assert_eq!(hypo.latitude, crate::eew::COORD_UNKNOWN);
        assert_eq!(entry.earthquake.max_scale, 45);
    }
}
