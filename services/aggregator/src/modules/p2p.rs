//! Earthquake info module.
//!
//! Owns the earthquake log. The streaming client writes telegrams into it
//! through [`P2pModule::apply_stream_report`] (which enforces the
//! ScalePrompt→Destination ordering rule); the scheduler polls the P2P
//! history as a fallback whenever the stream is not healthy.

use qm_model::feeds::{P2pPoint, P2pQuakeEntry, P2pTsunamiEntry};
use qm_model::{
    DomesticTsunami, EarthquakeIssueType, EarthquakeReport, Epicenter, ForeignTsunami,
    Intensity, TsunamiComment, COORD_UNKNOWN,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use qm_model::Depth;

use crate::errors::ParseError;
use crate::fetch::HttpFetcher;
use crate::geodata::GeoData;
use crate::telegram::earthquake::{rollup_points, ObservedPoint};
use crate::telegram::EarthquakeOutcome;

const P2P_HISTORY_URL: &str = "https://api.p2pquake.net/v2/history?codes=551&codes=552&limit=5";
const TRAINING_SOURCE: &str = "TR.tr(\\";

/// Current tsunami block of the P2P feed (totals only).
#[derive(Debug, Clone, Serialize, Default)]
pub struct P2pTsunamiSummary {
    pub time: String,
    pub areas: Vec<P2pTsunamiAreaView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct P2pTsunamiAreaView {
    pub name: String,
    pub grade: String,
    pub immediate: bool,
    /// Coastline outline of the forecast area, when the reference table
    /// knows it.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coordinates: Vec<[f64; 2]>,
}

/// Read-side snapshot of the module.
#[derive(Debug, Clone, Serialize, Default)]
pub struct P2pSnapshot {
    pub earthquake: Vec<EarthquakeReport>,
    pub tsunami_in_effect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsunami: Option<P2pTsunamiSummary>,
}

#[derive(Default)]
struct P2pState {
    last_response: Vec<Value>,
    snapshot: P2pSnapshot,
    previous_earthquakes: Vec<EarthquakeReport>,
    saved_scale_prompt: Option<EarthquakeReport>,
    fetched_once: bool,
}

pub struct P2pModule {
    state: RwLock<P2pState>,
}

impl Default for P2pModule {
    fn default() -> Self {
        Self::new()
    }
}

impl P2pModule {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(P2pState::default()),
        }
    }

    /// Scheduled every 2 s. `stream_ok` short-circuits the poll once the
    /// streaming client is healthy and we have fetched at least once.
    pub async fn refresh(&self, fetcher: &HttpFetcher, geo: &GeoData, stream_ok: bool) {
        {
            let state = self.state.read().await;
            if stream_ok && state.fetched_once {
                debug!("stream healthy, skipping P2P poll");
                return;
            }
        }
        match fetcher.get_json::<Vec<Value>>(P2P_HISTORY_URL, 1).await {
            Ok(history) => {
                self.parse_history(&history, geo).await;
                self.state.write().await.fetched_once = true;
            }
            Err(e) => warn!(error = %e, "failed to fetch P2P history"),
        }
    }

    /// Diff the history against the previous response and parse only the
    /// new rows (except tsunami rows, which are always re-scanned so a
    /// cancellation is never missed).
    pub async fn parse_history(&self, content: &[Value], geo: &GeoData) {
        let mut state = self.state.write().await;
        let parsing_list: Vec<Value> = if state.last_response.is_empty() {
            debug!("first P2P parse, defaulting to the newest message");
            content.first().cloned().into_iter().collect()
        } else if state.last_response.as_slice() != content {
            content
                .iter()
                .filter(|entry| !state.last_response.iter().any(|prev| prev == *entry))
                .cloned()
                .collect()
        } else {
            debug!("no new earthquake information");
            return;
        };
        state.last_response = content.to_vec();
        state.snapshot.earthquake.clear();

        for entry in parsing_list.iter().rev() {
            if entry.get("code").and_then(Value::as_i64) == Some(551) {
                match serde_json::from_value::<P2pQuakeEntry>(entry.clone()) {
                    Ok(quake) => {
                        if let Some(report) = parse_p2p_earthquake(&quake, geo) {
                            state.snapshot.earthquake.push(report);
                            state.previous_earthquakes = state.snapshot.earthquake.clone();
                        }
                    }
                    Err(e) => error!(error = %e, "unexpected P2P earthquake shape"),
                }
            }
        }
        // Tsunami rows scan the full response: an in-effect flag must
        // survive even when the earthquake rows did not change.
        for entry in content.iter().rev() {
            if entry.get("code").and_then(Value::as_i64) == Some(552) {
                match serde_json::from_value::<P2pTsunamiEntry>(entry.clone()) {
                    Ok(tsunami) => apply_tsunami_entry(&mut state.snapshot, &tsunami, geo),
                    Err(e) => error!(error = %e, "unexpected P2P tsunami shape"),
                }
            }
        }
        info!("refreshed P2P info");
    }

    /// Apply one streamed earthquake telegram, enforcing the log ordering
    /// rule:
    /// - a `Destination` following a `ScalePrompt` replaces the tail with
    ///   the pair `[ScalePrompt, Destination]`;
    /// - otherwise it falls back to the saved prompt of matching id, and
    ///   both missing is a consistency violation (state unchanged);
    /// - anything else supersedes the log and clears the saved prompt.
    pub async fn apply_stream_report(
        &self,
        outcome: EarthquakeOutcome,
    ) -> Result<(), ParseError> {
        let mut state = self.state.write().await;
        match outcome {
            EarthquakeOutcome::Ignored => Ok(()),
            EarthquakeOutcome::Cancel => {
                if state.previous_earthquakes.is_empty() {
                    // Cancellation before anything was stored, or a second
                    // cancellation in a row. Nothing to revert to.
                    error!("tried to revert to an empty earthquake log");
                    return Ok(());
                }
                state.snapshot.earthquake = std::mem::take(&mut state.previous_earthquakes);
                Ok(())
            }
            EarthquakeOutcome::Report(report) => {
                let report = *report;
                match report.issue_type {
                    EarthquakeIssueType::ScalePrompt => {
                        state.saved_scale_prompt = Some(report.clone());
                        self.set_earthquakes(&mut state, vec![report]);
                        Ok(())
                    }
                    EarthquakeIssueType::Destination => {
                        let head = state.snapshot.earthquake.first().cloned();
                        if let Some(head) = head
                            .filter(|h| h.issue_type == EarthquakeIssueType::ScalePrompt)
                        {
                            self.set_earthquakes(&mut state, vec![head, report]);
                            return Ok(());
                        }
                        warn!("rare case: destination did not follow a scale prompt");
                        let Some(prompt) = state.saved_scale_prompt.clone() else {
                            return Err(ParseError::NoPriorScalePrompt { id: report.id });
                        };
                        if prompt.id != report.id {
                            return Err(ParseError::ScalePromptIdMismatch {
                                saved: prompt.id,
                                got: report.id,
                            });
                        }
                        self.set_earthquakes(&mut state, vec![prompt, report]);
                        Ok(())
                    }
                    _ => {
                        state.saved_scale_prompt = None;
                        self.set_earthquakes(&mut state, vec![report]);
                        Ok(())
                    }
                }
            }
        }
    }

    fn set_earthquakes(&self, state: &mut P2pState, list: Vec<EarthquakeReport>) {
        state.previous_earthquakes = state.snapshot.earthquake.clone();
        state.snapshot.earthquake = list;
    }

    pub async fn snapshot(&self) -> Option<P2pSnapshot> {
        let state = self.state.read().await;
        if state.snapshot.earthquake.is_empty() && !state.fetched_once {
            return None;
        }
        Some(state.snapshot.clone())
    }
}

/// Normalize one P2P 551 row. Training and `Other` rows yield `None`.
fn parse_p2p_earthquake(entry: &P2pQuakeEntry, geo: &GeoData) -> Option<EarthquakeReport> {
    if entry.issue.source == TRAINING_SOURCE {
        debug!("training message skipped");
        return None;
    }
    let issue_type = match entry.issue.issue_type.as_str() {
        "ScalePrompt" => EarthquakeIssueType::ScalePrompt,
        "Destination" => EarthquakeIssueType::Destination,
        "ScaleAndDestination" => EarthquakeIssueType::ScaleAndDestination,
        "DetailScale" => EarthquakeIssueType::DetailScale,
        "Foreign" => EarthquakeIssueType::Foreign,
        _ => {
            debug!(issue_type = %entry.issue.issue_type, "other earthquake message skipped");
            return None;
        }
    };

    let hypocenter = entry.earthquake.hypocenter.as_ref();
    let latitude = hypocenter.map_or(COORD_UNKNOWN, |h| h.latitude);
    let longitude = hypocenter.map_or(COORD_UNKNOWN, |h| h.longitude);
    let depth_km = hypocenter.map_or(-1, |h| h.depth);
    let magnitude_raw = hypocenter.map_or(-1.0, |h| h.magnitude);

    let epicenter = Epicenter {
        name: hypocenter.map(|h| h.name.clone()).unwrap_or_default(),
        depth: Depth::from_km(depth_km),
        latitude,
        longitude,
    };

    let domestic = match entry.earthquake.domestic_tsunami.as_str() {
        "Unknown" | "Checking" => DomesticTsunami::Checking,
        "Watch" | "Warning" => DomesticTsunami::Warning,
        "NonEffective" => DomesticTsunami::NonEffective,
        _ => DomesticTsunami::No,
    };
    let foreign = match entry.earthquake.foreign_tsunami.as_str() {
        "Checking" => ForeignTsunami::Checking,
        "NonEffectiveNearby" => ForeignTsunami::NonEffectiveNearby,
        "WarningNearby" => ForeignTsunami::WarningNearby,
        "WarningPacific" => ForeignTsunami::WarningPacific,
        "WarningPacificWide" => ForeignTsunami::WarningPacificWide,
        "WarningIndian" => ForeignTsunami::WarningIndian,
        "WarningIndianWide" => ForeignTsunami::WarningIndianWide,
        "Potential" => ForeignTsunami::Potential,
        _ => ForeignTsunami::No,
    };

    let area_intensity = if issue_type == EarthquakeIssueType::Foreign {
        debug!("foreign earthquake, skipping area intensity parsing");
        qm_model::AreaIntensityRollup::default()
    } else {
        let points: Vec<ObservedPoint> = entry
            .points
            .iter()
            .map(|p: &P2pPoint| ObservedPoint {
                is_area: p.is_area,
                intensity: Intensity::from_p2p_scale(p.scale),
                name: p.addr.clone(),
                prefecture: p.pref.clone(),
            })
            .collect();
        rollup_points(&points, geo)
    };

    // Intensity-only data gets a blanked epicenter.
    let is_intensity_only = (latitude == COORD_UNKNOWN
        || longitude == COORD_UNKNOWN
        || depth_km == -1
        || magnitude_raw == -1.0
        || issue_type == EarthquakeIssueType::ScalePrompt)
        && issue_type != EarthquakeIssueType::Foreign;

    Some(EarthquakeReport {
        id: entry.id.clone(),
        issue_type,
        occur_time: entry.earthquake.time.clone(),
        receive_time: entry.time.clone(),
        magnitude: format!("{:.1}", (magnitude_raw * 10.0).round() / 10.0),
        max_intensity: Intensity::from_p2p_scale(entry.earthquake.max_scale),
        tsunami_comments: TsunamiComment { domestic, foreign },
        hypocenter: (!is_intensity_only).then_some(epicenter),
        area_intensity,
    })
}

fn apply_tsunami_entry(snapshot: &mut P2pSnapshot, entry: &P2pTsunamiEntry, geo: &GeoData) {
    if entry.cancelled {
        snapshot.tsunami_in_effect = false;
        snapshot.tsunami = None;
        return;
    }
    snapshot.tsunami_in_effect = true;
    snapshot.tsunami = Some(P2pTsunamiSummary {
        time: entry.time.clone(),
        areas: entry
            .areas
            .iter()
            .map(|a| P2pTsunamiAreaView {
                name: a.name.clone(),
                grade: a.grade.clone(),
                immediate: a.immediate,
                coordinates: geo.tsunami_areas.get(&a.name).cloned().unwrap_or_default(),
            })
            .collect(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn report(id: &str, issue_type: EarthquakeIssueType) -> EarthquakeReport {
        EarthquakeReport {
            id: id.to_owned(),
            issue_type,
            occur_time: "2026/01/01 12:00:00".to_owned(),
            receive_time: Local::now().format("%Y/%m/%d %H:%M:%S%.3f").to_string(),
            magnitude: "6.6".to_owned(),
            max_intensity: Intensity::FiveLower,
            tsunami_comments: TsunamiComment::default(),
            hypocenter: None,
            area_intensity: qm_model::AreaIntensityRollup::default(),
        }
    }

    fn boxed(id: &str, issue_type: EarthquakeIssueType) -> EarthquakeOutcome {
        EarthquakeOutcome::Report(Box::new(report(id, issue_type)))
    }

    #[tokio::test]
    async fn destination_pairs_with_preceding_scale_prompt() {
        let module = P2pModule::new();
        module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::ScalePrompt))
            .await
            .unwrap();
        module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::Destination))
            .await
            .unwrap();

        let snapshot = module.snapshot().await.unwrap();
        assert_eq!(snapshot.earthquake.len(), 2);
        assert_eq!(
            snapshot.earthquake[0].issue_type,
            EarthquakeIssueType::ScalePrompt
        );
        assert_eq!(
            snapshot.earthquake[1].issue_type,
            EarthquakeIssueType::Destination
        );
    }

    #[tokio::test]
    async fn destination_falls_back_to_saved_prompt() {
        let module = P2pModule::new();
        module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::ScalePrompt))
            .await
            .unwrap();
        // Another report takes over the log head but is not a prompt;
        // force the fallback path by seeding the head with DetailScale
        // after re-saving the prompt.
        {
            let mut state = module.state.write().await;
            state.snapshot.earthquake =
                vec![report("E0", EarthquakeIssueType::DetailScale)];
            state.saved_scale_prompt = Some(report("E1", EarthquakeIssueType::ScalePrompt));
        }
        module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::Destination))
            .await
            .unwrap();
        let snapshot = module.snapshot().await.unwrap();
        assert_eq!(snapshot.earthquake.len(), 2);
        assert_eq!(snapshot.earthquake[0].id, "E1");
    }

    #[tokio::test]
    async fn destination_without_any_prompt_is_a_consistency_error() {
        let module = P2pModule::new();
        let err = module
            .apply_stream_report(boxed("E9", EarthquakeIssueType::Destination))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::NoPriorScalePrompt { .. }));
        // State unchanged.
        assert!(module.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn prompt_id_mismatch_is_a_consistency_error() {
        let module = P2pModule::new();
        {
            let mut state = module.state.write().await;
            state.saved_scale_prompt = Some(report("E1", EarthquakeIssueType::ScalePrompt));
        }
        let err = module
            .apply_stream_report(boxed("E2", EarthquakeIssueType::Destination))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::ScalePromptIdMismatch { .. }));
    }

    #[tokio::test]
    async fn detail_scale_supersedes_and_clears_saved_prompt() {
        let module = P2pModule::new();
        module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::ScalePrompt))
            .await
            .unwrap();
        module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::DetailScale))
            .await
            .unwrap();
        {
            let state = module.state.read().await;
            assert!(state.saved_scale_prompt.is_none());
            assert_eq!(state.snapshot.earthquake.len(), 1);
        }
        // A destination now has neither a prompt head nor a saved prompt.
        let err = module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::Destination))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::NoPriorScalePrompt { .. }));
    }

    #[tokio::test]
    async fn cancel_reverts_to_previous_log() {
        let module = P2pModule::new();
        module
            .apply_stream_report(boxed("E1", EarthquakeIssueType::ScalePrompt))
            .await
            .unwrap();
        module
            .apply_stream_report(boxed("E2", EarthquakeIssueType::DetailScale))
            .await
            .unwrap();
        module
            .apply_stream_report(EarthquakeOutcome::Cancel)
            .await
            .unwrap();
        let snapshot = module.snapshot().await.unwrap();
        assert_eq!(snapshot.earthquake.len(), 1);
        assert_eq!(snapshot.earthquake[0].id, "E1");
    }

    #[tokio::test]
    async fn tsunami_rows_toggle_in_effect_flag() {
        let module = P2pModule::new();
        let geo = GeoData::default();
        let history = vec![
            serde_json::json!({
                "code": 552,
                "id": "T1",
                "time": "2026/01/01 12:10:00",
                "cancelled": false,
                "issue": {"type": "Focus"},
                "areas": [{"grade": "Warning", "immediate": true, "name": "宮城県"}]
            }),
            serde_json::json!({
                "code": 551,
                "id": "E1",
                "time": "2026/01/01 12:00:00",
                "issue": {"source": "", "time": "", "type": "ScalePrompt"},
                "earthquake": {"time": "2026/01/01 11:59:00", "maxScale": 45,
                               "domesticTsunami": "Warning", "foreignTsunami": "None"},
                "points": []
            }),
        ];
        module.parse_history(&history, &geo).await;
        let snapshot = module.snapshot().await.unwrap();
        assert!(snapshot.tsunami_in_effect);
        assert_eq!(snapshot.tsunami.unwrap().areas.len(), 1);
        assert_eq!(snapshot.earthquake.len(), 1);
        assert_eq!(
            snapshot.earthquake[0].tsunami_comments.domestic,
            DomesticTsunami::Warning
        );
        // ScalePrompt rows blank the epicenter.
        assert!(snapshot.earthquake[0].hypocenter.is_none());
    }
}
