//! Earthquake Early Warning module and the SVIR/kmoni arbitration
//! middleware.
//!
//! Two inputs feed this module: VXSE43/44 telegrams from the streaming
//! client (the `svir` slot) and the polled kmoni JSON + intensity image
//! (the `kmoni` slot). The arbitrator picks the best view at read time.

use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use qm_model::feeds::{KmoniEew, KmoniLatestTime};
use qm_model::{
    AreaColoring, AreaIntensity, Depth, EewAlert, EewEvent, EewLifecycle, EewSource, EewView,
    EewViewHypocenter, Intensity, Magnitude,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::fetch::{HttpFetcher, DEFAULT_RETRIES};
use crate::geodata::GeoData;
use crate::intensity_image;
use crate::pswave;

const KMONI_LATEST_URL: &str = "http://www.kmoni.bosai.go.jp/webservice/server/pros/latest.json";
const KMONI_EEW_URL: &str = "http://www.kmoni.bosai.go.jp/webservice/hypo/eew";
const KMONI_IMAGE_URL: &str = "http://www.kmoni.bosai.go.jp/data/map_img/EstShindoImg/eew";

/// SVIR reports older than this window (after clock alignment) are
/// treated as unavailable.
const RECENT_WINDOW_SECS: (i64, i64) = (-12, 180);

#[derive(Default)]
struct EewState {
    svir: Option<EewView>,
    kmoni: Option<EewView>,
}

pub struct EewModule {
    geo: Arc<GeoData>,
    clock_offset: i64,
    only_dmdata: bool,
    state: RwLock<EewState>,
}

impl EewModule {
    pub fn new(geo: Arc<GeoData>, clock_offset: i64, only_dmdata: bool) -> Self {
        Self {
            geo,
            clock_offset,
            only_dmdata,
            state: RwLock::new(EewState::default()),
        }
    }

    // -----------------------------------------------------------------------
    // Stream side (svir slot)
    // -----------------------------------------------------------------------

    /// Apply one parsed VXSE43/44 telegram.
    pub async fn apply_stream_event(&self, event: EewEvent) {
        let view = self.event_to_view(&event);
        self.state.write().await.svir = Some(view);
    }

    fn event_to_view(&self, event: &EewEvent) -> EewView {
        if event.is_cancel() {
            debug!("EEW cancelled, storing cancelled view");
            return EewView::cancelled(EewSource::Svir);
        }

        let mut areas = BTreeMap::new();
        if event.is_warn || !event.forecast_areas.is_empty() {
            for area in &event.forecast_areas {
                let Some(centroid) = self.geo.area_centroid.get(&area.name) else {
                    trace!(area = %area.name, "no centroid for forecast area");
                    continue;
                };
                areas.insert(
                    area.name.clone(),
                    AreaIntensity {
                        name: area.name.clone(),
                        intensity: area.highest,
                        latitude: centroid.latitude,
                        longitude: centroid.longitude,
                        is_area: true,
                        lg_intensity: area.lg_highest,
                    },
                );
            }
        }

        let now = Utc::now().timestamp();
        let waves = event.hypocenter.depth.km().map(|depth| {
            pswave::estimate(
                &self.geo.travel_time,
                depth,
                (now + self.clock_offset - event.origin.unix_time) as f64,
            )
        });

        EewView {
            source: EewSource::Svir,
            is_plum: event.hypocenter.is_assumption,
            is_cancel: false,
            is_test: event.lifecycle != EewLifecycle::Normal,
            max_intensity: event.max_intensity.lowest,
            report_time: event.announced.time_string.clone(),
            report_timestamp: event.announced.unix_time,
            occur_timestamp: event.origin.unix_time,
            report_num: event.serial,
            report_flag: if event.is_warn {
                EewAlert::Warning
            } else {
                EewAlert::Forecast
            },
            report_id: event.event_id.clone(),
            is_final: event.is_final,
            magnitude: event.hypocenter.magnitude,
            hypocenter: EewViewHypocenter {
                name: event.hypocenter.name.clone(),
                latitude: event.hypocenter.latitude,
                longitude: event.hypocenter.longitude,
                depth: event.hypocenter.depth,
            },
            station_intensities: None,
            area_coloring: AreaColoring {
                areas,
                recommended_areas: true,
            },
            p_wave: waves.and_then(|w| w.p_distance),
            s_wave: waves.and_then(|w| w.s_distance),
        }
    }

    // -----------------------------------------------------------------------
    // Poll side (kmoni slot)
    // -----------------------------------------------------------------------

    /// Scheduled every 2 s.
    pub async fn refresh(&self, fetcher: &HttpFetcher) {
        let latest = match fetcher
            .get_json::<KmoniLatestTime>(KMONI_LATEST_URL, DEFAULT_RETRIES)
            .await
        {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "failed to fetch kmoni time");
                return;
            }
        };
        let Some(naive) =
            NaiveDateTime::parse_from_str(&latest.latest_time, "%Y/%m/%d %H:%M:%S").ok()
        else {
            warn!(raw = %latest.latest_time, "unparseable kmoni latest time");
            return;
        };
        let req_date = naive.format("%Y%m%d").to_string();
        let req_time = naive.format("%Y%m%d%H%M%S").to_string();

        let eew = match fetcher
            .get_json::<KmoniEew>(&format!("{KMONI_EEW_URL}/{req_time}.json"), DEFAULT_RETRIES)
            .await
        {
            Ok(eew) => eew,
            Err(e) => {
                warn!(error = %e, "failed to fetch kmoni EEW");
                return;
            }
        };

        if !eew.result.message.is_empty() {
            // No EEW in progress.
            self.state.write().await.kmoni = None;
            return;
        }
        debug!("kmoni EEW available, parsing");

        let image = match fetcher
            .get_bytes(
                &format!("{KMONI_IMAGE_URL}/{req_date}/{req_time}.eew.gif"),
                DEFAULT_RETRIES,
            )
            .await
        {
            Ok(bytes) => intensity_image::decode(&bytes, &self.geo).ok(),
            Err(e) => {
                warn!(error = %e, "failed to fetch kmoni intensity image");
                None
            }
        };

        let view = self.kmoni_to_view(&eew, image);
        self.state.write().await.kmoni = Some(view);
    }

    fn kmoni_to_view(
        &self,
        eew: &KmoniEew,
        image: Option<intensity_image::IntensityImageResult>,
    ) -> EewView {
        if eew.is_cancel {
            return EewView::cancelled(EewSource::Kmoni);
        }

        let report_flag = match eew.alert_flag.as_deref() {
            Some("警報") => EewAlert::Warning,
            Some("予報") | None => EewAlert::Forecast,
            Some(other) => {
                warn!(flag = other, "unexpected kmoni alert flag");
                EewAlert::Forecast
            }
        };

        let occur_timestamp = NaiveDateTime::parse_from_str(&eew.origin_time, "%Y%m%d%H%M%S")
            .ok()
            .map_or(0, jst_timestamp);
        let report_timestamp =
            NaiveDateTime::parse_from_str(&eew.report_time, "%Y/%m/%d %H:%M:%S")
                .ok()
                .map_or(0, jst_timestamp);

        let depth_km: Option<u32> = eew.depth.trim_end_matches("km").parse().ok();
        let now = Utc::now().timestamp();
        let waves = depth_km.map(|depth| {
            pswave::estimate(
                &self.geo.travel_time,
                depth,
                (now + self.clock_offset - occur_timestamp) as f64,
            )
        });

        let (areas, recommended, stations) = match image {
            Some(image) => (
                image.area_intensities,
                image.recommend_areas,
                Some(image.station_intensities),
            ),
            None => (BTreeMap::new(), false, None),
        };

        EewView {
            source: EewSource::Kmoni,
            is_plum: false,
            is_cancel: false,
            is_test: eew.is_training,
            max_intensity: Intensity::from_code(&eew.calculated_intensity),
            report_time: eew.report_time.clone(),
            report_timestamp,
            occur_timestamp,
            report_num: eew.report_number,
            report_flag,
            report_id: eew.report_id.clone(),
            is_final: eew.is_final,
            magnitude: eew
                .magnitude
                .parse()
                .map(Magnitude::Value)
                .unwrap_or(Magnitude::Unknown),
            hypocenter: EewViewHypocenter {
                name: eew.region_name.clone(),
                latitude: eew.latitude.parse().unwrap_or(qm_model::COORD_UNKNOWN),
                longitude: eew.longitude.parse().unwrap_or(qm_model::COORD_UNKNOWN),
                depth: depth_km.map_or(Depth::Unknown, |km| Depth::from_km(i64::from(km))),
            },
            station_intensities: stations,
            area_coloring: AreaColoring {
                areas,
                recommended_areas: recommended,
            },
            p_wave: waves.and_then(|w| w.p_distance),
            s_wave: waves.and_then(|w| w.s_distance),
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// The arbitrated current EEW; `None` means "no event to display".
    pub async fn current(&self) -> Option<EewView> {
        let state = self.state.read().await;
        arbitrate(
            state.svir.as_ref(),
            state.kmoni.as_ref(),
            self.only_dmdata,
            self.clock_offset,
            Utc::now().timestamp(),
        )
    }

}

/// Interpret a vendor-local (JST) naive timestamp.
fn jst_timestamp(naive: NaiveDateTime) -> i64 {
    FixedOffset::east_opt(9 * 3600)
        .and_then(|offset| offset.from_local_datetime(&naive).single())
        .map_or(0, |dt| dt.timestamp())
}

/// Pick between the stream-fed SVIR view and the polled kmoni view.
///
/// SVIR counts as available when present and either cancelled or recent,
/// where recent means `now + clock_offset − report_timestamp` falls inside
/// `(−12, 180)` seconds.
pub fn arbitrate(
    svir: Option<&EewView>,
    kmoni: Option<&EewView>,
    only_dmdata: bool,
    clock_offset: i64,
    now: i64,
) -> Option<EewView> {
    let svir_on = svir.is_some_and(|view| {
        if view.is_cancel {
            debug!("svir available: cancelled message");
            return true;
        }
        let timespan = now + clock_offset - view.report_timestamp;
        let recent = RECENT_WINDOW_SECS.0 < timespan && timespan < RECENT_WINDOW_SECS.1;
        debug!(timespan, recent, "svir recency check");
        recent
    });
    let kmoni_on = kmoni.is_some();

    if only_dmdata {
        let view = svir?;
        if !svir_on {
            trace!("svir unavailable and only_dmdata set");
            return None;
        }
        let mut merged = view.clone();
        if let Some(kmoni) = kmoni.filter(|k| k.report_id == view.report_id) {
            if view.is_cancel {
                return Some(merged);
            }
            trace!("combining kmoni intensities into svir view");
            merged.station_intensities = kmoni.station_intensities.clone();
            if merged.report_flag != EewAlert::Warning {
                merged.area_coloring.areas = combine_intensity_areas(view, kmoni);
                // kmoni decides whether area display is worthwhile.
                merged.area_coloring.recommended_areas = kmoni.area_coloring.recommended_areas;
            }
        }
        return Some(merged);
    }

    match (svir_on, kmoni_on) {
        (false, false) => None,
        (false, true) => kmoni.cloned(),
        (true, false) => svir.cloned(),
        (true, true) => {
            let svir = svir?;
            let kmoni = kmoni?;
            if svir.is_plum {
                debug!("using svir: PLUM event");
                return Some(svir.clone());
            }
            match svir.hypocenter.depth.km() {
                Some(depth) if depth >= 150 => {
                    debug!("using svir: deep earthquake");
                    Some(svir.clone())
                }
                Some(_) => {
                    if svir.report_flag == EewAlert::Warning {
                        debug!("using svir: warning, merging kmoni areas");
                        let mut merged = svir.clone();
                        merged.area_coloring.areas = combine_intensity_areas(svir, kmoni);
                        Some(merged)
                    } else {
                        debug!("using kmoni: no svir precedence rule met");
                        Some(kmoni.clone())
                    }
                }
                // An undecodable depth falls back to the polled source.
                None => Some(kmoni.clone()),
            }
        }
    }
}

/// Start from the SVIR area map, add kmoni entries for missing keys.
/// Events with mismatching `(event_id, serial)` are never merged.
fn combine_intensity_areas(
    svir: &EewView,
    kmoni: &EewView,
) -> BTreeMap<String, AreaIntensity> {
    let mut combined = svir.area_coloring.areas.clone();
    if svir.report_id != kmoni.report_id || svir.report_num != kmoni.report_num {
        debug!("different event between kmoni and svir, keeping svir only");
        return combined;
    }
    for (name, area) in &kmoni.area_coloring.areas {
        combined
            .entry(name.clone())
            .or_insert_with(|| area.clone());
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;
    const OFFSET: i64 = 3600;

    fn view(source: EewSource, report_id: &str, serial: u32) -> EewView {
        EewView {
            source,
            is_plum: false,
            is_cancel: false,
            is_test: false,
            max_intensity: Intensity::Four,
            report_time: "2026/01/01 12:00:10".to_owned(),
            // Recent relative to NOW after the offset.
            report_timestamp: NOW + OFFSET - 30,
            occur_timestamp: NOW + OFFSET - 60,
            report_num: serial,
            report_flag: EewAlert::Forecast,
            report_id: report_id.to_owned(),
            is_final: false,
            magnitude: Magnitude::Value(6.1),
            hypocenter: EewViewHypocenter {
                name: "福島県沖".to_owned(),
                latitude: 37.0,
                longitude: 141.1,
                depth: Depth::Km(10),
            },
            station_intensities: None,
            area_coloring: AreaColoring::default(),
            p_wave: None,
            s_wave: None,
        }
    }

    fn area(name: &str, intensity: Intensity) -> AreaIntensity {
        AreaIntensity {
            name: name.to_owned(),
            intensity,
            latitude: 37.0,
            longitude: 141.0,
            is_area: true,
            lg_intensity: None,
        }
    }

    #[test]
    fn totality_over_all_slot_combinations() {
        let cancelled = {
            let mut v = view(EewSource::Svir, "E1", 1);
            v.is_cancel = true;
            v
        };
        let svir_cases = [None, Some(cancelled), Some(view(EewSource::Svir, "E1", 1))];
        let kmoni_cases = [None, Some(view(EewSource::Kmoni, "E1", 1))];
        for svir in &svir_cases {
            for kmoni in &kmoni_cases {
                for only in [false, true] {
                    // Must not panic; result is empty, svir-sourced, or
                    // kmoni-sourced.
                    let picked = arbitrate(svir.as_ref(), kmoni.as_ref(), only, OFFSET, NOW);
                    if let Some(picked) = picked {
                        assert!(matches!(
                            picked.source,
                            EewSource::Svir | EewSource::Kmoni
                        ));
                    }
                }
            }
        }
    }

    #[test]
    fn outdated_svir_falls_back_to_kmoni() {
        let mut svir = view(EewSource::Svir, "E1", 1);
        svir.report_timestamp = NOW + OFFSET - 3000;
        let kmoni = view(EewSource::Kmoni, "E1", 1);
        let picked = arbitrate(Some(&svir), Some(&kmoni), false, OFFSET, NOW).unwrap();
        assert_eq!(picked.source, EewSource::Kmoni);
    }

    #[test]
    fn cancelled_svir_counts_as_available() {
        let mut svir = view(EewSource::Svir, "E1", 1);
        svir.is_cancel = true;
        svir.report_timestamp = 0;
        let picked = arbitrate(Some(&svir), None, false, OFFSET, NOW).unwrap();
        assert!(picked.is_cancel);
    }

    #[test]
    fn plum_and_deep_events_prefer_svir() {
        let kmoni = view(EewSource::Kmoni, "E1", 1);

        let mut plum = view(EewSource::Svir, "E1", 1);
        plum.is_plum = true;
        assert_eq!(
            arbitrate(Some(&plum), Some(&kmoni), false, OFFSET, NOW)
                .unwrap()
                .source,
            EewSource::Svir
        );

        let mut deep = view(EewSource::Svir, "E1", 1);
        deep.hypocenter.depth = Depth::Km(150);
        assert_eq!(
            arbitrate(Some(&deep), Some(&kmoni), false, OFFSET, NOW)
                .unwrap()
                .source,
            EewSource::Svir
        );
    }

    #[test]
    fn shallow_forecast_prefers_kmoni() {
        let svir = view(EewSource::Svir, "E1", 1);
        let kmoni = view(EewSource::Kmoni, "E1", 1);
        assert_eq!(
            arbitrate(Some(&svir), Some(&kmoni), false, OFFSET, NOW)
                .unwrap()
                .source,
            EewSource::Kmoni
        );
    }

    #[test]
    fn warning_merges_kmoni_areas_into_svir() {
        let mut svir = view(EewSource::Svir, "E1", 2);
        svir.report_flag = EewAlert::Warning;
        svir.area_coloring
            .areas
            .insert("浜通り".to_owned(), area("浜通り", Intensity::FiveLower));
        let mut kmoni = view(EewSource::Kmoni, "E1", 2);
        kmoni
            .area_coloring
            .areas
            .insert("浜通り".to_owned(), area("浜通り", Intensity::Three));
        kmoni
            .area_coloring
            .areas
            .insert("中通り".to_owned(), area("中通り", Intensity::Four));

        let picked = arbitrate(Some(&svir), Some(&kmoni), false, OFFSET, NOW).unwrap();
        assert_eq!(picked.source, EewSource::Svir);
        let areas = &picked.area_coloring.areas;
        assert_eq!(areas.len(), 2);
        // Existing svir keys win.
        assert_eq!(areas["浜通り"].intensity, Intensity::FiveLower);
        assert_eq!(areas["中通り"].intensity, Intensity::Four);
    }

    #[test]
    fn mismatched_serials_are_never_merged() {
        let mut svir = view(EewSource::Svir, "E1", 2);
        svir.report_flag = EewAlert::Warning;
        let mut kmoni = view(EewSource::Kmoni, "E1", 3);
        kmoni
            .area_coloring
            .areas
            .insert("中通り".to_owned(), area("中通り", Intensity::Four));

        let picked = arbitrate(Some(&svir), Some(&kmoni), false, OFFSET, NOW).unwrap();
        assert!(picked.area_coloring.areas.is_empty());
    }

    #[test]
    fn only_dmdata_suppresses_kmoni_fallback() {
        let kmoni = view(EewSource::Kmoni, "E1", 1);
        // No svir at all: nothing is served even though kmoni is live.
        assert!(arbitrate(None, Some(&kmoni), true, OFFSET, NOW).is_none());

        // Same event id: kmoni stations merge into the svir view.
        let mut svir = view(EewSource::Svir, "E1", 1);
        svir.area_coloring
            .areas
            .insert("浜通り".to_owned(), area("浜通り", Intensity::Four));
        let mut kmoni_same = view(EewSource::Kmoni, "E1", 1);
        kmoni_same.station_intensities = Some(BTreeMap::new());
        kmoni_same.area_coloring.recommended_areas = true;
        let picked = arbitrate(Some(&svir), Some(&kmoni_same), true, OFFSET, NOW).unwrap();
        assert_eq!(picked.source, EewSource::Svir);
        assert!(picked.station_intensities.is_some());
        assert!(picked.area_coloring.recommended_areas);
    }

    #[tokio::test]
    async fn stream_event_updates_svir_slot() {
        let module = EewModule::new(Arc::new(GeoData::default()), OFFSET, false);
        let mut event = EewEvent::cancelled();
        module.apply_stream_event(event.clone()).await;
        {
            let state = module.state.read().await;
            assert!(state.svir.as_ref().unwrap().is_cancel);
        }

        event = EewEvent {
            lifecycle: EewLifecycle::Normal,
            event_id: "E7".to_owned(),
            serial: 2,
            is_warn: true,
            ..EewEvent::default()
        };
        module.apply_stream_event(event).await;
        let state = module.state.read().await;
        let svir = state.svir.as_ref().unwrap();
        assert_eq!(svir.report_id, "E7");
        assert_eq!(svir.report_flag, EewAlert::Warning);
        assert_eq!(svir.report_num, 2);
    }
}
