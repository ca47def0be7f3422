//! Global seismicity module (CEIC list).

use qm_model::feeds::{CeicEntry, GlobalEarthquake, GlobalEpicenter};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::fetch::{HttpFetcher, DEFAULT_RETRIES};

const CEIC_URL: &str = "https://www.ceic.ac.cn/ajax/google";

pub struct GlobalQuakeModule {
    list_count: usize,
    info: RwLock<Option<Vec<GlobalEarthquake>>>,
}

impl GlobalQuakeModule {
    pub fn new(list_count: usize) -> Self {
        Self {
            list_count,
            info: RwLock::new(None),
        }
    }

    /// Scheduled every 5 s.
    pub async fn refresh(&self, fetcher: &HttpFetcher) {
        match fetcher
            .get_json::<Vec<CeicEntry>>(CEIC_URL, DEFAULT_RETRIES)
            .await
        {
            Ok(entries) => {
                self.apply(&entries).await;
                info!("refreshed global_earthquake info");
            }
            Err(e) => warn!(error = %e, "failed to fetch CEIC list"),
        }
    }

    pub async fn apply(&self, entries: &[CeicEntry]) {
        let tail_start = entries.len().saturating_sub(self.list_count);
        let mut parsed = Vec::with_capacity(self.list_count);
        for entry in entries[tail_start..].iter().rev() {
            let (Ok(latitude), Ok(longitude)) =
                (entry.latitude.parse::<f64>(), entry.longitude.parse::<f64>())
            else {
                warn!(location = %entry.location, "unparseable CEIC coordinates");
                continue;
            };
            let magnitude: f64 = entry.magnitude.parse().unwrap_or(0.0);
            parsed.push(GlobalEarthquake {
                epicenter: GlobalEpicenter {
                    name: entry.location.clone(),
                    depth: entry.depth.to_string(),
                    latitude,
                    longitude,
                },
                magnitude: entry.magnitude.clone(),
                mmi: richter_to_mercalli(magnitude),
                occur_time: entry.origin_time.clone(),
                receive_time: entry.sync_time.clone(),
            });
        }
        *self.info.write().await = Some(parsed);
    }

    pub async fn snapshot(&self) -> Option<Vec<GlobalEarthquake>> {
        self.info.read().await.clone()
    }
}

/// Rough Richter → Modified Mercalli bucketing used for display.
fn richter_to_mercalli(m: f64) -> u8 {
    match m {
        m if m < 3.5 => 1,
        m if m < 4.2 => 2,
        m if m < 4.5 => 3,
        m if m < 4.8 => 4,
        m if m < 5.4 => 5,
        m if m < 6.1 => 6,
        m if m < 6.5 => 7,
        m if m < 6.9 => 8,
        m if m < 7.3 => 9,
        _ => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(magnitude: &str, location: &str) -> CeicEntry {
        CeicEntry {
            latitude: "35.1".to_owned(),
            longitude: "140.2".to_owned(),
            depth: 10.0,
            origin_time: "2026-01-01 12:00:00".to_owned(),
            magnitude: magnitude.to_owned(),
            location: location.to_owned(),
            sync_time: "2026-01-01 12:05:00".to_owned(),
        }
    }

    #[test]
    fn mercalli_buckets() {
        assert_eq!(richter_to_mercalli(3.0), 1);
        assert_eq!(richter_to_mercalli(4.2), 3);
        assert_eq!(richter_to_mercalli(6.0), 6);
        assert_eq!(richter_to_mercalli(7.3), 10);
    }

    #[tokio::test]
    async fn keeps_configured_tail_newest_first() {
        let module = GlobalQuakeModule::new(2);
        module
            .apply(&[entry("5.0", "a"), entry("6.0", "b"), entry("7.0", "c")])
            .await;
        let list = module.snapshot().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].epicenter.name, "c");
        assert_eq!(list[1].epicenter.name, "b");
        assert_eq!(list[0].mmi, 9);
    }
}
