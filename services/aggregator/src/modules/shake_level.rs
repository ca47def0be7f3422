//! Shake-level gauge module.

use qm_model::feeds::{ShakeLevelResponse, ShakeLevelSnapshot};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::fetch::{HttpFetcher, DEFAULT_RETRIES};

const SHAKE_LEVEL_URL: &str = "https://kwatch-24h.net/EQLevel.json";

#[derive(Default)]
pub struct ShakeLevelModule {
    info: RwLock<Option<ShakeLevelSnapshot>>,
}

impl ShakeLevelModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduled every 2 s.
    pub async fn refresh(&self, fetcher: &HttpFetcher) {
        match fetcher
            .get_json::<ShakeLevelResponse>(SHAKE_LEVEL_URL, DEFAULT_RETRIES)
            .await
        {
            Ok(level) => {
                self.apply(level).await;
                info!("refreshed shake_level info");
            }
            Err(e) => warn!(error = %e, "failed to fetch shake level"),
        }
    }

    pub async fn apply(&self, level: ShakeLevelResponse) {
        *self.info.write().await = Some(ShakeLevelSnapshot {
            status: 0,
            shake_level: level.shake_level,
            green: level.green,
            yellow: level.yellow,
            red: level.red,
        });
    }

    pub async fn snapshot(&self) -> Option<ShakeLevelSnapshot> {
        self.info.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_is_none_until_first_refresh() {
        let module = ShakeLevelModule::new();
        assert!(module.snapshot().await.is_none());

        module
            .apply(ShakeLevelResponse {
                shake_level: 1200,
                green: 210,
                yellow: 40,
                red: 3,
                sync_time: "11:45".to_owned(),
            })
            .await;
        let snapshot = module.snapshot().await.unwrap();
        assert_eq!(snapshot.shake_level, 1200);
        assert_eq!(snapshot.status, 0);
    }
}
