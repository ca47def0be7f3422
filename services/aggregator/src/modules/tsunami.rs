//! Tsunami module: expectation + observation snapshots and the in-effect
//! flags, fed by the VTSE41/VTSE51 stream events.

use std::sync::atomic::{AtomicBool, Ordering};

use qm_model::{TsunamiExpectationSnapshot, TsunamiObservationSnapshot};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::trace;

use crate::telegram::{ExpectationUpdate, WatchUpdate};

/// What the read API serves for `/api/tsunami_info`.
#[derive(Debug, Clone, Serialize)]
pub struct TsunamiTotals {
    pub warning_in_effect: bool,
    pub watch_in_effect: bool,
    pub expectation: TsunamiExpectationSnapshot,
    pub observation: TsunamiObservationSnapshot,
}

#[derive(Default)]
pub struct TsunamiModule {
    expectation: RwLock<Option<TsunamiExpectationSnapshot>>,
    observation: RwLock<Option<TsunamiObservationSnapshot>>,
    warning_in_effect: AtomicBool,
    watch_in_effect: AtomicBool,
}

impl TsunamiModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduled every 4 s. With the streaming client feeding this module
    /// there is nothing to poll; the tick only exists so a disabled stream
    /// is visible in the logs.
    pub async fn refresh(&self) {
        trace!("tsunami state is stream-fed; nothing to poll");
    }

    pub async fn apply_expectation(&self, update: ExpectationUpdate) {
        self.warning_in_effect
            .store(update.warning_in_effect, Ordering::SeqCst);
        self.watch_in_effect
            .store(update.watch_in_effect, Ordering::SeqCst);
        *self.expectation.write().await = Some(update.snapshot);
    }

    pub async fn apply_watch(&self, update: WatchUpdate) {
        self.apply_expectation(update.expectation).await;
        *self.observation.write().await = Some(update.observation);
    }

    /// `None` until the first telegram lands.
    pub async fn totals(&self) -> Option<TsunamiTotals> {
        let expectation = self.expectation.read().await.clone()?;
        let observation = self.observation.read().await.clone().unwrap_or_default();
        Some(TsunamiTotals {
            warning_in_effect: self.warning_in_effect.load(Ordering::SeqCst),
            watch_in_effect: self.watch_in_effect.load(Ordering::SeqCst),
            expectation,
            observation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_model::{
        TsunamiExpectationArea, TsunamiGrade, TsunamiHeight, TsunamiParseOrigin, TsunamiTime,
    };

    fn area(grade: TsunamiGrade) -> TsunamiExpectationArea {
        TsunamiExpectationArea {
            name: "宮城県".to_owned(),
            grade,
            height: TsunamiHeight::ThreeMeter,
            time: TsunamiTime::unknown(),
        }
    }

    #[tokio::test]
    async fn totals_follow_applied_updates() {
        let module = TsunamiModule::new();
        assert!(module.totals().await.is_none());

        module
            .apply_expectation(ExpectationUpdate {
                snapshot: TsunamiExpectationSnapshot {
                    receive_time: "2026/01/01 12:05:00".to_owned(),
                    origin: Some(TsunamiParseOrigin::TsunamiExpectation),
                    areas: vec![area(TsunamiGrade::Warning)],
                    forecast_areas: vec![],
                },
                warning_in_effect: true,
                watch_in_effect: false,
            })
            .await;

        let totals = module.totals().await.unwrap();
        assert!(totals.warning_in_effect);
        assert!(!totals.watch_in_effect);
        assert_eq!(totals.expectation.areas.len(), 1);
        assert!(totals.observation.areas.is_empty());
    }
}
