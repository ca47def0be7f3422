//! Component registry: every long-lived handle, constructed once at boot
//! and passed by value. No global state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::dmdata::{DispatchTargets, DmdataClient, DmdataCredentials, DmdataEndpoints};
use crate::errors::ConfigError;
use crate::fetch::HttpFetcher;
use crate::geodata::GeoData;
use crate::modules::eew::EewModule;
use crate::modules::global_quake::GlobalQuakeModule;
use crate::modules::p2p::P2pModule;
use crate::modules::shake_level::ShakeLevelModule;
use crate::modules::tsunami::TsunamiModule;
use crate::scheduler::Scheduler;

pub struct Registry {
    pub config: Arc<Config>,
    pub geo: Arc<GeoData>,
    pub fetcher: HttpFetcher,
    pub eew: Arc<EewModule>,
    pub p2p: Arc<P2pModule>,
    pub shake_level: Arc<ShakeLevelModule>,
    pub tsunami: Arc<TsunamiModule>,
    pub global_quake: Arc<GlobalQuakeModule>,
    pub dmdata: Option<Arc<DmdataClient>>,
}

impl Registry {
    pub fn build(
        config: Config,
        geo: GeoData,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Arc<Self>, ConfigError> {
        let config = Arc::new(config);
        let geo = Arc::new(geo);
        let fetcher =
            HttpFetcher::new().map_err(|e| ConfigError::Invalid(format!("http client: {e}")))?;

        let eew = Arc::new(EewModule::new(
            Arc::clone(&geo),
            config.eew.clock_offset_secs,
            config.eew.only_dmdata,
        ));
        let p2p = Arc::new(P2pModule::new());
        let tsunami = Arc::new(TsunamiModule::new());
        let shake_level = Arc::new(ShakeLevelModule::new());
        let global_quake = Arc::new(GlobalQuakeModule::new(config.global_list_count()));

        let dmdata = if config.dmdata.enabled {
            Some(DmdataClient::new(
                DmdataCredentials {
                    client_id: config.dmdata.client_id.clone(),
                    client_token: config.dmdata.client_token.clone(),
                    refresh_token: config.refresh_token.clone(),
                    app_name: config.dmdata.app_name.clone(),
                },
                DmdataEndpoints::default(),
                fetcher.clone(),
                Arc::clone(&geo),
                DispatchTargets {
                    eew: Arc::clone(&eew),
                    p2p: Arc::clone(&p2p),
                    tsunami: Arc::clone(&tsunami),
                },
                config.webhook_url.clone(),
                shutdown,
            ))
        } else {
            None
        };

        Ok(Arc::new(Self {
            config,
            geo,
            fetcher,
            eew,
            p2p,
            shake_level,
            tsunami,
            global_quake,
            dmdata,
        }))
    }

    /// Register the periodic jobs enabled by config. Intervals follow the
    /// upstream cadence: p2p/shake/eew 2 s, tsunami 4 s, global 5 s,
    /// token refresh hourly, keep-alive every minute (immediate).
    pub fn register_jobs(registry: &Arc<Self>, scheduler: &mut Scheduler) {
        if registry.config.modules.p2p_earthquake {
            let registry = Arc::clone(registry);
            scheduler.add_job("p2p", Duration::from_secs(2), false, move || {
                let registry = Arc::clone(&registry);
                async move {
                    let stream_ok = match &registry.dmdata {
                        Some(client) => client.is_ok().await,
                        None => false,
                    };
                    registry
                        .p2p
                        .refresh(&registry.fetcher, &registry.geo, stream_ok)
                        .await;
                }
            });
        }
        if registry.config.modules.shake_level {
            let registry = Arc::clone(registry);
            scheduler.add_job("shake_level", Duration::from_secs(2), false, move || {
                let registry = Arc::clone(&registry);
                async move {
                    registry.shake_level.refresh(&registry.fetcher).await;
                }
            });
        }
        if registry.config.modules.eew {
            let registry = Arc::clone(registry);
            scheduler.add_job("eew", Duration::from_secs(2), false, move || {
                let registry = Arc::clone(&registry);
                async move {
                    registry.eew.refresh(&registry.fetcher).await;
                }
            });
        }
        if registry.config.modules.tsunami {
            let registry = Arc::clone(registry);
            scheduler.add_job("tsunami", Duration::from_secs(4), false, move || {
                let registry = Arc::clone(&registry);
                async move {
                    registry.tsunami.refresh().await;
                }
            });
        }
        if registry.config.modules.global_earthquake {
            let registry = Arc::clone(registry);
            scheduler.add_job("global_quake", Duration::from_secs(5), false, move || {
                let registry = Arc::clone(&registry);
                async move {
                    registry.global_quake.refresh(&registry.fetcher).await;
                }
            });
        }
        if let Some(client) = &registry.dmdata {
            {
                let client = Arc::clone(client);
                scheduler.add_job("dmdata_token", Duration::from_secs(3600), false, move || {
                    let client = Arc::clone(&client);
                    async move {
                        client.refresh_token_job().await;
                    }
                });
            }
            let client = Arc::clone(client);
            scheduler.add_job("dmdata_keep_alive", Duration::from_secs(60), true, move || {
                let client = Arc::clone(&client);
                async move {
                    client.keep_alive().await;
                }
            });
        }
        info!("scheduler jobs registered");
    }
}
