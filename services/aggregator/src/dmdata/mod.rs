//! DMData streaming ingest client.
//!
//! Lifecycle per connection attempt:
//!
//! ```text
//! DISCONNECTED → TOKEN_OK → SESSION_OK → CONNECTED → … → CLOSING → DISCONNECTED
//!                   ↑_____________________________________________|
//! ```
//!
//! The keep-alive probe (scheduled every minute, immediate first run)
//! drives connection establishment and recovery; the WebSocket read loop
//! replies to pings, decodes data frames and dispatches them to the
//! owning modules. Reconnection stops once the shutdown flag is set.

pub mod body;
pub mod fanout;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use qm_model::dmdata::{
    ApiErrorResponse, DataFrame, PongFrame, SocketFrame, SocketStartRequest,
    StreamingStatusReport, TelegramKind, TokenError, TokenRequest, TokenResponse,
};
use tokio::sync::{watch, Mutex, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, trace, warn};

use crate::errors::SessionError;
use crate::fetch::HttpFetcher;
use crate::geodata::GeoData;
use crate::modules::eew::EewModule;
use crate::modules::p2p::P2pModule;
use crate::modules::tsunami::TsunamiModule;
use crate::telegram::{self, TelegramEvent};
use fanout::Fanout;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pongs older than this mark the stream unhealthy.
const PONG_STALE_SECS: i64 = 1800;
/// Vendor's benign shutdown code.
const CODE_BENIGN_CLOSE: i64 = 4808;
/// Vendor's ping-verification-failure code; answered by retransmitting
/// the previous pong.
const CODE_PING_VERIFY_FAILED: i64 = 4640;
const FANOUT_JOIN_BUDGET: Duration = Duration::from_secs(5);

const CLASSIFICATIONS: [&str; 3] = [
    "application.jquake",
    "telegram.earthquake",
    "eew.forecast",
];
const TELEGRAM_TYPES: [&str; 9] = [
    "VXSE51", "VXSE52", "VXSE53", "VXSE61", "VTSE41", "VTSE51", "VXSE43", "VXSE44", "VXSE45",
];

/// REST endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct DmdataEndpoints {
    pub token_url: String,
    pub api_base: String,
}

impl Default for DmdataEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://manager.dmdata.jp/account/oauth2/v1/token".to_owned(),
            api_base: "https://api.dmdata.jp/v2".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DmdataCredentials {
    pub client_id: String,
    pub client_token: String,
    pub refresh_token: String,
    pub app_name: String,
}

/// Module handles the dispatcher writes into.
pub struct DispatchTargets {
    pub eew: Arc<EewModule>,
    pub p2p: Arc<P2pModule>,
    pub tsunami: Arc<TsunamiModule>,
}

/// How one socket read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEnd {
    /// Process shutdown; no reconnect.
    Shutdown,
    /// Vendor announced a benign close; no reconnect.
    Benign,
    /// Anything else; close the session and reconnect.
    Reconnect,
}

#[derive(Default)]
struct ClientState {
    access_token: Option<String>,
    socket_url: Option<String>,
    active_socket_id: Option<i64>,
    connected: bool,
    ws_errored: bool,
}

pub struct DmdataClient {
    credentials: DmdataCredentials,
    endpoints: DmdataEndpoints,
    fetcher: HttpFetcher,
    geo: Arc<GeoData>,
    targets: DispatchTargets,
    fanout: Fanout,
    state: Mutex<ClientState>,
    last_pong_time: AtomicI64,
    last_raw_body: RwLock<Option<String>>,
    shutdown: watch::Receiver<bool>,
}

impl DmdataClient {
    pub fn new(
        credentials: DmdataCredentials,
        endpoints: DmdataEndpoints,
        fetcher: HttpFetcher,
        geo: Arc<GeoData>,
        targets: DispatchTargets,
        webhook_url: Option<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            credentials,
            endpoints,
            fetcher,
            geo,
            targets,
            fanout: Fanout::new(webhook_url),
            state: Mutex::new(ClientState::default()),
            last_pong_time: AtomicI64::new(chrono::Utc::now().timestamp()),
            last_raw_body: RwLock::new(None),
            shutdown,
        })
    }

    // -----------------------------------------------------------------------
    // Token manager
    // -----------------------------------------------------------------------

    /// Exchange the refresh token for a fresh access token. On failure the
    /// previous token is retained and the hourly timer retries.
    pub async fn get_current_token(&self) {
        let form = TokenRequest::refresh(
            &self.credentials.client_id,
            &self.credentials.client_token,
            &self.credentials.refresh_token,
        );
        let text = match self
            .fetcher
            .post_form(&self.endpoints.token_url, &form, 1)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to refresh DMData token");
                return;
            }
        };

        if let Ok(token) = serde_json::from_str::<TokenResponse>(&text) {
            let prefix: String = token.access_token.chars().take(5).collect();
            info!(token = %format!("{prefix}***"), "got DMData access token");
            self.state.lock().await.access_token = Some(token.access_token);
        } else if let Ok(refused) = serde_json::from_str::<TokenError>(&text) {
            error!(
                error = %refused.error,
                description = %refused.error_description,
                "DMData token refresh refused"
            );
        } else {
            error!("unrecognized token endpoint response");
        }
    }

    // -----------------------------------------------------------------------
    // Session management
    // -----------------------------------------------------------------------

    /// Open a socket session, yielding the WebSocket URL and socket id.
    async fn get_socket(&self) -> bool {
        let token = {
            let mut state = self.state.lock().await;
            state.socket_url = None;
            state.access_token.clone()
        };
        let Some(token) = token else {
            error!("no access token, cannot open socket");
            return false;
        };

        let request = SocketStartRequest {
            classifications: CLASSIFICATIONS.iter().map(|&c| c.to_owned()).collect(),
            types: TELEGRAM_TYPES.iter().map(|&t| t.to_owned()).collect(),
            app_name: self.credentials.app_name.clone(),
        };
        let url = format!("{}/socket", self.endpoints.api_base);
        let text = match self.fetcher.post_json_bearer(&url, &token, &request, 1).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to get DMData socket endpoint");
                return false;
            }
        };

        match serde_json::from_str::<qm_model::dmdata::SocketStartResponse>(&text) {
            Ok(open) => {
                info!(socket_id = open.websocket.id, "got DMData socket endpoint");
                debug!(ticket = %open.ticket, url = %open.websocket.url, "socket detail");
                let mut state = self.state.lock().await;
                state.socket_url = Some(open.websocket.url);
                state.active_socket_id = Some(open.websocket.id);
                true
            }
            Err(_) => {
                if let Ok(refused) = serde_json::from_str::<ApiErrorResponse>(&text) {
                    error!(
                        code = refused.error.code,
                        message = %refused.error.message,
                        "DMData socket endpoint refused"
                    );
                } else {
                    error!("unrecognized socket endpoint response");
                }
                false
            }
        }
    }

    /// Close the session with a best-effort DELETE. Zero retries during
    /// shutdown, three otherwise.
    pub async fn close_socket(&self, tries: u32) {
        let (socket_id, token) = {
            let state = self.state.lock().await;
            (state.active_socket_id, state.access_token.clone())
        };
        let Some(socket_id) = socket_id else {
            warn!("no active socket to close");
            return;
        };
        if let Some(token) = token {
            let url = format!("{}/socket/{}", self.endpoints.api_base, socket_id);
            if let Err(e) = self.fetcher.delete_bearer(&url, &token, tries).await {
                warn!(error = %e, "failed to close socket session");
            }
        }

        let mut state = self.state.lock().await;
        state.socket_url = None;
        state.active_socket_id = None;
        state.connected = false;
        info!("closed socket session");
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Open a session and connect the WebSocket, unless shut down or
    /// already connected.
    pub fn start_connection(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if *self.shutdown.borrow() {
                trace!("shutdown, no websocket needed");
                return;
            }
            if self.state.lock().await.connected {
                return;
            }
            debug!("trying to start a connection");
            if self.get_socket().await {
                self.connect_socket().await;
            }
        })
    }

    fn connect_socket(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let url = self.state.lock().await.socket_url.clone();
            let Some(url) = url else {
                warn!("socket_url unset, check get_socket status");
                return;
            };
            debug!(%url, "connecting websocket");
            match connect_async(&url).await {
                Ok((ws, _response)) => {
                    {
                        let mut state = self.state.lock().await;
                        state.connected = true;
                        state.ws_errored = false;
                    }
                    tokio::spawn(async move {
                        let end = self.run_socket_loop(ws).await;
                        self.on_socket_end(end).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "websocket connect failed");
                    self.state.lock().await.ws_errored = true;
                }
            }
        })
    }

    fn on_socket_end(
        self: Arc<Self>,
        end: Result<SocketEnd, SessionError>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.state.lock().await.connected = false;
            match end {
                Ok(SocketEnd::Shutdown) | Ok(SocketEnd::Benign) => {}
                Ok(SocketEnd::Reconnect) => {
                    if !*self.shutdown.borrow() {
                        self.close_socket(3).await;
                        self.start_connection().await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "websocket errored");
                    self.state.lock().await.ws_errored = true;
                    if !*self.shutdown.borrow() {
                        self.close_socket(3).await;
                        self.start_connection().await;
                    }
                }
            }
        })
    }

    /// The frame loop. Generic over the stream so tests can drive it
    /// against a mock server connection.
    pub async fn run_socket_loop<S>(&self, mut ws: S) -> Result<SocketEnd, SessionError>
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let mut shutdown = self.shutdown.clone();
        let mut cached_pong: Option<String> = None;
        let mut benign_close = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(SocketEnd::Shutdown);
                    }
                }
                msg = ws.next() => match msg {
                    None => {
                        return Ok(if benign_close { SocketEnd::Benign } else { SocketEnd::Reconnect });
                    }
                    Some(Err(e)) => return Err(SessionError::Ws(e)),
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SocketFrame>(&text) {
                            Ok(SocketFrame::Start(start)) => {
                                info!(socket_id = start.socket_id, time = %start.time, "connected with DMData");
                                let mut state = self.state.lock().await;
                                state.active_socket_id = Some(start.socket_id);
                                state.connected = true;
                                state.ws_errored = false;
                            }
                            Ok(SocketFrame::Ping(ping)) => {
                                let pong = serde_json::to_string(&SocketFrame::Pong(PongFrame {
                                    ping_id: ping.ping_id,
                                }))?;
                                debug!(pong = %pong, "sending pong");
                                ws.send(Message::Text(pong.clone().into())).await?;
                                cached_pong = Some(pong);
                                self.last_pong_time
                                    .store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
                            }
                            Ok(SocketFrame::Data(frame)) => {
                                self.handle_data(*frame).await;
                            }
                            Ok(SocketFrame::Error(frame)) => {
                                if frame.code == CODE_BENIGN_CLOSE {
                                    warn!("DMData socket closed; expected only during shutdown");
                                    benign_close = true;
                                    continue;
                                }
                                error!(
                                    code = frame.code,
                                    error = %frame.error,
                                    close = frame.close,
                                    "DMData socket error"
                                );
                                if frame.code == CODE_PING_VERIFY_FAILED {
                                    if let Some(pong) = &cached_pong {
                                        warn!("retransmitting previous pong");
                                        ws.send(Message::Text(pong.clone().into())).await?;
                                        continue;
                                    }
                                }
                                if frame.close {
                                    return Ok(SocketEnd::Reconnect);
                                }
                            }
                            Ok(SocketFrame::Pong(_)) => {}
                            Err(e) => warn!(error = %e, "undecodable frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Ok(if benign_close { SocketEnd::Benign } else { SocketEnd::Reconnect });
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Data handling
    // -----------------------------------------------------------------------

    async fn handle_data(&self, frame: DataFrame) {
        let xml = match body::decode(&frame) {
            Ok(xml) => xml,
            Err(e) => {
                warn!(error = %e, id = %frame.id, "dropping undecodable data frame");
                return;
            }
        };
        *self.last_raw_body.write().await = Some(frame.body.clone());

        // Fire-and-forget fan-out; joined below within the budget.
        let delivery = self.fanout.dispatch(xml.clone());

        let kind = TelegramKind::from_code(&frame.head.telegram_type);
        match telegram::dispatch(&kind, &xml, &self.geo) {
            Ok(event) => self.apply_event(event).await,
            Err(e) => warn!(error = %e, kind = kind.code(), "failed to parse telegram"),
        }

        if tokio::time::timeout(FANOUT_JOIN_BUDGET, delivery).await.is_err() {
            warn!("fan-out delivery exceeded join budget");
        }
    }

    async fn apply_event(&self, event: TelegramEvent) {
        match event {
            TelegramEvent::EewForecast(event) | TelegramEvent::EewWarning(event) => {
                self.targets.eew.apply_stream_event(*event).await;
            }
            TelegramEvent::Earthquake(outcome) => {
                if let Err(e) = self.targets.p2p.apply_stream_report(outcome).await {
                    error!(error = %e, "earthquake log consistency violation");
                }
            }
            TelegramEvent::TsunamiExpectation(update) => {
                self.targets.tsunami.apply_expectation(*update).await;
            }
            TelegramEvent::TsunamiObservation(update) => {
                self.targets.tsunami.apply_watch(*update).await;
            }
            TelegramEvent::Skipped | TelegramEvent::Unhandled(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Liveness & status
    // -----------------------------------------------------------------------

    /// Scheduled every minute, immediate first run. Re-establishes the
    /// connection when the socket is gone or the pong is stale.
    pub async fn keep_alive(self: Arc<Self>) {
        let (connected, errored, socket_id) = {
            let state = self.state.lock().await;
            (state.connected, state.ws_errored, state.active_socket_id)
        };
        let pong_delta = chrono::Utc::now().timestamp() - self.last_pong_time.load(Ordering::SeqCst);

        if !connected || errored || socket_id.is_none() {
            warn!("no active websocket, starting a new one");
        } else if pong_delta > PONG_STALE_SECS {
            error!(span = pong_delta, "last pong too old");
        } else {
            debug!("socket is alive");
            return;
        }

        let mut tries = 0;
        while !self.state.lock().await.connected && tries < 2 {
            self.get_current_token().await;
            Arc::clone(&self).start_connection().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
            tries += 1;
        }
        if self.state.lock().await.active_socket_id.is_none() {
            error!("still no active websocket, check logs");
        }
    }

    /// Hourly token refresh job.
    pub async fn refresh_token_job(&self) {
        self.get_current_token().await;
    }

    /// Status triple for the heartbeat route.
    pub async fn status(&self) -> StreamingStatusReport {
        let (connected, errored, socket_id) = {
            let state = self.state.lock().await;
            (state.connected, state.ws_errored, state.active_socket_id)
        };
        let last_pong_time = self.last_pong_time.load(Ordering::SeqCst);
        let pong_time_delta = chrono::Utc::now().timestamp() - last_pong_time;
        let websocket_errored = !connected || errored;
        let ok = socket_id.is_some() && !websocket_errored && pong_time_delta < PONG_STALE_SECS;
        StreamingStatusReport {
            status: (if ok { "OK" } else { "FAIL" }).to_owned(),
            active_socket_id: socket_id,
            websocket_errored,
            last_pong_time,
            pong_time_delta,
        }
    }

    pub async fn is_ok(&self) -> bool {
        self.status().await.status == "OK"
    }

    /// The most recent raw (base64) telegram body.
    pub async fn last_raw_body(&self) -> Option<String> {
        self.last_raw_body.read().await.clone()
    }

    /// Shutdown close path: best-effort DELETE with zero retries.
    pub async fn shutdown_close(&self) {
        self.close_socket(0).await;
    }

    /// Seconds since the last pong (exposed for tests).
    pub fn last_pong(&self) -> i64 {
        self.last_pong_time.load(Ordering::SeqCst)
    }
}
