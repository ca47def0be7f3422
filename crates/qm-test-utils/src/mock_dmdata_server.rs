// mock_dmdata_server: A mock DMData WebSocket endpoint for testing the
// streaming client.
//
// Accepts connections on ws://127.0.0.1:<port>, immediately sends the
// vendor `start` frame, then forwards any frame pushed through `push()`
// to every connected client while recording every text frame the clients
// send back.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message;

/// A mock DMData WebSocket endpoint.
///
/// Binds to port 0 (random) and exposes the actual bound address. Each
/// test can spin up its own isolated server instance.
pub struct MockDmdataServer {
    addr: SocketAddr,
    frame_tx: broadcast::Sender<String>,
    received: Arc<Mutex<Vec<String>>>,
    /// Handle to the background accept loop; dropped with the server.
    _task: tokio::task::JoinHandle<()>,
}

impl MockDmdataServer {
    /// Start the mock server on a random port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (frame_tx, _) = broadcast::channel(64);
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn(Self::accept_loop(
            listener,
            frame_tx.clone(),
            Arc::clone(&received),
        ));

        Ok(Self {
            addr,
            frame_tx,
            received,
            _task: task,
        })
    }

    /// `ws://` URL of the endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Push one frame (JSON text) to every connected client.
    pub fn push(&self, frame: String) {
        let _ = self.frame_tx.send(frame);
    }

    /// All text frames received from clients so far.
    pub async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    /// Received frames parsed as JSON, filtered on `type`.
    pub async fn received_of_type(&self, frame_type: &str) -> Vec<serde_json::Value> {
        self.received()
            .await
            .iter()
            .filter_map(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .filter(|v| v.get("type").and_then(|t| t.as_str()) == Some(frame_type))
            .collect()
    }

    async fn accept_loop(
        listener: TcpListener,
        frame_tx: broadcast::Sender<String>,
        received: Arc<Mutex<Vec<String>>>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let frames = frame_tx.subscribe();
                    let received = Arc::clone(&received);
                    tokio::spawn(async move {
                        // Connection errors are expected in tests (client
                        // drops); swallow them.
                        let _ = Self::handle_connection(stream, frames, received).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut frames: broadcast::Receiver<String>,
        received: Arc<Mutex<Vec<String>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws.split();

        let start = serde_json::json!({
            "type": "start",
            "socketId": 424242,
            "classifications": ["telegram.earthquake", "eew.forecast"],
            "formats": ["xml"],
            "time": "2026-01-01T03:00:00Z"
        })
        .to_string();
        write.send(Message::Text(start.into())).await?;

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(frame) => write.send(Message::Text(frame.into())).await?,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                msg = read.next() => match msg {
                    None => break,
                    Some(Err(_)) => break,
                    Some(Ok(Message::Text(text))) => {
                        received.lock().await.push(text.to_string());
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
        Ok(())
    }
}
