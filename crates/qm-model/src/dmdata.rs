//! DMData wire types: OAuth2 token exchange, socket session envelopes and
//! the WebSocket frame protocol.
//!
//! All WebSocket frames are UTF-8 JSON with a top-level `type` field used
//! for discriminated deserialization. The `data` frame carries the telegram
//! body as base64(gzip(UTF-8 XML)).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Telegram type codes
// ---------------------------------------------------------------------------

/// Telegram families this service understands. Everything else is logged
/// and dropped by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TelegramKind {
    /// VXSE43: EEW warning.
    EewWarning,
    /// VXSE44: EEW forecast.
    EewForecast,
    /// VXSE51: earthquake intensity report.
    IntensityReport,
    /// VXSE52: earthquake destination report.
    Destination,
    /// VXSE53: intensity + destination detail report.
    IntensityDestination,
    /// VXSE61: destination change (acknowledged, never acted upon).
    DestinationChange,
    /// VTSE41: tsunami expectation.
    TsunamiExpectation,
    /// VTSE51: tsunami observation.
    TsunamiObservation,
    Other(String),
}

impl TelegramKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "VXSE43" => Self::EewWarning,
            "VXSE44" => Self::EewForecast,
            "VXSE51" => Self::IntensityReport,
            "VXSE52" => Self::Destination,
            "VXSE53" => Self::IntensityDestination,
            "VXSE61" => Self::DestinationChange,
            "VTSE41" => Self::TsunamiExpectation,
            "VTSE51" => Self::TsunamiObservation,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::EewWarning => "VXSE43",
            Self::EewForecast => "VXSE44",
            Self::IntensityReport => "VXSE51",
            Self::Destination => "VXSE52",
            Self::IntensityDestination => "VXSE53",
            Self::DestinationChange => "VXSE61",
            Self::TsunamiExpectation => "VTSE41",
            Self::TsunamiObservation => "VTSE51",
            Self::Other(code) => code,
        }
    }
}

// ---------------------------------------------------------------------------
// OAuth2 token exchange
// ---------------------------------------------------------------------------

/// Form body of the refresh-token exchange.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
    pub refresh_token: String,
}

impl TokenRequest {
    pub fn refresh(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            grant_type: "refresh_token".to_owned(),
            refresh_token: refresh_token.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

/// OAuth2 error envelope (`error` + human description).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenError {
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

// ---------------------------------------------------------------------------
// Socket session open/close
// ---------------------------------------------------------------------------

/// JSON body of the socket-open POST.
#[derive(Debug, Clone, Serialize)]
pub struct SocketStartRequest {
    pub classifications: Vec<String>,
    pub types: Vec<String>,
    #[serde(rename = "appName")]
    pub app_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketEndpoint {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub expiration: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketStartResponse {
    #[serde(default)]
    pub status: String,
    pub ticket: String,
    pub websocket: SocketEndpoint,
    #[serde(default)]
    pub classifications: Vec<String>,
}

/// Generic REST error envelope returned by the session endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub status: String,
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    pub code: i64,
    pub message: String,
}

// ---------------------------------------------------------------------------
// WebSocket frames
// ---------------------------------------------------------------------------

/// Inbound/outbound WebSocket frames, discriminated on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketFrame {
    Start(StartFrame),
    Ping(PingFrame),
    Pong(PongFrame),
    Data(Box<DataFrame>),
    Error(ErrorFrame),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartFrame {
    #[serde(rename = "socketId")]
    pub socket_id: i64,
    #[serde(default)]
    pub classifications: Vec<String>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub formats: Vec<String>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingFrame {
    #[serde(rename = "pingId")]
    pub ping_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongFrame {
    #[serde(rename = "pingId")]
    pub ping_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataHead {
    #[serde(rename = "type")]
    pub telegram_type: String,
    #[serde(default)]
    pub author: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub xml: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    #[serde(default)]
    pub version: String,
    pub id: String,
    #[serde(default)]
    pub classification: String,
    pub head: DataHead,
    /// Only `"xml"` bodies are accepted.
    #[serde(default)]
    pub format: Option<String>,
    /// Only `"gzip"` bodies are accepted.
    #[serde(default)]
    pub compression: Option<String>,
    /// Only `"base64"` bodies are accepted.
    #[serde(default)]
    pub encoding: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
    pub code: i64,
    pub close: bool,
}

/// Status triple exposed through the heartbeat route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingStatusReport {
    pub status: String,
    pub active_socket_id: Option<i64>,
    pub websocket_errored: bool,
    pub last_pong_time: i64,
    pub pong_time_delta: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_deserialize_by_type_tag() {
        let ping: SocketFrame = serde_json::from_str(r#"{"type":"ping","pingId":"abc"}"#).unwrap();
        assert_eq!(
            ping,
            SocketFrame::Ping(PingFrame {
                ping_id: "abc".to_owned()
            })
        );

        let err: SocketFrame =
            serde_json::from_str(r#"{"type":"error","error":"closed","code":4808,"close":false}"#)
                .unwrap();
        match err {
            SocketFrame::Error(e) => {
                assert_eq!(e.code, 4808);
                assert!(!e.close);
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn pong_serializes_with_camel_case_ping_id() {
        let pong = SocketFrame::Pong(PongFrame {
            ping_id: "xyz".to_owned(),
        });
        let json = serde_json::to_string(&pong).unwrap();
        assert!(json.contains(r#""type":"pong""#));
        assert!(json.contains(r#""pingId":"xyz""#));
    }

    #[test]
    fn telegram_kind_roundtrips_codes() {
        for code in [
            "VXSE43", "VXSE44", "VXSE51", "VXSE52", "VXSE53", "VXSE61", "VTSE41", "VTSE51",
        ] {
            assert_eq!(TelegramKind::from_code(code).code(), code);
        }
        assert_eq!(
            TelegramKind::from_code("VXSE45"),
            TelegramKind::Other("VXSE45".to_owned())
        );
    }
}
