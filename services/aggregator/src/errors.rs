//! Error types, one enum per boundary.
//!
//! Every error is recovered locally at its module boundary; nothing here
//! crosses into the HTTP layer except as a read-time `404 NotReady`.

use std::time::Duration;

/// Fatal boot-time problems: unreadable config, missing env, bad assets.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Token refresh failures. The client keeps its previous token and lets
/// the hourly timer retry.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token endpoint: {0}")]
    Fetch(#[from] FetchError),
    #[error("token refused: {error}: {description}")]
    Refused { error: String, description: String },
}

/// Session open/close failures; reconnection happens on the next
/// keep-alive tick.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no access token")]
    NoToken,
    #[error("socket endpoint: {0}")]
    Fetch(#[from] FetchError),
    #[error("socket refused: {code}: {message}")]
    Refused { code: i64, message: String },
    #[error("WS: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// HTTP transport failures after the retry budget is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request: {0}")]
    Transport(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("status {0}")]
    Status(u16),
    #[error("body decode: {0}")]
    Decode(String),
}

/// Body or telegram decode failures; the offending message is dropped
/// with a warning.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(
        "unsupported encoding: format={format:?} compression={compression:?} encoding={encoding:?}"
    )]
    UnsupportedEncoding {
        format: Option<String>,
        compression: Option<String>,
        encoding: Option<String>,
    },
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("gzip: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("schema: {0}")]
    Schema(String),
}

/// Domain-level inconsistencies found after a successful decode.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("destination report {id} has no prior scale prompt")]
    NoPriorScalePrompt { id: String },
    #[error("saved scale prompt id {saved} does not match destination id {got}")]
    ScalePromptIdMismatch { saved: String, got: String },
}
