// qm-test-utils: mock DMData endpoint and telegram fixtures for
// integration testing.

pub mod mock_dmdata_server;

pub use mock_dmdata_server::MockDmdataServer;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::Write;

/// gzip + base64 a telegram body the way the vendor frames `data` frames.
pub fn encode_body(xml: &str) -> String {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(xml.as_bytes()).expect("in-memory write");
    BASE64.encode(encoder.finish().expect("in-memory finish"))
}

/// Build a `data` frame JSON string carrying `xml` as its body.
pub fn data_frame(telegram_type: &str, xml: &str) -> String {
    serde_json::json!({
        "type": "data",
        "version": "1.0",
        "id": format!("telegram-{telegram_type}"),
        "classification": "telegram.earthquake",
        "head": {
            "type": telegram_type,
            "author": "JPOS",
            "time": "2026-01-01T03:00:00Z",
            "test": false,
            "xml": true
        },
        "format": "xml",
        "compression": "gzip",
        "encoding": "base64",
        "body": encode_body(xml)
    })
    .to_string()
}

/// Build a `ping` frame.
pub fn ping_frame(ping_id: &str) -> String {
    serde_json::json!({ "type": "ping", "pingId": ping_id }).to_string()
}

/// Build an `error` frame.
pub fn error_frame(code: i64, error: &str, close: bool) -> String {
    serde_json::json!({ "type": "error", "error": error, "code": code, "close": close })
        .to_string()
}
