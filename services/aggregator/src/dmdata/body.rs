//! Data-frame body decoding: base64 → gzip → UTF-8 XML.
//!
//! Only `format="xml"`, `compression="gzip"`, `encoding="base64"` bodies
//! are accepted; anything else is an [`DecodeError::UnsupportedEncoding`]
//! and the frame is dropped by the caller.

use std::io::Read;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use qm_model::dmdata::DataFrame;

use crate::errors::DecodeError;

pub fn decode(frame: &DataFrame) -> Result<String, DecodeError> {
    if frame.format.as_deref() != Some("xml")
        || frame.compression.as_deref() != Some("gzip")
        || frame.encoding.as_deref() != Some("base64")
    {
        return Err(DecodeError::UnsupportedEncoding {
            format: frame.format.clone(),
            compression: frame.compression.clone(),
            encoding: frame.encoding.clone(),
        });
    }

    let compressed = BASE64.decode(frame.body.as_bytes())?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qm_model::dmdata::DataHead;

    /// Inverse of [`decode`] for building fixtures.
    fn encode_body(xml: &str) -> String {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        BASE64.encode(encoder.finish().unwrap())
    }

    fn frame(format: &str, compression: &str, encoding: &str, body: String) -> DataFrame {
        DataFrame {
            version: "1.0".to_owned(),
            id: "telegram-1".to_owned(),
            classification: "telegram.earthquake".to_owned(),
            head: DataHead {
                telegram_type: "VXSE51".to_owned(),
                author: "JPOS".to_owned(),
                time: Utc::now(),
                designation: None,
                test: false,
                xml: true,
            },
            format: Some(format.to_owned()),
            compression: Some(compression.to_owned()),
            encoding: Some(encoding.to_owned()),
            body,
        }
    }

    #[test]
    fn roundtrips_xml_bodies() {
        let xml = "<Report><Head><EventID>1</EventID></Head></Report>";
        let decoded = decode(&frame("xml", "gzip", "base64", encode_body(xml))).unwrap();
        assert_eq!(decoded, xml);
    }

    #[test]
    fn rejects_unexpected_envelopes() {
        let body = encode_body("<Report/>");
        for (format, compression, encoding) in [
            ("json", "gzip", "base64"),
            ("xml", "zip", "base64"),
            ("xml", "gzip", "hex"),
        ] {
            let err = decode(&frame(format, compression, encoding, body.clone())).unwrap_err();
            assert!(matches!(err, DecodeError::UnsupportedEncoding { .. }));
        }
    }

    #[test]
    fn rejects_malformed_base64() {
        let err = decode(&frame("xml", "gzip", "base64", "!!!".to_owned())).unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }
}
