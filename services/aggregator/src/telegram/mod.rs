//! Telegram dispatch: one parser per family, total case analysis on the
//! telegram type code.

pub mod earthquake;
pub mod eew;
pub mod tsunami;
pub mod xml;

use qm_model::dmdata::TelegramKind;
use qm_model::EewEvent;
use roxmltree::Document;
use tracing::info;

use crate::errors::DecodeError;
use crate::geodata::GeoData;

pub use earthquake::EarthquakeOutcome;
pub use tsunami::{ExpectationUpdate, WatchUpdate};

/// A normalized telegram, ready to be applied to its target module.
#[derive(Debug, Clone, PartialEq)]
pub enum TelegramEvent {
    EewForecast(Box<EewEvent>),
    EewWarning(Box<EewEvent>),
    Earthquake(EarthquakeOutcome),
    TsunamiExpectation(Box<ExpectationUpdate>),
    TsunamiObservation(Box<WatchUpdate>),
    /// Valid telegram with nothing to apply (drills, non-observation
    /// VTSE51 titles).
    Skipped,
    /// Telegram type outside the dispatch table; logged and dropped.
    Unhandled(String),
}

/// Parse the XML body of one data frame into a [`TelegramEvent`].
///
/// Parsing is pure; the same body always yields the same event.
pub fn dispatch(
    kind: &TelegramKind,
    body_xml: &str,
    geo: &GeoData,
) -> Result<TelegramEvent, DecodeError> {
    let doc = Document::parse(body_xml)?;
    let event = match kind {
        TelegramKind::EewWarning => {
            TelegramEvent::EewWarning(Box::new(eew::parse(&doc, true)?))
        }
        TelegramKind::EewForecast => {
            TelegramEvent::EewForecast(Box::new(eew::parse(&doc, false)?))
        }
        TelegramKind::IntensityReport
        | TelegramKind::Destination
        | TelegramKind::IntensityDestination
        | TelegramKind::DestinationChange => {
            TelegramEvent::Earthquake(earthquake::parse(&doc, kind, geo)?)
        }
        TelegramKind::TsunamiExpectation => match tsunami::parse_expectation(&doc)? {
            Some(update) => TelegramEvent::TsunamiExpectation(Box::new(update)),
            None => TelegramEvent::Skipped,
        },
        TelegramKind::TsunamiObservation => match tsunami::parse_watch(&doc)? {
            Some(update) => TelegramEvent::TsunamiObservation(Box::new(update)),
            None => TelegramEvent::Skipped,
        },
        TelegramKind::Other(code) => {
            info!(code, "telegram type outside dispatch table, dropping");
            TelegramEvent::Unhandled(code.clone())
        }
    };
    Ok(event)
}
