//! VTSE41/VTSE51: tsunami expectation and observation parsers.
//!
//! The expectation telegram enumerates per-area warning grades and
//! first-wave estimates. The observation telegram ("津波観測に関する情報")
//! additionally carries per-station observed heights and an updated
//! forecast section, so parsing it yields both.

use qm_model::{
    TsunamiExpectationArea, TsunamiExpectationSnapshot, TsunamiGrade, TsunamiHeight,
    TsunamiHeightCondition, TsunamiObsCondition, TsunamiObservationSnapshot,
    TsunamiObservationStation, TsunamiParseOrigin, TsunamiTime,
};
use roxmltree::{Document, Node};
use tracing::{error, warn};

use crate::errors::DecodeError;
use crate::telegram::xml::{
    child, child_text, children, parse_jma_time, parse_jma_time_short, require, require_text,
};

const OBSERVATION_TITLE: &str = "津波観測に関する情報";
const FORECAST_KIND: &str = "津波予報（若干の海面変動）";

/// Parsed VTSE41 content plus the module-level flags it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationUpdate {
    pub snapshot: TsunamiExpectationSnapshot,
    pub warning_in_effect: bool,
    pub watch_in_effect: bool,
}

/// Parsed VTSE51 content: updated expectation plus station observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchUpdate {
    pub expectation: ExpectationUpdate,
    pub observation: TsunamiObservationSnapshot,
}

/// Parse a VTSE41 expectation telegram. Drill and test messages return
/// `None` and leave module state untouched.
pub fn parse_expectation(doc: &Document<'_>) -> Result<Option<ExpectationUpdate>, DecodeError> {
    let report = require(doc.root(), "Report")?;
    let control = require(report, "Control")?;
    if child_text(control, "Status") != Some("通常") {
        warn!(
            status = child_text(control, "Status").unwrap_or_default(),
            "drill/other tsunami message skipped"
        );
        return Ok(None);
    }
    let head = require(report, "Head")?;
    let body = require(report, "Body")?;
    let forecast = child(body, "Tsunami")
        .and_then(|t| child(t, "Forecast"))
        .ok_or_else(|| DecodeError::Schema("missing Tsunami/Forecast".to_owned()))?;

    let receive_time = parse_jma_time(require_text(head, "ReportDateTime")?)?.1;
    Ok(Some(parse_forecast_items(
        forecast,
        TsunamiParseOrigin::TsunamiExpectation,
        receive_time,
    )?))
}

/// Parse a VTSE51 observation telegram. Only the "津波観測に関する情報"
/// title with normal control status and issued info status is accepted.
pub fn parse_watch(doc: &Document<'_>) -> Result<Option<WatchUpdate>, DecodeError> {
    let report = require(doc.root(), "Report")?;
    let control = require(report, "Control")?;
    let head = require(report, "Head")?;

    if child_text(head, "Title") != Some(OBSERVATION_TITLE)
        || child_text(control, "Status") != Some("通常")
        || child_text(head, "InfoType") != Some("発表")
    {
        return Ok(None);
    }

    let body = require(report, "Body")?;
    let tsunami = require(body, "Tsunami")?;
    let receive_time = parse_jma_time(require_text(head, "ReportDateTime")?)?.1;

    let forecast = require(tsunami, "Forecast")?;
    let expectation = parse_forecast_items(
        forecast,
        TsunamiParseOrigin::TsunamiWatch,
        receive_time.clone(),
    )?;

    let mut stations = Vec::new();
    if let Some(observation) = child(tsunami, "Observation") {
        for item in children(observation, "Item") {
            for station in children(item, "Station") {
                if let Some(row) = parse_station(station) {
                    stations.push(row);
                }
            }
        }
    }

    Ok(Some(WatchUpdate {
        expectation,
        observation: TsunamiObservationSnapshot {
            receive_time,
            areas: stations,
        },
    }))
}

fn parse_forecast_items(
    forecast: Node<'_, '_>,
    origin: TsunamiParseOrigin,
    receive_time: String,
) -> Result<ExpectationUpdate, DecodeError> {
    let mut areas = Vec::new();
    let mut forecast_areas = Vec::new();

    for item in children(forecast, "Item") {
        let kind_name = child(item, "Category")
            .and_then(|c| child(c, "Kind"))
            .and_then(|k| child_text(k, "Name"))
            .unwrap_or_default();
        // Lifted advisories/warnings drop out of the list entirely.
        if kind_name == "津波注意報解除" || kind_name == "警報解除" {
            continue;
        }

        let name = child(item, "Area")
            .and_then(|a| child_text(a, "Name"))
            .unwrap_or_default()
            .to_owned();

        let grade = if kind_name.contains("大津波警報") {
            TsunamiGrade::MajorWarning
        } else if kind_name.contains("津波警報") {
            TsunamiGrade::Warning
        } else if kind_name.contains("津波注意報") {
            TsunamiGrade::Watch
        } else if kind_name.contains(FORECAST_KIND) {
            TsunamiGrade::Forecast
        } else {
            TsunamiGrade::Unknown
        };

        let mut time = TsunamiTime::unknown();
        if grade != TsunamiGrade::Forecast && grade != TsunamiGrade::Unknown {
            match child(item, "FirstHeight") {
                Some(first_height) => match child_text(first_height, "Condition") {
                    Some("ただちに津波来襲と予測") => time = TsunamiTime::arriving_now(),
                    Some("津波到達中と推測") => time = TsunamiTime::arrival_expected(),
                    Some("第１波の到達を確認") => time = TsunamiTime::arrived(),
                    Some(other) => error!(condition = other, "unknown first-height condition"),
                    None => {
                        if let Some(raw) = child_text(first_height, "ArrivalTime") {
                            let (timestamp, formatted) = parse_jma_time_short(raw)?;
                            time = TsunamiTime::Concrete {
                                time: formatted,
                                timestamp,
                            };
                        }
                    }
                },
                None => error!(area = %name, "first height missing"),
            }
        }

        let height = match child(item, "MaxHeight").and_then(|m| child(m, "TsunamiHeight")) {
            Some(node) => node
                .attribute("description")
                .map_or(TsunamiHeight::Unknown, TsunamiHeight::from_description),
            None => {
                warn!(area = %name, "area height is unknown");
                TsunamiHeight::Unknown
            }
        };

        let area = TsunamiExpectationArea {
            name,
            grade,
            height,
            time,
        };
        if kind_name.contains(FORECAST_KIND) {
            forecast_areas.push(area);
        } else {
            areas.push(area);
        }
    }

    let warning_in_effect = !areas.is_empty();
    let watch_in_effect = !forecast_areas.is_empty();
    Ok(ExpectationUpdate {
        snapshot: TsunamiExpectationSnapshot {
            receive_time,
            origin: Some(origin),
            areas,
            forecast_areas,
        },
        warning_in_effect,
        watch_in_effect,
    })
}

fn parse_station(station: Node<'_, '_>) -> Option<TsunamiObservationStation> {
    let name = child_text(station, "Name").unwrap_or_default().to_owned();
    let max_height = child(station, "MaxHeight")?;

    // A weak or still-observing station short-circuits to a row without a
    // numeric height.
    match child_text(max_height, "Condition") {
        Some("観測中") => {
            return Some(TsunamiObservationStation {
                name,
                time: "None".to_owned(),
                condition: TsunamiObsCondition::Observing,
                height: "None".to_owned(),
                height_condition: TsunamiHeightCondition::No,
                height_is_max: false,
            });
        }
        Some("微弱") => {
            let time = child_text(max_height, "DateTime")
                .and_then(|raw| parse_jma_time_short(raw).ok())
                .map(|(_, formatted)| formatted)
                .unwrap_or_default();
            return Some(TsunamiObservationStation {
                name,
                time,
                condition: TsunamiObsCondition::Weak,
                height: "None".to_owned(),
                height_condition: TsunamiHeightCondition::No,
                height_is_max: false,
            });
        }
        _ => {}
    }

    let time = match child_text(max_height, "DateTime") {
        Some(raw) => parse_jma_time_short(raw).ok()?.1,
        None => {
            error!(station = %name, "observed station without a timestamp");
            return None;
        }
    };
    let Some(height) = child(max_height, "TsunamiHeight") else {
        error!(station = %name, "observed station without a height");
        return None;
    };

    let height_condition = match height.attribute("condition") {
        Some("上昇中") => TsunamiHeightCondition::Rising,
        _ => TsunamiHeightCondition::No,
    };
    let height_is_max = height
        .attribute("description")
        .is_some_and(|d| d.contains("以上"));

    Some(TsunamiObservationStation {
        name,
        time,
        condition: TsunamiObsCondition::No,
        height: height.text().unwrap_or_default().trim().to_owned(),
        height_condition,
        height_is_max,
    })
}
