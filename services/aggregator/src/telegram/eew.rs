//! VXSE43/VXSE44: EEW warning/forecast telegram parser.

use qm_model::{
    Depth, EewArrival, EewEvent, EewForecastArea, EewLifecycle, EventTime, Hypocenter, Intensity,
    IntensityInterval, IntensityTo, LgIntensity, LgIntensityInterval, LgIntensityTo, Magnitude,
};
use roxmltree::{Document, Node};
use tracing::warn;

use crate::errors::DecodeError;
use crate::telegram::xml::{child, child_text, children, parse_jma_time, require, require_text};

const UNKNOWN_HYPOCENTER: &str = "震源要素不明";
const WARNING_KIND_NAME: &str = "緊急地震速報（警報）";
const WARNING_COMMENT_CODE: &str = "0201";

/// Parse one EEW telegram into the unified event model.
///
/// `is_warning` is true for VXSE43. A telegram whose info status is not
/// `発表` short-circuits to the blank cancelled event.
pub fn parse(doc: &Document<'_>, is_warning: bool) -> Result<EewEvent, DecodeError> {
    let report = require(doc.root(), "Report")?;
    let control = require(report, "Control")?;
    let head = require(report, "Head")?;
    let body = require(report, "Body")?;

    let lifecycle = match child_text(control, "Status") {
        Some("通常") => EewLifecycle::Normal,
        Some("試験") => {
            warn!("EEW test telegram: tagging as test");
            EewLifecycle::Test
        }
        other => {
            warn!(status = ?other, "EEW training telegram: tagging as training");
            EewLifecycle::Training
        }
    };

    if child_text(head, "InfoType") != Some("発表") {
        warn!("EEW cancellation: returning cancelled model");
        return Ok(EewEvent::cancelled());
    }

    let event_id = require_text(head, "EventID")?.to_owned();
    let serial: u32 = child_text(head, "Serial")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let (announced_unix, announced_str) = parse_jma_time(require_text(head, "ReportDateTime")?)?;

    let earthquake = require(body, "Earthquake")?;
    let origin = match child_text(earthquake, "OriginTime") {
        Some(raw) => parse_jma_time(raw)?,
        None => {
            warn!("EEW origin time unknown: defaulting to arrival time");
            parse_jma_time(require_text(earthquake, "ArrivalTime")?)?
        }
    };

    let is_final = child_text(body, "NextAdvisory").is_none();
    let is_assumption = child_text(earthquake, "Condition").is_some();

    let magnitude = match child_text(earthquake, "Magnitude") {
        // "1.0" is the vendor's placeholder for an undetermined magnitude.
        Some("NaN") | Some("1.0") | None => Magnitude::Unknown,
        Some(raw) => raw
            .parse()
            .map(Magnitude::Value)
            .unwrap_or(Magnitude::Unknown),
    };

    let hypocenter_area = child(earthquake, "Hypocenter")
        .and_then(|h| child(h, "Area"))
        .ok_or_else(|| DecodeError::Schema("missing Hypocenter/Area".to_owned()))?;
    let (latitude, longitude, depth) = parse_coordinate(hypocenter_area);

    let mut is_warn = is_warning;
    if let Some(comments) = child(body, "Comments") {
        if let Some(warning_comment) = child(comments, "WarningComment") {
            if child_text(warning_comment, "Code") == Some(WARNING_COMMENT_CODE) {
                is_warn = true;
            }
        }
    }

    let intensity = child(body, "Intensity");
    let forecast = intensity.and_then(|i| child(i, "Forecast"));
    let (max_intensity, max_lg_intensity) = match forecast {
        Some(forecast) => (
            parse_intensity_interval(child(forecast, "ForecastInt")),
            parse_lg_interval(child(forecast, "ForecastLgInt")),
        ),
        None => (
            IntensityInterval {
                lowest: Intensity::None,
                highest: None,
            },
            LgIntensityInterval {
                lowest: LgIntensity::None,
                highest: None,
            },
        ),
    };

    let mut event = EewEvent {
        lifecycle,
        event_id,
        serial,
        announced: EventTime {
            unix_time: announced_unix,
            time_string: announced_str,
        },
        origin: EventTime {
            unix_time: origin.0,
            time_string: origin.1,
        },
        hypocenter: Hypocenter {
            name: child_text(hypocenter_area, "Name").unwrap_or_default().to_owned(),
            code: child_text(hypocenter_area, "Code").unwrap_or_default().to_owned(),
            latitude,
            longitude,
            depth,
            magnitude,
            is_assumption,
        },
        max_intensity,
        max_lg_intensity,
        is_final,
        is_warn,
        forecast_areas: Vec::new(),
    };

    if let Some(forecast) = forecast {
        if event.is_warn || child(forecast, "Pref").is_some() {
            for pref in children(forecast, "Pref") {
                let Some(area) = child(pref, "Area") else {
                    continue;
                };
                event.forecast_areas.push(parse_forecast_area(area)?);
            }
        }
    }

    Ok(event)
}

/// `([+-]lat)([+-]lon)([+-]depth_meters)?`: depth stored as positive km
/// after dividing by 1000 and negating the sign.
pub fn parse_coordinate(area: Node<'_, '_>) -> (f64, f64, Depth) {
    let unknown = (qm_model::COORD_UNKNOWN, qm_model::COORD_UNKNOWN, Depth::Unknown);
    let Some(coordinate) = child(area, "Coordinate") else {
        return unknown;
    };
    if coordinate.attribute("description") == Some(UNKNOWN_HYPOCENTER) {
        warn!("unknown hypocenter: keeping sentinels");
        return unknown;
    }
    let Some(raw) = coordinate.text() else {
        return unknown;
    };

    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        regex::Regex::new(r"([+-][0-9.]+)([+-][0-9.]+)([+-][0-9.]+)?")
            .expect("coordinate pattern is valid")
    });
    let Some(captures) = pattern.captures(raw.trim()) else {
        warn!(raw, "unparseable coordinate string");
        return unknown;
    };

    let latitude: f64 = captures[1].parse().unwrap_or(qm_model::COORD_UNKNOWN);
    let longitude: f64 = captures[2].parse().unwrap_or(qm_model::COORD_UNKNOWN);
    let depth = match captures.get(3) {
        Some(meters) => meters
            .as_str()
            .parse::<f64>()
            .map(|m| Depth::from_km((-(m / 1000.0)).round() as i64))
            .unwrap_or(Depth::Unknown),
        None => Depth::Unknown,
    };
    (latitude, longitude, depth)
}

fn parse_intensity_interval(node: Option<Node<'_, '_>>) -> IntensityInterval {
    let Some(node) = node else {
        return IntensityInterval {
            lowest: Intensity::None,
            highest: None,
        };
    };
    IntensityInterval {
        lowest: child_text(node, "From").map_or(Intensity::None, Intensity::from_code),
        highest: child_text(node, "To").map(IntensityTo::from_code),
    }
}

fn parse_lg_interval(node: Option<Node<'_, '_>>) -> LgIntensityInterval {
    let Some(node) = node else {
        return LgIntensityInterval {
            lowest: LgIntensity::None,
            highest: None,
        };
    };
    LgIntensityInterval {
        lowest: child_text(node, "From").map_or(LgIntensity::None, LgIntensity::from_code),
        highest: child_text(node, "To").map(LgIntensityTo::from_code),
    }
}

fn parse_forecast_area(area: Node<'_, '_>) -> Result<EewForecastArea, DecodeError> {
    let kind = child(area, "Category")
        .and_then(|c| child(c, "Kind"))
        .ok_or_else(|| DecodeError::Schema("missing forecast Category/Kind".to_owned()))?;
    let kind_code = child_text(kind, "Code").unwrap_or_default();
    let kind_name = child_text(kind, "Name").unwrap_or_default();

    // The second digit of the kind code flags a PLUM-only area.
    let is_plum_area = kind_code.as_bytes().get(1) == Some(&b'9');
    let arrival = if is_plum_area {
        EewArrival {
            flag: false,
            condition: "PLUM".to_owned(),
            time: "Unknown".to_owned(),
        }
    } else {
        let time = match child_text(area, "ArrivalTime") {
            Some(raw) => parse_jma_time(raw)?.1,
            None => "00:00:00".to_owned(),
        };
        EewArrival {
            flag: false,
            condition: child_text(area, "Condition")
                .unwrap_or("未到達と推測")
                .to_owned(),
            time,
        }
    };

    let interval = parse_intensity_interval(child(area, "ForecastInt"));
    let lowest = interval.lowest;
    // An open-ended upper bound collapses to the lower bound for display.
    let highest = interval.highest.map_or(lowest, |to| to.resolve(lowest));

    let (lg_lowest, lg_highest) = match child(area, "ForecastLgInt") {
        Some(_) => {
            let lg = parse_lg_interval(child(area, "ForecastLgInt"));
            let high = lg.highest.map_or(lg.lowest, |to| to.resolve(lg.lowest));
            (Some(lg.lowest), Some(high))
        }
        None => (None, None),
    };

    Ok(EewForecastArea {
        code: child_text(area, "Code").unwrap_or_default().to_owned(),
        name: child_text(area, "Name").unwrap_or_default().to_owned(),
        lowest,
        highest,
        lg_lowest,
        lg_highest,
        is_warn: kind_name == WARNING_KIND_NAME,
        arrival,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast_xml(serial: u32, warn_comment: bool, next_advisory: bool) -> String {
        format!(
            r#"<Report xmlns:jmx_eb="http://xml.kishou.go.jp/jmaxml1/elementBasis1/">
  <Control><Title>緊急地震速報（予報）</Title><Status>通常</Status></Control>
  <Head>
    <Title>緊急地震速報（予報）</Title>
    <ReportDateTime>2026-01-01T12:00:10+09:00</ReportDateTime>
    <EventID>20260101120000</EventID>
    <InfoType>発表</InfoType>
    <Serial>{serial}</Serial>
  </Head>
  <Body>
    <Earthquake>
      <OriginTime>2026-01-01T11:59:50+09:00</OriginTime>
      <ArrivalTime>2026-01-01T11:59:55+09:00</ArrivalTime>
      <Hypocenter>
        <Area>
          <Name>福島県沖</Name>
          <Code>289</Code>
          <jmx_eb:Coordinate description="北緯37.0度 東経141.1度 深さ10km">+37.0+141.1-10000/</jmx_eb:Coordinate>
        </Area>
      </Hypocenter>
      <jmx_eb:Magnitude description="M6.6">6.6</jmx_eb:Magnitude>
    </Earthquake>
    <Intensity>
      <Forecast>
        <ForecastInt><From>5-</From><To>over</To></ForecastInt>
        <Pref>
          <Name>福島</Name><Code>07</Code>
          <Area>
            <Name>福島県浜通り</Name><Code>290</Code>
            <Category><Kind><Name>緊急地震速報（警報）</Name><Code>10</Code></Kind></Category>
            <ForecastInt><From>5-</From><To>over</To></ForecastInt>
            <ArrivalTime>2026-01-01T12:00:20+09:00</ArrivalTime>
          </Area>
        </Pref>
      </Forecast>
    </Intensity>
    {comments}
    {next}
  </Body>
</Report>"#,
            serial = serial,
            comments = if warn_comment {
                "<Comments><WarningComment codeType=\"固定付加文\"><Text>強い揺れに警戒してください。</Text><Code>0201</Code></WarningComment></Comments>"
            } else {
                ""
            },
            next = if next_advisory {
                "<NextAdvisory>この情報は続報があります。</NextAdvisory>"
            } else {
                ""
            },
        )
    }

    #[test]
    fn parses_forecast_with_areas() {
        let xml = forecast_xml(1, false, true);
        let doc = Document::parse(&xml).unwrap();
        let event = parse(&doc, false).unwrap();

        assert_eq!(event.lifecycle, EewLifecycle::Normal);
        assert_eq!(event.event_id, "20260101120000");
        assert_eq!(event.serial, 1);
        assert!(!event.is_warn);
        assert!(!event.is_final);
        assert_eq!(event.hypocenter.name, "福島県沖");
        assert_eq!(event.hypocenter.depth, Depth::Km(10));
        assert_eq!(event.hypocenter.magnitude, Magnitude::Value(6.6));
        assert_eq!(event.max_intensity.lowest, Intensity::FiveLower);
        assert_eq!(event.forecast_areas.len(), 1);
        let area = &event.forecast_areas[0];
        assert_eq!(area.name, "福島県浜通り");
        // "over" collapses to the lower bound.
        assert_eq!(area.highest, Intensity::FiveLower);
        assert!(area.is_warn);
        assert_eq!(area.arrival.time, "2026/01/01 12:00:20");
    }

    #[test]
    fn decoding_twice_is_identical() {
        let xml = forecast_xml(3, true, false);
        let doc = Document::parse(&xml).unwrap();
        let first = parse(&doc, false).unwrap();
        let second = parse(&doc, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn warning_comment_0201_sets_is_warn() {
        let xml = forecast_xml(2, true, false);
        let doc = Document::parse(&xml).unwrap();
        let event = parse(&doc, false).unwrap();
        assert!(event.is_warn);
        assert!(event.is_final);
    }

    #[test]
    fn warning_telegram_type_sets_is_warn() {
        let xml = forecast_xml(2, false, false);
        let doc = Document::parse(&xml).unwrap();
        assert!(parse(&doc, true).unwrap().is_warn);
    }

    #[test]
    fn cancellation_short_circuits_to_blank_event() {
        let xml = forecast_xml(2, false, false).replace("発表", "取消");
        let doc = Document::parse(&xml).unwrap();
        let event = parse(&doc, false).unwrap();
        assert!(event.is_cancel());
        assert_eq!(event.event_id, "");
        assert_eq!(event.forecast_areas.len(), 0);
        assert_eq!(event.hypocenter.depth, Depth::Unknown);
    }

    #[test]
    fn nan_and_one_point_zero_magnitudes_are_unknown() {
        for raw in ["NaN", "1.0"] {
            let xml = forecast_xml(1, false, false).replace(
                "<jmx_eb:Magnitude description=\"M6.6\">6.6</jmx_eb:Magnitude>",
                &format!("<jmx_eb:Magnitude description=\"M不明\">{raw}</jmx_eb:Magnitude>"),
            );
            let doc = Document::parse(&xml).unwrap();
            assert_eq!(parse(&doc, false).unwrap().hypocenter.magnitude, Magnitude::Unknown);
        }
    }

    #[test]
    fn depth_roundtrips_from_meters() {
        for meters in [10_000_i64, 50_000, 150_000, 700_000] {
            let xml = forecast_xml(1, false, false).replace(
                "+37.0+141.1-10000/",
                &format!("+37.0+141.1-{meters}/"),
            );
            let doc = Document::parse(&xml).unwrap();
            let depth = parse(&doc, false).unwrap().hypocenter.depth;
            let km = depth.km().unwrap();
            assert!(
                (i64::from(km) * 1000 - meters).abs() < 1,
                "{meters}m -> {km}km"
            );
        }
    }

    #[test]
    fn unknown_hypocenter_keeps_sentinels() {
        let xml = forecast_xml(1, false, false).replace(
            "description=\"北緯37.0度 東経141.1度 深さ10km\">+37.0+141.1-10000/",
            "description=\"震源要素不明\">",
        );
        let doc = Document::parse(&xml).unwrap();
        let event = parse(&doc, false).unwrap();
        assert_eq!(event.hypocenter.latitude, qm_model::COORD_UNKNOWN);
        assert_eq!(event.hypocenter.depth, Depth::Unknown);
    }

    #[test]
    fn plum_area_gets_plum_arrival() {
        let xml = forecast_xml(1, false, false).replace(
            "<Kind><Name>緊急地震速報（警報）</Name><Code>10</Code></Kind>",
            "<Kind><Name>緊急地震速報（予報）</Name><Code>19</Code></Kind>",
        );
        let doc = Document::parse(&xml).unwrap();
        let event = parse(&doc, false).unwrap();
        let area = &event.forecast_areas[0];
        assert_eq!(area.arrival.condition, "PLUM");
        assert_eq!(area.arrival.time, "Unknown");
        assert!(!area.is_warn);
    }

    #[test]
    fn condition_marks_assumption_hypocenter() {
        let xml = forecast_xml(1, false, false).replace(
            "<OriginTime>",
            "<Condition>仮定震源要素</Condition><OriginTime>",
        );
        let doc = Document::parse(&xml).unwrap();
        assert!(parse(&doc, false).unwrap().hypocenter.is_assumption);
    }
}
