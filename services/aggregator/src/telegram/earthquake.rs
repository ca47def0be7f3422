//! VXSE51/52/53/61: earthquake report telegram parsers.
//!
//! Classification:
//! - VXSE51 → `ScalePrompt` (per-area intensities, no hypocenter)
//! - VXSE52 → `Destination` (hypocenter, no intensities)
//! - VXSE53 → `DetailScale`, or `Foreign` when the title marks a distant
//!   earthquake or the intensity block is absent
//! - VXSE61 → acknowledged but never acted upon

use chrono::Local;
use qm_model::dmdata::TelegramKind;
use qm_model::{
    AreaIntensityPoint, AreaIntensityRollup, DomesticTsunami, EarthquakeIssueType,
    EarthquakeReport, Epicenter, ForeignTsunami, Intensity, StationIntensityPoint, TsunamiComment,
};
use roxmltree::{Document, Node};
use tracing::{debug, error, warn};

use crate::errors::DecodeError;
use crate::geodata::GeoData;
use crate::telegram::eew::parse_coordinate;
use crate::telegram::xml::{child, child_text, children, parse_jma_time, require, require_text};

const FOREIGN_TITLE: &str = "遠地地震に関する情報";
const OVER_EIGHT_DESCRIPTION: &str = "Ｍ８を超える巨大地震";
const UNRECEIVED_OVER_FIVE_LOWER: &str = "震度５弱以上未入電";

/// Result of parsing one earthquake-family telegram.
#[derive(Debug, Clone, PartialEq)]
pub enum EarthquakeOutcome {
    Report(Box<EarthquakeReport>),
    /// Rare cancellation message.
    Cancel,
    /// VXSE61 destination change.
    // TODO: apply the epicenter update to the stored report once the
    // upstream semantic is settled; today it intentionally changes nothing.
    Ignored,
}

/// One observed intensity point before the station→area rollup.
#[derive(Debug, Clone)]
pub struct ObservedPoint {
    pub is_area: bool,
    pub intensity: Intensity,
    pub name: String,
    pub prefecture: String,
}

pub fn parse(
    doc: &Document<'_>,
    kind: &TelegramKind,
    geo: &GeoData,
) -> Result<EarthquakeOutcome, DecodeError> {
    if *kind == TelegramKind::DestinationChange {
        debug!("destination change telegram acknowledged");
        return Ok(EarthquakeOutcome::Ignored);
    }

    let report = require(doc.root(), "Report")?;
    let head = require(report, "Head")?;
    let body = require(report, "Body")?;

    if child_text(head, "InfoType") == Some("取消") {
        warn!(
            event_id = child_text(head, "EventID").unwrap_or_default(),
            "rare earthquake cancellation message"
        );
        return Ok(EarthquakeOutcome::Cancel);
    }

    let issue_type = match kind {
        TelegramKind::IntensityReport => EarthquakeIssueType::ScalePrompt,
        TelegramKind::Destination => EarthquakeIssueType::Destination,
        TelegramKind::IntensityDestination => {
            let title = child_text(head, "Title").unwrap_or_default();
            let intensity = child(body, "Intensity");
            if title == FOREIGN_TITLE || intensity.is_none() {
                EarthquakeIssueType::Foreign
            } else {
                EarthquakeIssueType::DetailScale
            }
        }
        other => {
            return Err(DecodeError::Schema(format!(
                "telegram {} is not an earthquake report",
                other.code()
            )))
        }
    };

    // Epicenter (everything except the intensity-only prompt).
    let mut hypocenter = None;
    let mut magnitude = "-1".to_owned();
    if issue_type != EarthquakeIssueType::ScalePrompt {
        let earthquake = require(body, "Earthquake")?;
        let area = child(earthquake, "Hypocenter")
            .and_then(|h| child(h, "Area"))
            .ok_or_else(|| DecodeError::Schema("missing Hypocenter/Area".to_owned()))?;
        let (latitude, longitude, depth) = parse_coordinate(area);

        magnitude = match child(earthquake, "Magnitude") {
            Some(node) => match node.text().map(str::trim) {
                Some("NaN") | None => {
                    if node.attribute("description") == Some(OVER_EIGHT_DESCRIPTION) {
                        "Over 8".to_owned()
                    } else {
                        "-1".to_owned()
                    }
                }
                Some(value) => value.to_owned(),
            },
            None => "-1".to_owned(),
        };

        hypocenter = Some(Epicenter {
            name: child_text(area, "Name").unwrap_or_default().to_owned(),
            depth,
            latitude,
            longitude,
        });
    }

    // Max intensity.
    let observation = child(body, "Intensity").and_then(|i| child(i, "Observation"));
    let mut max_intensity = Intensity::None;
    if issue_type != EarthquakeIssueType::Destination && issue_type != EarthquakeIssueType::Foreign
    {
        match observation.and_then(|o| child_text(o, "MaxInt")) {
            Some(UNRECEIVED_OVER_FIVE_LOWER) | None => {
                warn!("max intensity unknown or above 5- without reports");
            }
            Some(raw) => max_intensity = Intensity::from_code(raw),
        }
    }

    // Observed points.
    let mut points = Vec::new();
    match issue_type {
        EarthquakeIssueType::ScalePrompt => {
            if let Some(observation) = observation {
                collect_area_points(observation, &mut points);
            }
        }
        EarthquakeIssueType::DetailScale => {
            if let Some(observation) = observation {
                collect_station_points(observation, &mut points);
            }
        }
        _ => {}
    }

    // Tsunami disposition.
    let forecast_comment = child(body, "Comments").and_then(|c| child(c, "ForecastComment"));
    let (code, text) = match forecast_comment {
        Some(comment) => (
            child_text(comment, "Code").unwrap_or_default(),
            child_text(comment, "Text").unwrap_or_default(),
        ),
        None => {
            error!("not cancelled but no forecast comment");
            ("", "")
        }
    };
    let tsunami_comments = TsunamiComment {
        domestic: domestic_tsunami(code, text, issue_type == EarthquakeIssueType::Foreign),
        foreign: if issue_type == EarthquakeIssueType::Foreign {
            foreign_tsunami(code, text)
        } else {
            ForeignTsunami::No
        },
    };

    // Times.
    let occur_time = if issue_type == EarthquakeIssueType::ScalePrompt {
        parse_jma_time(require_text(head, "TargetDateTime")?)?.1
    } else {
        let earthquake = require(body, "Earthquake")?;
        parse_jma_time(require_text(earthquake, "ArrivalTime")?)?.1
    };

    let area_intensity = rollup_points(&points, geo);

    Ok(EarthquakeOutcome::Report(Box::new(EarthquakeReport {
        id: require_text(head, "EventID")?.to_owned(),
        issue_type,
        occur_time,
        receive_time: Local::now().format("%Y/%m/%d %H:%M:%S%.3f").to_string(),
        magnitude,
        max_intensity,
        tsunami_comments,
        hypocenter,
        area_intensity,
    })))
}

/// VXSE51: `Observation/Pref/Area` rows, one point per area.
fn collect_area_points(observation: Node<'_, '_>, points: &mut Vec<ObservedPoint>) {
    for pref in children(observation, "Pref") {
        let prefecture = child_text(pref, "Name").unwrap_or_default();
        for area in children(pref, "Area") {
            let Some(max_int) = child_text(area, "MaxInt") else {
                continue;
            };
            points.push(ObservedPoint {
                is_area: true,
                intensity: Intensity::from_code(max_int),
                name: child_text(area, "Name").unwrap_or_default().to_owned(),
                prefecture: prefecture.to_owned(),
            });
        }
    }
}

/// VXSE53: `Observation/Pref/Area/City/IntensityStation` rows, one point
/// per station. Station names carry a `＊` marker that is stripped.
fn collect_station_points(observation: Node<'_, '_>, points: &mut Vec<ObservedPoint>) {
    for pref in children(observation, "Pref") {
        let prefecture = child_text(pref, "Name").unwrap_or_default();
        for area in children(pref, "Area") {
            for city in children(area, "City") {
                for station in children(city, "IntensityStation") {
                    let Some(intensity) = child_text(station, "Int") else {
                        continue;
                    };
                    let name = child_text(station, "Name")
                        .unwrap_or_default()
                        .replace('＊', "");
                    points.push(ObservedPoint {
                        is_area: false,
                        intensity: Intensity::from_code(intensity),
                        name,
                        prefecture: prefecture.to_owned(),
                    });
                }
            }
        }
    }
}

/// Station→area rollup. Area points pass through; station points also
/// promote their region, which keeps the maximum station intensity.
pub fn rollup_points(points: &[ObservedPoint], geo: &GeoData) -> AreaIntensityRollup {
    let mut rollup = AreaIntensityRollup::default();

    for point in points {
        if point.is_area {
            let Some(centroid) = geo.area_centroid.get(&point.name) else {
                // Very common; leave a trace only.
                tracing::trace!(
                    prefecture = %point.prefecture,
                    name = %point.name,
                    "no centroid for area point"
                );
                continue;
            };
            rollup.areas.insert(
                point.name.clone(),
                AreaIntensityPoint {
                    name: point.name.clone(),
                    intensity: point.intensity,
                    latitude: centroid.latitude,
                    longitude: centroid.longitude,
                    is_area: true,
                },
            );
        } else {
            let Some(centroid) = geo.station_centroid.get(&point.name) else {
                tracing::trace!(
                    prefecture = %point.prefecture,
                    name = %point.name,
                    "no centroid for station point"
                );
                continue;
            };
            rollup.station.insert(
                point.name.clone(),
                StationIntensityPoint {
                    name: point.name.clone(),
                    intensity: point.intensity,
                    latitude: centroid.latitude,
                    longitude: centroid.longitude,
                    is_area: false,
                    region_code: centroid.region_code.clone(),
                    region_name: centroid.region_name.clone(),
                },
            );

            use std::collections::btree_map::Entry;
            match rollup.areas.entry(centroid.region_name.clone()) {
                Entry::Occupied(mut area) => {
                    if point.intensity > area.get().intensity {
                        area.get_mut().intensity = point.intensity;
                    }
                }
                Entry::Vacant(slot) => {
                    let Some(position) = geo.area_positions.get(&centroid.region_code) else {
                        continue;
                    };
                    slot.insert(AreaIntensityPoint {
                        name: centroid.region_name.clone(),
                        intensity: point.intensity,
                        latitude: position.latitude,
                        longitude: position.longitude,
                        is_area: true,
                    });
                }
            }
        }
    }

    rollup
}

fn domestic_tsunami(code: &str, text: &str, is_foreign: bool) -> DomesticTsunami {
    if code.is_empty() && text.is_empty() {
        return DomesticTsunami::Unknown;
    }
    if code.contains("0215") || code.contains("0230") {
        return DomesticTsunami::No;
    }
    if code.contains("0212") || code.contains("0213") || code.contains("0214") {
        return DomesticTsunami::NonEffective;
    }
    if code.contains("0211") {
        return DomesticTsunami::Warning;
    }
    if code.contains("0217") || code.contains("0229") {
        return DomesticTsunami::Checking;
    }

    error!(code, "falling back to tsunami text matching");
    if is_foreign {
        if text.contains("津波の心配はありません") || text.contains("津波の影響はありません") {
            return DomesticTsunami::No;
        }
        if text.contains("若干の海面変動") {
            return DomesticTsunami::NonEffective;
        }
        if text.contains("調査中です") {
            return DomesticTsunami::Checking;
        }
    } else {
        if text.contains("津波の心配はありません") {
            return DomesticTsunami::No;
        }
        if text.contains("若干の海面変動") {
            return DomesticTsunami::NonEffective;
        }
        if text.contains("津波注意報") || (text.contains("津波警報") && text.contains("発表")) {
            return DomesticTsunami::Warning;
        }
    }

    error!(code, text, "no valid tsunami message found");
    DomesticTsunami::No
}

fn foreign_tsunami(code: &str, text: &str) -> ForeignTsunami {
    if code.is_empty() && text.is_empty() {
        return ForeignTsunami::Unknown;
    }
    if code.contains("0215") {
        return ForeignTsunami::No;
    }
    if code.contains("0221") {
        return ForeignTsunami::WarningPacificWide;
    }
    if code.contains("0222") {
        return ForeignTsunami::WarningPacific;
    }
    if code.contains("0223") {
        return ForeignTsunami::WarningNorthwestPacific;
    }
    if code.contains("0224") {
        return ForeignTsunami::WarningIndianWide;
    }
    if code.contains("0225") {
        return ForeignTsunami::WarningIndian;
    }
    if code.contains("0226") {
        return ForeignTsunami::WarningNearby;
    }
    if code.contains("0227") {
        return ForeignTsunami::NonEffectiveNearby;
    }
    if code.contains("0228") {
        return ForeignTsunami::Potential;
    }

    error!(code, "falling back to foreign tsunami text matching");
    if text.contains("この地震による津波の心配はありません") {
        return ForeignTsunami::No;
    }
    error!(code, text, "no valid foreign tsunami message found");
    ForeignTsunami::No
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodata::{AreaCentroid, AreaPosition, StationCentroid};

    fn geo() -> GeoData {
        let mut geo = GeoData::default();
        geo.area_centroid.insert(
            "福島県浜通り".to_owned(),
            AreaCentroid {
                latitude: 37.2,
                longitude: 141.0,
            },
        );
        geo.station_centroid.insert(
            "いわき市小名浜".to_owned(),
            StationCentroid {
                latitude: 36.9,
                longitude: 140.9,
                region_code: "290".to_owned(),
                region_name: "福島県浜通り".to_owned(),
            },
        );
        geo.station_centroid.insert(
            "いわき市平".to_owned(),
            StationCentroid {
                latitude: 37.0,
                longitude: 140.9,
                region_code: "290".to_owned(),
                region_name: "福島県浜通り".to_owned(),
            },
        );
        geo.area_positions.insert(
            "290".to_owned(),
            AreaPosition {
                name: "福島県浜通り".to_owned(),
                latitude: 37.2,
                longitude: 141.0,
            },
        );
        geo
    }

    fn scale_prompt_xml() -> &'static str {
        r#"<Report>
  <Head>
    <Title>震度速報</Title>
    <ReportDateTime>2026-01-01T12:01:00+09:00</ReportDateTime>
    <TargetDateTime>2026-01-01T12:00:00+09:00</TargetDateTime>
    <EventID>20260101120000</EventID>
    <InfoType>発表</InfoType>
  </Head>
  <Body>
    <Intensity>
      <Observation>
        <MaxInt>5-</MaxInt>
        <Pref>
          <Name>福島県</Name><Code>07</Code>
          <Area><Name>福島県浜通り</Name><Code>290</Code><MaxInt>5-</MaxInt></Area>
        </Pref>
      </Observation>
    </Intensity>
    <Comments>
      <ForecastComment codeType="固定付加文">
        <Text>津波の心配はありません。</Text>
        <Code>0215</Code>
      </ForecastComment>
    </Comments>
  </Body>
</Report>"#
    }

    fn detail_xml() -> &'static str {
        r#"<Report xmlns:jmx_eb="http://xml.kishou.go.jp/jmaxml1/elementBasis1/">
  <Head>
    <Title>震源・震度に関する情報</Title>
    <ReportDateTime>2026-01-01T12:10:00+09:00</ReportDateTime>
    <TargetDateTime>2026-01-01T12:00:00+09:00</TargetDateTime>
    <EventID>20260101120000</EventID>
    <InfoType>発表</InfoType>
  </Head>
  <Body>
    <Earthquake>
      <OriginTime>2026-01-01T11:59:50+09:00</OriginTime>
      <ArrivalTime>2026-01-01T11:59:55+09:00</ArrivalTime>
      <Hypocenter>
        <Area>
          <Name>福島県沖</Name><Code>289</Code>
          <jmx_eb:Coordinate description="北緯37.0度 東経141.1度 深さ10km">+37.0+141.1-10000/</jmx_eb:Coordinate>
        </Area>
      </Hypocenter>
      <jmx_eb:Magnitude description="M6.6">6.6</jmx_eb:Magnitude>
    </Earthquake>
    <Intensity>
      <Observation>
        <MaxInt>5-</MaxInt>
        <Pref>
          <Name>福島県</Name><Code>07</Code>
          <Area>
            <Name>福島県浜通り</Name><Code>290</Code><MaxInt>5-</MaxInt>
            <City>
              <Name>いわき市</Name><Code>0720400</Code>
              <IntensityStation><Name>いわき市小名浜＊</Name><Code>0720420</Code><Int>5-</Int></IntensityStation>
              <IntensityStation><Name>いわき市平</Name><Code>0720421</Code><Int>4</Int></IntensityStation>
            </City>
          </Area>
        </Pref>
      </Observation>
    </Intensity>
    <Comments>
      <ForecastComment codeType="固定付加文">
        <Text>若干の海面変動があるかもしれません。</Text>
        <Code>0212</Code>
      </ForecastComment>
    </Comments>
  </Body>
</Report>"#
    }

    #[test]
    fn scale_prompt_has_area_points_and_no_hypocenter() {
        let doc = Document::parse(scale_prompt_xml()).unwrap();
        let EarthquakeOutcome::Report(report) =
            parse(&doc, &TelegramKind::IntensityReport, &geo()).unwrap()
        else {
            panic!("expected report");
        };
        assert_eq!(report.issue_type, EarthquakeIssueType::ScalePrompt);
        assert!(report.hypocenter.is_none());
        assert_eq!(report.max_intensity, Intensity::FiveLower);
        assert_eq!(report.tsunami_comments.domestic, DomesticTsunami::No);
        assert_eq!(report.occur_time, "2026/01/01 12:00:00");
        assert_eq!(report.area_intensity.areas.len(), 1);
        assert!(report.area_intensity.station.is_empty());
    }

    #[test]
    fn detail_scale_rolls_stations_into_areas() {
        let doc = Document::parse(detail_xml()).unwrap();
        let EarthquakeOutcome::Report(report) =
            parse(&doc, &TelegramKind::IntensityDestination, &geo()).unwrap()
        else {
            panic!("expected report");
        };
        assert_eq!(report.issue_type, EarthquakeIssueType::DetailScale);
        assert_eq!(report.magnitude, "6.6");
        assert_eq!(
            report.tsunami_comments.domestic,
            DomesticTsunami::NonEffective
        );
        // The ＊ marker is stripped from station names.
        assert!(report.area_intensity.station.contains_key("いわき市小名浜"));
        // Area keeps the max station intensity.
        let area = &report.area_intensity.areas["福島県浜通り"];
        assert_eq!(area.intensity, Intensity::FiveLower);
        assert!(report.area_intensity.recommend_areas());
        let hypo = report.hypocenter.unwrap();
        assert_eq!(hypo.name, "福島県沖");
        assert_eq!(hypo.depth.to_string(), "10km");
    }

    #[test]
    fn foreign_title_classifies_as_foreign() {
        let xml = detail_xml().replace("震源・震度に関する情報", FOREIGN_TITLE);
        let doc = Document::parse(&xml).unwrap();
        let EarthquakeOutcome::Report(report) =
            parse(&doc, &TelegramKind::IntensityDestination, &geo()).unwrap()
        else {
            panic!("expected report");
        };
        assert_eq!(report.issue_type, EarthquakeIssueType::Foreign);
        // Foreign reports skip area intensity entirely.
        assert!(report.area_intensity.areas.is_empty());
        assert_eq!(report.max_intensity, Intensity::None);
    }

    #[test]
    fn cancellation_yields_cancel_outcome() {
        let xml = scale_prompt_xml().replace("発表", "取消");
        let doc = Document::parse(&xml).unwrap();
        assert_eq!(
            parse(&doc, &TelegramKind::IntensityReport, &geo()).unwrap(),
            EarthquakeOutcome::Cancel
        );
    }

    #[test]
    fn destination_change_is_acknowledged_noop() {
        let doc = Document::parse("<Report/>").unwrap();
        assert_eq!(
            parse(&doc, &TelegramKind::DestinationChange, &geo()).unwrap(),
            EarthquakeOutcome::Ignored
        );
    }

    #[test]
    fn foreign_tsunami_code_ladder() {
        assert_eq!(foreign_tsunami("0221", ""), ForeignTsunami::WarningPacificWide);
        assert_eq!(foreign_tsunami("0227", ""), ForeignTsunami::NonEffectiveNearby);
        assert_eq!(foreign_tsunami("0228", ""), ForeignTsunami::Potential);
        assert_eq!(
            foreign_tsunami("9999", "この地震による津波の心配はありません"),
            ForeignTsunami::No
        );
    }

    #[test]
    fn domestic_tsunami_text_fallback() {
        assert_eq!(
            domestic_tsunami("9999", "若干の海面変動が予想されます", false),
            DomesticTsunami::NonEffective
        );
        assert_eq!(
            domestic_tsunami("9999", "津波注意報を発表しました", false),
            DomesticTsunami::Warning
        );
        assert_eq!(domestic_tsunami("", "", false), DomesticTsunami::Unknown);
    }
}
