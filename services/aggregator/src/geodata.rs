//! Boot-time reference tables: centroids, observation stations, the
//! sub-region position map and the travel-time table.
//!
//! Everything here is loaded once, wrapped in `Arc`, and never mutated.
//!
//! File formats (under the configured assets directory):
//! - `centroid/jma_area_centroid.csv`: `id,name,latitude,longitude`
//! - `centroid/intensity_stations.csv`: `name,region_code,region_name,latitude,longitude`
//! - `centroid/observation_points.json`: EEW station list with pixel coordinates
//! - `centroid/area_position.json`: sub-region code → name + [lat, lon]
//! - `centroid/tsunami_areas.json`: forecast area name → outline ring
//! - `pswave/tjma2001`: whitespace-separated travel-time rows

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use qm_model::TravelTimeRow;

use crate::errors::ConfigError;

#[derive(Debug, Clone)]
pub struct AreaCentroid {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct StationCentroid {
    pub latitude: f64,
    pub longitude: f64,
    pub region_code: String,
    pub region_name: String,
}

/// One EEW observation station with its pixel position in the intensity
/// image.
#[derive(Debug, Clone)]
pub struct ObservationStation {
    pub name: String,
    pub region: String,
    pub region_code: String,
    pub sub_region_code: String,
    pub x: u32,
    pub y: u32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct AreaPosition {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// All reference tables, immutable after boot.
#[derive(Debug, Default)]
pub struct GeoData {
    /// Area name → centroid.
    pub area_centroid: HashMap<String, AreaCentroid>,
    /// Station name → centroid + owning region.
    pub station_centroid: HashMap<String, StationCentroid>,
    /// EEW observation stations (suspended ones filtered out).
    pub observation_stations: Vec<ObservationStation>,
    /// Sub-region code → display name + position.
    pub area_positions: HashMap<String, AreaPosition>,
    /// Tsunami forecast area name → coastline outline `[lat, lon]` ring.
    pub tsunami_areas: HashMap<String, Vec<[f64; 2]>>,
    pub travel_time: Vec<TravelTimeRow>,
}

impl GeoData {
    pub fn load(assets_dir: &Path) -> Result<Self, ConfigError> {
        let mut geo = Self::default();
        geo.load_area_centroid(&assets_dir.join("centroid/jma_area_centroid.csv"))?;
        geo.load_station_centroid(&assets_dir.join("centroid/intensity_stations.csv"))?;
        geo.load_observation_stations(&assets_dir.join("centroid/observation_points.json"))?;
        geo.load_area_positions(&assets_dir.join("centroid/area_position.json"))?;
        geo.load_tsunami_areas(&assets_dir.join("centroid/tsunami_areas.json"))?;
        geo.travel_time = load_travel_time(&assets_dir.join("pswave/tjma2001"))?;
        Ok(geo)
    }

    fn load_area_centroid(&mut self, path: &Path) -> Result<(), ConfigError> {
        for line in std::fs::read_to_string(path)?.lines() {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 4 {
                continue;
            }
            let (Ok(lat), Ok(lon)) = (fields[2].trim().parse(), fields[3].trim().parse()) else {
                continue;
            };
            self.area_centroid.insert(
                fields[1].trim().to_owned(),
                AreaCentroid {
                    latitude: lat,
                    longitude: lon,
                },
            );
        }
        Ok(())
    }

    fn load_station_centroid(&mut self, path: &Path) -> Result<(), ConfigError> {
        for line in std::fs::read_to_string(path)?.lines() {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 5 {
                continue;
            }
            let (Ok(lat), Ok(lon)) = (fields[3].trim().parse(), fields[4].trim().parse()) else {
                continue;
            };
            self.station_centroid.insert(
                fields[0].trim().to_owned(),
                StationCentroid {
                    latitude: lat,
                    longitude: lon,
                    region_code: fields[1].trim().to_owned(),
                    region_name: fields[2].trim().to_owned(),
                },
            );
        }
        Ok(())
    }

    fn load_observation_stations(&mut self, path: &Path) -> Result<(), ConfigError> {
        #[derive(Deserialize)]
        struct RawPoint {
            #[serde(rename = "X")]
            x: String,
            #[serde(rename = "Y")]
            y: String,
        }
        #[derive(Deserialize)]
        struct RawLocation {
            #[serde(rename = "Latitude")]
            latitude: String,
            #[serde(rename = "Longitude")]
            longitude: String,
        }
        #[derive(Deserialize)]
        struct RawStation {
            #[serde(rename = "Name")]
            name: String,
            #[serde(rename = "Region")]
            region: String,
            #[serde(rename = "RegionCode")]
            region_code: String,
            #[serde(rename = "SubRegionCode")]
            sub_region_code: String,
            #[serde(rename = "IsSuspended")]
            is_suspended: bool,
            #[serde(rename = "Location")]
            location: RawLocation,
            #[serde(rename = "Point")]
            point: Option<RawPoint>,
        }

        let raw: Vec<RawStation> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        for station in raw {
            let Some(point) = station.point else {
                continue;
            };
            if station.is_suspended {
                continue;
            }
            let (Ok(x), Ok(y)) = (point.x.trim().parse(), point.y.trim().parse()) else {
                continue;
            };
            let latitude = station.location.latitude.trim().parse().unwrap_or(0.0);
            let longitude = station.location.longitude.trim().parse().unwrap_or(0.0);
            self.observation_stations.push(ObservationStation {
                name: station.name,
                region: station.region,
                region_code: station.region_code,
                sub_region_code: station.sub_region_code,
                x,
                y,
                latitude,
                longitude,
            });
        }
        Ok(())
    }

    fn load_area_positions(&mut self, path: &Path) -> Result<(), ConfigError> {
        #[derive(Deserialize)]
        struct RawPosition {
            name: String,
            position: Vec<String>,
        }

        let raw: HashMap<String, RawPosition> =
            serde_json::from_str(&std::fs::read_to_string(path)?)?;
        for (code, entry) in raw {
            if entry.position.len() != 2 {
                continue;
            }
            let (Ok(lat), Ok(lon)) = (
                entry.position[0].trim().parse(),
                entry.position[1].trim().parse(),
            ) else {
                continue;
            };
            self.area_positions.insert(
                code,
                AreaPosition {
                    name: entry.name,
                    latitude: lat,
                    longitude: lon,
                },
            );
        }
        Ok(())
    }

    fn load_tsunami_areas(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw: HashMap<String, Vec<[f64; 2]>> =
            serde_json::from_str(&std::fs::read_to_string(path)?)?;
        self.tsunami_areas = raw;
        Ok(())
    }
}

/// Parse the JMA 2001 travel-time table. Rows without exactly five fields
/// are outside our use and skipped.
fn load_travel_time(path: &Path) -> Result<Vec<TravelTimeRow>, ConfigError> {
    let mut rows = Vec::new();
    for line in std::fs::read_to_string(path)?.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            continue;
        }
        let (Ok(p_time), Ok(s_time), Ok(depth), Ok(distance)) = (
            fields[1].parse::<f64>(),
            fields[2].parse::<f64>(),
            fields[3].parse::<u32>(),
            fields[4].parse::<u32>(),
        ) else {
            continue;
        };
        rows.push(TravelTimeRow {
            p_time,
            s_time,
            depth,
            distance,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn travel_time_skips_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tjma2001");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, " 1   2.50   4.30    10    20").unwrap();
        writeln!(f, "garbage line").unwrap();
        writeln!(f, " 2   3.10   5.80    10    30").unwrap();
        drop(f);

        let rows = load_travel_time(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].depth, 10);
        assert_eq!(rows[1].distance, 30);
    }

    #[test]
    fn area_centroid_csv_parses_named_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("areas.csv");
        std::fs::write(&path, "100,石狩地方北部,43.5,141.4\nbad,row\n").unwrap();

        let mut geo = GeoData::default();
        geo.load_area_centroid(&path).unwrap();
        assert_eq!(geo.area_centroid.len(), 1);
        let area = &geo.area_centroid["石狩地方北部"];
        assert!((area.latitude - 43.5).abs() < f64::EPSILON);
    }

    #[test]
    fn tsunami_area_outlines_load_as_rings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsunami_areas.json");
        std::fs::write(
            &path,
            r#"{"宮城県": [[38.4, 141.55], [38.3, 141.5]], "福島県": []}"#,
        )
        .unwrap();

        let mut geo = GeoData::default();
        geo.load_tsunami_areas(&path).unwrap();
        assert_eq!(geo.tsunami_areas["宮城県"].len(), 2);
        assert_eq!(geo.tsunami_areas["宮城県"][0], [38.4, 141.55]);
        assert!(geo.tsunami_areas["福島県"].is_empty());
    }

    #[test]
    fn suspended_and_pointless_stations_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.json");
        std::fs::write(
            &path,
            r#"[
                {"Name": "駒場", "Region": "十勝地方", "RegionCode": "105",
                 "SubRegionCode": "1050", "IsSuspended": false,
                 "Location": {"Latitude": "43.0", "Longitude": "143.5"},
                 "Point": {"X": "310", "Y": "120"}},
                {"Name": "休止中", "Region": "十勝地方", "RegionCode": "105",
                 "SubRegionCode": "1050", "IsSuspended": true,
                 "Location": {"Latitude": "43.0", "Longitude": "143.5"},
                 "Point": {"X": "311", "Y": "121"}},
                {"Name": "座標なし", "Region": "十勝地方", "RegionCode": "105",
                 "SubRegionCode": "1050", "IsSuspended": false,
                 "Location": {"Latitude": "43.0", "Longitude": "143.5"},
                 "Point": null}
            ]"#,
        )
        .unwrap();

        let mut geo = GeoData::default();
        geo.load_observation_stations(&path).unwrap();
        assert_eq!(geo.observation_stations.len(), 1);
        assert_eq!(geo.observation_stations[0].name, "駒場");
        assert_eq!(geo.observation_stations[0].x, 310);
    }
}
