//! Expected-intensity image decoder.
//!
//! The kmoni endpoint publishes expected intensities as a GIF heat map.
//! Each observation station's pixel is sampled in HSV space and mapped to
//! an intensity scalar through a fixed piecewise polynomial. The constants
//! were fitted against the upstream palette in advance; do not touch them
//! unless you have re-fitted the curve.

use std::collections::{BTreeMap, HashMap};

use qm_model::{AreaIntensity, Intensity, StationIntensity};
use tracing::trace;

use crate::errors::DecodeError;
use crate::geodata::GeoData;

/// Decoded result: per-station samples, the per-area rollup, and whether
/// area display is recommended (any area at intensity 4 or above).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntensityImageResult {
    pub station_intensities: BTreeMap<String, StationIntensity>,
    pub area_intensities: BTreeMap<String, AreaIntensity>,
    pub recommend_areas: bool,
}

/// Decode the intensity GIF into station and area intensities.
pub fn decode(raw_image: &[u8], geo: &GeoData) -> Result<IntensityImageResult, DecodeError> {
    let image = image::load_from_memory(raw_image)
        .map_err(|e| DecodeError::Schema(format!("image: {e}")))?
        .to_rgb8();

    let mut result = IntensityImageResult::default();
    let mut area_max: HashMap<&str, Intensity> = HashMap::new();

    for station in &geo.observation_stations {
        if station.x >= image.width() || station.y >= image.height() {
            trace!(x = station.x, y = station.y, "station pixel out of bounds");
            continue;
        }
        let pixel = image.get_pixel(station.x, station.y);
        let (h, s, v) = rgb_to_hsv(pixel.0[0], pixel.0[1], pixel.0[2]);
        let scalar = round2(hsv_to_position(h, s, v) * 10.0 - 3.0);
        let Some(intensity) = bucket(scalar) else {
            continue;
        };

        let entry = area_max
            .entry(station.sub_region_code.as_str())
            .or_insert(Intensity::None);
        if intensity > *entry {
            *entry = intensity;
        }

        let full_name = format!("{}{}", station.region, station.name);
        result.station_intensities.insert(
            full_name.clone(),
            StationIntensity {
                name: full_name,
                area_code: station.region_code.clone(),
                sub_area_code: station.sub_region_code.clone(),
                latitude: station.latitude,
                longitude: station.longitude,
                intensity,
                detail_intensity: scalar,
                is_area: false,
            },
        );
    }

    for (code, intensity) in area_max {
        let Some(position) = geo.area_positions.get(code) else {
            trace!(code, "no position entry for sub-region");
            continue;
        };
        if intensity >= Intensity::Four {
            result.recommend_areas = true;
        }
        result.area_intensities.insert(
            position.name.clone(),
            AreaIntensity {
                name: position.name.clone(),
                intensity,
                latitude: position.latitude,
                longitude: position.longitude,
                is_area: true,
                lg_intensity: None,
            },
        );
    }

    Ok(result)
}

/// Pixel color in HSV space (all channels normalized to [0, 1]) to a
/// position in intensity space.
pub fn hsv_to_position(h: f64, s: f64, v: f64) -> f64 {
    let mut p = 0.0;
    if v > 0.1 && s > 0.75 {
        if h > 0.1476 {
            p = 280.31 * h.powi(6) - 916.05 * h.powi(5) + 1142.6 * h.powi(4)
                - 709.95 * h.powi(3)
                + 234.65 * h.powi(2)
                - 40.27 * h
                + 3.2217;
        } else if h > 0.001 {
            p = 151.4 * h.powi(4) - 49.32 * h.powi(3) + 6.753 * h.powi(2) - 2.481 * h + 0.9033;
        } else {
            p = -0.005171 * v.powi(2) - 0.3282 * v + 1.2236;
        }
    }
    p.max(0.0)
}

/// Bucket the scalar into an intensity class. Values below 0.5 carry no
/// displayable shaking and are dropped.
pub fn bucket(scalar: f64) -> Option<Intensity> {
    let intensity = match scalar {
        s if s < 0.5 => return None,
        s if s < 1.5 => Intensity::One,
        s if s < 2.5 => Intensity::Two,
        s if s < 3.5 => Intensity::Three,
        s if s < 4.5 => Intensity::Four,
        s if s < 5.0 => Intensity::FiveLower,
        s if s < 5.5 => Intensity::FiveUpper,
        s if s < 6.0 => Intensity::SixLower,
        s if s < 6.5 => Intensity::SixUpper,
        _ => Intensity::Seven,
    };
    Some(intensity)
}

fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        (((g - b) / delta).rem_euclid(6.0)) / 6.0
    } else if (max - g).abs() < f64::EPSILON {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    (h, s, v)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
