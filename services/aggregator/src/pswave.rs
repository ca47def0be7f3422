//! P/S wave-front distance estimation from the travel-time table.

use qm_model::{PsWaveDistances, TravelTimeRow};
use tracing::warn;

/// Table limits beyond which no estimate is attempted.
const MAX_DEPTH_KM: u32 = 700;
const MAX_ELAPSED_S: f64 = 2000.0;

/// Estimate how far the P and S wave fronts have travelled.
///
/// Selects the table rows matching `depth_km` exactly, then linearly
/// interpolates distance between the last row at-or-before and the first
/// row at-or-after `elapsed_s`, independently per wave. A wave whose
/// bracket is incomplete yields `None`.
pub fn estimate(
    table: &[TravelTimeRow],
    depth_km: u32,
    elapsed_s: f64,
) -> PsWaveDistances {
    if depth_km > MAX_DEPTH_KM || elapsed_s > MAX_ELAPSED_S {
        warn!(depth_km, elapsed_s, "travel-time estimate out of range");
        return PsWaveDistances::default();
    }
    let rows: Vec<&TravelTimeRow> = table.iter().filter(|r| r.depth == depth_km).collect();
    if rows.is_empty() {
        warn!(depth_km, "no travel-time rows for depth");
        return PsWaveDistances::default();
    }

    PsWaveDistances {
        p_distance: interpolate(&rows, elapsed_s, |r| r.p_time),
        s_distance: interpolate(&rows, elapsed_s, |r| r.s_time),
    }
}

fn interpolate(
    rows: &[&TravelTimeRow],
    elapsed: f64,
    time_of: impl Fn(&TravelTimeRow) -> f64,
) -> Option<f64> {
    let last = rows.iter().filter(|r| time_of(r) <= elapsed).next_back()?;
    let first = rows.iter().find(|r| time_of(r) >= elapsed)?;

    let (t0, t1) = (time_of(last), time_of(first));
    let (d0, d1) = (f64::from(last.distance), f64::from(first.distance));
    if (t1 - t0).abs() < f64::EPSILON {
        return Some(d0);
    }
    Some((elapsed - t0) / (t1 - t0) * (d1 - d0) + d0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(p_time: f64, s_time: f64, depth: u32, distance: u32) -> TravelTimeRow {
        TravelTimeRow {
            p_time,
            s_time,
            depth,
            distance,
        }
    }

    fn table() -> Vec<TravelTimeRow> {
        vec![
            row(1.0, 2.0, 10, 5),
            row(3.0, 6.0, 10, 20),
            row(5.0, 10.0, 10, 40),
            row(2.0, 4.0, 50, 10),
        ]
    }

    #[test]
    fn interpolates_between_bracketing_rows() {
        let d = estimate(&table(), 10, 2.0);
        // P: between (1.0, 5km) and (3.0, 20km) at t=2.0 → 12.5km
        assert!((d.p_distance.unwrap() - 12.5).abs() < 1e-9);
        // S: t=2.0 hits the first row exactly → 5km
        assert!((d.s_distance.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn elapsed_before_first_row_yields_none() {
        let d = estimate(&table(), 10, 0.5);
        assert!(d.p_distance.is_none());
        assert!(d.s_distance.is_none());
    }

    #[test]
    fn elapsed_after_last_row_yields_none() {
        let d = estimate(&table(), 10, 100.0);
        assert!(d.p_distance.is_none());
        assert!(d.s_distance.is_none());
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        assert_eq!(estimate(&table(), 701, 1.0), PsWaveDistances::default());
        assert_eq!(estimate(&table(), 10, 2001.0), PsWaveDistances::default());
        assert_eq!(estimate(&table(), 30, 2.0), PsWaveDistances::default());
    }

    #[test]
    fn distances_are_monotone_in_elapsed() {
        let t = table();
        let mut prev = 0.0;
        for elapsed in [1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0] {
            let d = estimate(&t, 10, elapsed).p_distance.unwrap();
            assert!(d >= prev, "p distance decreased at t={elapsed}");
            assert!(d >= 0.0);
            prev = d;
        }
    }
}
