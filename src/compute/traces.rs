//! Synthetic demand and resource traces.
//!
//! The reference simulation needs hourly demand and capacity-factor series.
//! These are generated from closed-form daily and weekly cycles so that every
//! run is deterministic and no data files are needed.

use std::f64::consts::PI;

use crate::schema::Region;

/// Hourly demand split by region (MW), indexed by `Region::index()`.
pub type RegionalDemand = [f64; Region::COUNT];

/// System demand shape for a given hour, as a fraction of peak.
fn demand_shape(hour: usize) -> f64 {
    let hod = (hour % 24) as f64;
    let day = (hour / 24) % 7;

    // trough at 04:00, peak at 16:00
    let daily = 0.7 + 0.3 * 0.5 * (1.0 - (2.0 * PI * (hod - 4.0) / 24.0).cos());
    let weekly = if day >= 5 { 0.9 } else { 1.0 };
    daily * weekly
}

/// Build the hourly regional demand series.
pub fn demand_profile(hours: usize, peak: f64) -> Vec<RegionalDemand> {
    (0..hours)
        .map(|hour| {
            let total = peak * demand_shape(hour);
            let mut regional = [0.0; Region::COUNT];
            for region in Region::ALL {
                regional[region.index()] = total * region.demand_share();
            }
            regional
        })
        .collect()
}

/// Solar capacity factor for each hour in a region.
pub fn pv_trace(hours: usize, region: Region) -> Vec<f64> {
    let insolation = match region {
        Region::Qld1 => 1.0,
        Region::Nsw1 | Region::Sa1 => 0.95,
        Region::Vic1 => 0.9,
        Region::Tas1 => 0.85,
    };

    (0..hours)
        .map(|hour| {
            let hod = (hour % 24) as f64;
            if (6.0..=18.0).contains(&hod) {
                (0.85 * insolation * (PI * (hod - 6.0) / 12.0).sin()).max(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Wind capacity factor for each hour in a region.
pub fn wind_trace(hours: usize, region: Region) -> Vec<f64> {
    let i = region.index() as f64;
    let period = 29.0 + 6.0 * i;

    (0..hours)
        .map(|hour| {
            let h = hour as f64;
            let slow = 0.25 * (2.0 * PI * (h + 7.0 * i) / period).sin();
            let fast = 0.1 * (2.0 * PI * h / 11.0 + i).sin();
            (0.35 + slow + fast).clamp(0.0, 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demand_profile_peak_and_split() {
        let demand = demand_profile(24, 1000.0);
        assert_eq!(demand.len(), 24);

        let totals: Vec<f64> = demand.iter().map(|h| h.iter().sum()).collect();
        let max = totals.iter().cloned().fold(0.0f64, f64::max);
        let min = totals.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!((max - 1000.0).abs() < 1e-9);
        assert!((min - 700.0).abs() < 1e-9);
    }

    #[test]
    fn test_pv_dark_at_night() {
        let trace = pv_trace(48, Region::Nsw1);
        assert_eq!(trace[0], 0.0);
        assert_eq!(trace[23], 0.0);
        assert!(trace[12] > 0.7);
        assert!(trace.iter().all(|&cf| (0.0..=1.0).contains(&cf)));
    }

    #[test]
    fn test_wind_bounded_and_deterministic() {
        let a = wind_trace(500, Region::Sa1);
        let b = wind_trace(500, Region::Sa1);
        assert_eq!(a, b);
        assert!(a.iter().all(|&cf| (0.0..=1.0).contains(&cf)));
    }
}
