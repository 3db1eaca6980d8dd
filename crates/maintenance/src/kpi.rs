//! Reliability figures.
//!
//! All figures are in minutes over a nominal 24h day:
//! availability = uptime / work time, OEE = availability,
//! MTTR = downtime / failures (0 without failures),
//! MTBF = uptime / failures (the whole work time without failures).
//! Uptime is floored at zero when booked downtime exceeds the window.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use datalink_core::DateRange;

use crate::metric::MaintenanceMetric;

pub const MINUTES_PER_DAY: i64 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KpiFigures {
    pub mttr: f64,
    pub mtbf: f64,
    pub availability: f64,
    pub oee: f64,
    pub downtime_minutes: i64,
    pub downtime_count: i64,
}

impl KpiFigures {
    pub fn compute(work_minutes: i64, downtime_minutes: i64, downtime_count: i64) -> Self {
        let uptime = (work_minutes - downtime_minutes).max(0) as f64;
        let availability = if work_minutes > 0 {
            uptime / work_minutes as f64
        } else {
            1.0
        };
        let (mttr, mtbf) = if downtime_count > 0 {
            (
                downtime_minutes as f64 / downtime_count as f64,
                uptime / downtime_count as f64,
            )
        } else {
            (0.0, work_minutes.max(0) as f64)
        };
        Self {
            mttr,
            mtbf,
            availability,
            oee: availability,
            downtime_minutes,
            downtime_count,
        }
    }
}

/// A metric row with its single-day availability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricView {
    #[serde(flatten)]
    pub metric: MaintenanceMetric,
    pub availability: f64,
    pub oee: f64,
}

impl From<MaintenanceMetric> for MetricView {
    fn from(metric: MaintenanceMetric) -> Self {
        let f = KpiFigures::compute(MINUTES_PER_DAY, metric.downtime_minutes, metric.downtime_count);
        Self {
            metric,
            availability: f.availability,
            oee: f.oee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub mttr: f64,
    pub mtbf: f64,
    pub availability: f64,
    pub oee: f64,
    pub total_downtime_minutes: i64,
    pub total_downtime_count: i64,
    pub equipment_metrics: BTreeMap<String, KpiFigures>,
}

#[derive(Default)]
struct Tally {
    downtime: i64,
    count: i64,
    parts: i64,
    days: BTreeSet<NaiveDate>,
}

impl Tally {
    fn add(&mut self, m: &MaintenanceMetric) {
        self.downtime += m.downtime_minutes;
        self.count += m.downtime_count;
        self.parts += m.parts_produced;
        self.days.insert(m.date);
    }

    fn work_minutes(&self) -> i64 {
        self.days.len() as i64 * MINUTES_PER_DAY
    }
}

fn by_equipment(metrics: &[MaintenanceMetric]) -> BTreeMap<String, Tally> {
    let mut out: BTreeMap<String, Tally> = BTreeMap::new();
    for m in metrics {
        out.entry(m.equipment_type.clone()).or_default().add(m);
    }
    out
}

fn by_day(metrics: &[MaintenanceMetric]) -> BTreeMap<NaiveDate, Tally> {
    let mut out: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
    for m in metrics {
        out.entry(m.date).or_default().add(m);
    }
    out
}

/// Aggregate figures; work time is the number of distinct days covered.
pub fn stats(metrics: &[MaintenanceMetric]) -> MetricStats {
    let mut total = Tally::default();
    for m in metrics {
        total.add(m);
    }
    let overall = KpiFigures::compute(total.work_minutes(), total.downtime, total.count);
    let equipment_metrics = by_equipment(metrics)
        .into_iter()
        .map(|(k, t)| (k, KpiFigures::compute(t.work_minutes(), t.downtime, t.count)))
        .collect();

    MetricStats {
        mttr: overall.mttr,
        mtbf: overall.mtbf,
        availability: overall.availability,
        oee: overall.oee,
        total_downtime_minutes: total.downtime,
        total_downtime_count: total.count,
        equipment_metrics,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OeePoint {
    pub date: NaiveDate,
    pub oee: f64,
}

/// Daily OEE, oldest first.
pub fn oee_trend(metrics: &[MaintenanceMetric]) -> Vec<OeePoint> {
    by_day(metrics)
        .into_iter()
        .map(|(date, t)| OeePoint {
            date,
            oee: KpiFigures::compute(MINUTES_PER_DAY, t.downtime, t.count).oee,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MttrMtbfPoint {
    pub date: NaiveDate,
    pub mttr: f64,
    pub mtbf: f64,
}

/// Daily MTTR/MTBF, oldest first.
pub fn mttr_mtbf_trend(metrics: &[MaintenanceMetric]) -> Vec<MttrMtbfPoint> {
    by_day(metrics)
        .into_iter()
        .map(|(date, t)| {
            let f = KpiFigures::compute(MINUTES_PER_DAY, t.downtime, t.count);
            MttrMtbfPoint {
                date,
                mttr: f.mttr,
                mtbf: f.mtbf,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentComparison {
    pub equipment_type: String,
    pub parts_produced: i64,
    #[serde(flatten)]
    pub figures: KpiFigures,
}

/// Per-equipment figures over the whole `range` (every calendar day counts
/// as work time, with or without a metric row).
pub fn line_comparison(metrics: &[MaintenanceMetric], range: DateRange) -> Vec<EquipmentComparison> {
    let work = range.days() * MINUTES_PER_DAY;
    let in_range: Vec<MaintenanceMetric> = metrics.iter().filter(|m| range.contains(m.date)).cloned().collect();
    by_equipment(&in_range)
        .into_iter()
        .map(|(equipment_type, t)| EquipmentComparison {
            equipment_type,
            parts_produced: t.parts,
            figures: KpiFigures::compute(work, t.downtime, t.count),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datalink_core::{RecordId, Shift};
    use proptest::prelude::*;

    fn metric(equipment: &str, day: u32, minutes: i64, count: i64) -> MaintenanceMetric {
        let now = Utc::now();
        MaintenanceMetric {
            id: RecordId::new(day as i64),
            equipment_type: equipment.into(),
            shift: Shift::Day,
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            downtime_count: count,
            downtime_minutes: minutes,
            parts_produced: 100,
            user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn single_metric_view() {
        let v = MetricView::from(metric("Press", 1, 144, 1));
        assert!((v.availability - 0.9).abs() < 1e-9);
        assert_eq!(v.oee, v.availability);
    }

    #[test]
    fn figures_without_failures() {
        let f = KpiFigures::compute(2880, 0, 0);
        assert_eq!(f.mttr, 0.0);
        assert_eq!(f.mtbf, 2880.0);
        assert_eq!(f.availability, 1.0);
        assert_eq!(KpiFigures::compute(0, 0, 0).availability, 1.0);
    }

    #[test]
    fn stats_use_distinct_days() {
        let ms = vec![metric("Press", 1, 60, 2), metric("Weld", 1, 60, 1), metric("Press", 2, 0, 0)];
        let s = stats(&ms);
        assert_eq!(s.total_downtime_minutes, 120);
        assert_eq!(s.total_downtime_count, 3);
        assert!((s.mttr - 40.0).abs() < 1e-9);
        assert!((s.mtbf - (2880.0 - 120.0) / 3.0).abs() < 1e-9);
        assert!((s.availability - (2880.0 - 120.0) / 2880.0).abs() < 1e-9);

        let press = &s.equipment_metrics["Press"];
        assert!((press.availability - (2880.0 - 60.0) / 2880.0).abs() < 1e-9);
        let weld = &s.equipment_metrics["Weld"];
        assert!((weld.mtbf - 1380.0).abs() < 1e-9);
    }

    #[test]
    fn trends_are_sorted_by_date() {
        let ms = vec![metric("Press", 3, 144, 1), metric("Press", 1, 0, 0), metric("Weld", 3, 144, 1)];
        let oee = oee_trend(&ms);
        assert_eq!(oee.len(), 2);
        assert!(oee[0].date < oee[1].date);
        assert!((oee[1].oee - 0.8).abs() < 1e-9);

        let mm = mttr_mtbf_trend(&ms);
        assert_eq!(mm[0].mttr, 0.0);
        assert_eq!(mm[0].mtbf, 1440.0);
        assert!((mm[1].mttr - 144.0).abs() < 1e-9);
    }

    #[test]
    fn comparison_counts_every_day_of_range() {
        let ms = vec![metric("Press", 1, 144, 1), metric("Press", 20, 0, 0)];
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        )
        .unwrap();
        let rows = line_comparison(&ms, range);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].parts_produced, 100);
        assert!((rows[0].figures.availability - (14400.0 - 144.0) / 14400.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn availability_stays_within_unit_interval(work in 0i64..100_000, down in 0i64..200_000, count in 0i64..50) {
            let f = KpiFigures::compute(work, down, count);
            prop_assert!((0.0..=1.0).contains(&f.availability));
            prop_assert!(f.mtbf >= 0.0);
            prop_assert!(f.mttr >= 0.0);
        }
    }
}
