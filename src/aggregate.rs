//! Period aggregation over sale records.
//!
//! Everything here is pure: commands fetch the records for a window and
//! hand them to these functions. Derived figures stored on the records
//! are trusted as-is; nothing is recomputed retroactively.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::error::SalesError;
use crate::fields;
use crate::money::{self, Money};
use crate::sales::SaleRecord;

// ---------------------------------------------------------------------------
// Date ranges
// ---------------------------------------------------------------------------

/// An inclusive calendar-day range. Construction rejects inverted ranges
/// so the check always happens before any query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SalesError> {
        if start > end {
            return Err(SalesError::InvalidRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        DateRange {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// First instant of the range in local time.
    pub fn lower_bound(&self) -> DateTime<Local> {
        local_midnight(self.start)
    }

    /// Last second of the range in local time.
    pub fn upper_bound(&self) -> DateTime<Local> {
        local_midnight(self.end + Duration::days(1)) - Duration::seconds(1)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

fn local_midnight(day: NaiveDate) -> DateTime<Local> {
    // earliest() handles DST gaps; midnight always exists in BRT but the
    // fallback keeps this total.
    match Local.from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default()) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => Local
            .from_local_datetime(&day.and_hms_opt(1, 0, 0).unwrap_or_default())
            .earliest()
            .unwrap_or_else(Local::now),
    }
}

/// Today as a single-day range.
pub fn today_range(now: DateTime<Local>) -> DateRange {
    DateRange::single_day(now.date_naive())
}

/// The week containing `now`, starting on Sunday.
pub fn week_range(now: DateTime<Local>) -> DateRange {
    let today = now.date_naive();
    let start = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
    DateRange {
        start,
        end: start + Duration::days(6),
    }
}

/// The calendar month containing `now`.
pub fn month_range(now: DateTime<Local>) -> DateRange {
    let today = now.date_naive();
    let start = today.with_day(1).unwrap_or(today);
    DateRange {
        start,
        end: start + Duration::days(days_in_month(today) as i64 - 1),
    }
}

/// Number of days in the month containing `day`.
pub fn days_in_month(day: NaiveDate) -> u32 {
    let (y, m) = (day.year(), day.month());
    let next = if m == 12 {
        NaiveDate::from_ymd_opt(y + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(y, m + 1, 1)
    };
    match (next, day.with_day(1)) {
        (Some(next), Some(first)) => (next - first).num_days() as u32,
        _ => 30,
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Aggregated figures for a set of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    /// Sum of the persisted `total` of every record.
    pub total: Money,
    pub count: usize,
    /// Per-field sums of the raw amounts, every schema field present.
    pub by_field: BTreeMap<String, Money>,
}

impl PeriodSummary {
    pub fn empty() -> Self {
        PeriodSummary {
            total: money::ZERO,
            count: 0,
            by_field: fields::SALE_FIELDS
                .iter()
                .map(|f| (f.key.to_string(), money::ZERO))
                .collect(),
        }
    }
}

/// Sum a slice of records into one summary.
pub fn aggregate(records: &[&SaleRecord]) -> PeriodSummary {
    let mut summary = PeriodSummary::empty();
    for record in records {
        summary.count += 1;
        summary.total += record.derived.total;
        for def in fields::SALE_FIELDS {
            if let Some(sum) = summary.by_field.get_mut(def.key) {
                *sum += record.amount(def.key);
            }
        }
    }
    summary
}

/// Group records by local calendar day of `occurred_at`. Days with no
/// sales are simply absent; BTreeMap keeps the keys in ascending order
/// for the report table and the CSV.
pub fn bucket_by_day<'a>(
    records: impl IntoIterator<Item = &'a SaleRecord>,
) -> BTreeMap<NaiveDate, PeriodSummary> {
    let mut days: BTreeMap<NaiveDate, Vec<&SaleRecord>> = BTreeMap::new();
    for record in records {
        days.entry(record.occurred_at.date_naive())
            .or_default()
            .push(record);
    }
    days.into_iter()
        .map(|(day, group)| (day, aggregate(&group)))
        .collect()
}

/// Percentage share of `part` in `whole`, 0.0 when the denominator is
/// zero (an empty period shows 0% everywhere, never NaN).
pub fn share_percent(part: Money, whole: Money) -> f64 {
    if whole.is_zero() {
        0.0
    } else {
        part.cents() as f64 / whole.cents() as f64 * 100.0
    }
}

// ---------------------------------------------------------------------------
// Monthly estimator
// ---------------------------------------------------------------------------

/// Month-end projection from channel sales (Total Sagres), the figure
/// the owner steers deliveries by.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyEstimate {
    /// Channel sales recorded so far this month.
    pub month_total: Money,
    /// Days that actually had channel sales; zero-sales days do not drag
    /// the average down.
    pub active_days: usize,
    pub average_daily: Money,
    /// `average_daily` times the number of days in the month.
    pub projection: Money,
    /// `month_total` as a percentage of `projection`, 0 when the
    /// projection is 0.
    pub progress_percent: f64,
}

/// Estimate the month from the records of that month. `month_day` is any
/// day inside the month, used only for its length.
pub fn estimate_month<'a>(
    records: impl IntoIterator<Item = &'a SaleRecord>,
    month_day: NaiveDate,
) -> MonthlyEstimate {
    let mut per_day: BTreeMap<NaiveDate, Money> = BTreeMap::new();
    for record in records {
        *per_day
            .entry(record.occurred_at.date_naive())
            .or_insert(money::ZERO) += record.derived.total_sagres;
    }

    let month_total: Money = per_day.values().copied().sum();
    let active_days = per_day.values().filter(|t| !t.is_zero()).count();

    let average_daily = if active_days == 0 {
        money::ZERO
    } else {
        Money::from_cents(
            (month_total.cents() as f64 / active_days as f64).round() as i64,
        )
    };
    let projection = Money::from_cents(average_daily.cents() * days_in_month(month_day) as i64);

    MonthlyEstimate {
        month_total,
        active_days,
        average_daily,
        projection,
        progress_percent: share_percent(month_total, projection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sales::{AmountMap, SaleRecord};
    use chrono::{TimeZone, Utc};

    fn m(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    fn record(day: u32, pairs: &[(&str, i64)]) -> SaleRecord {
        let amounts: AmountMap = pairs
            .iter()
            .map(|(k, c)| (k.to_string(), m(*c)))
            .collect();
        let derived = crate::sales::recompute_derived(&amounts, true);
        SaleRecord {
            id: format!("sale-test-{day}-{}", pairs.len()),
            occurred_at: Local.with_ymd_and_hms(2025, 4, day, 20, 0, 0).unwrap(),
            amounts,
            notes: None,
            derived,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let d1 = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 4, 5).unwrap();
        assert!(matches!(
            DateRange::new(d1, d2),
            Err(SalesError::InvalidRange { .. })
        ));
        assert!(DateRange::new(d2, d1).is_ok());
        assert!(DateRange::new(d1, d1).is_ok());
    }

    #[test]
    fn range_bounds_cover_whole_days() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
        )
        .unwrap();
        assert_eq!(
            range.lower_bound().time(),
            chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            range.upper_bound().time(),
            chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap()
        );
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 4, 2).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2025, 4, 3).unwrap()));
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2025-04-09 is a Wednesday.
        let now = Local.with_ymd_and_hms(2025, 4, 9, 12, 0, 0).unwrap();
        let range = week_range(now);
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2025, 4, 6).unwrap());
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2025, 4, 12).unwrap());
        assert_eq!(range.start().weekday(), chrono::Weekday::Sun);
    }

    #[test]
    fn month_range_covers_calendar_month() {
        let now = Local.with_ymd_and_hms(2025, 2, 14, 12, 0, 0).unwrap();
        let range = month_range(now);
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn aggregate_sums_totals_and_fields() {
        let a = record(1, &[("dinheiro", 5000), ("pixInter", 3000)]);
        let b = record(2, &[("dinheiro", 2000), ("encaixe", 1000)]);
        let summary = aggregate(&[&a, &b]);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.total, m(11000));
        assert_eq!(summary.by_field["dinheiro"], m(7000));
        assert_eq!(summary.by_field["pixInter"], m(3000));
        assert_eq!(summary.by_field["pixStone"], money::ZERO);
    }

    #[test]
    fn empty_period_is_all_zeros() {
        let summary = aggregate(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.total, money::ZERO);
        assert_eq!(share_percent(summary.by_field["dinheiro"], summary.total), 0.0);
    }

    #[test]
    fn buckets_keep_days_ascending_and_absent_days_absent() {
        let records = vec![
            record(10, &[("dinheiro", 100)]),
            record(3, &[("dinheiro", 200)]),
            record(10, &[("pixStone", 300)]),
        ];
        let days = bucket_by_day(&records);
        let keys: Vec<_> = days.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                NaiveDate::from_ymd_opt(2025, 4, 3).unwrap(),
                NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
            ]
        );
        assert_eq!(days[&keys[1]].count, 2);
        assert_eq!(days[&keys[1]].total, m(400));
    }

    #[test]
    fn shares_split_the_payment_mix() {
        let a = record(1, &[("dinheiro", 7500), ("pixInter", 2500)]);
        let summary = aggregate(&[&a]);
        assert_eq!(share_percent(summary.by_field["dinheiro"], summary.total), 75.0);
        assert_eq!(share_percent(summary.by_field["pixInter"], summary.total), 25.0);
    }

    #[test]
    fn estimator_ignores_days_without_channel_sales() {
        // Day 1: two sales with channel figures 100.00 and 50.00.
        // Day 2: a sale with payments but no channel sales.
        let records = vec![
            record(1, &[("vendasMesas", 10000), ("dinheiro", 10000)]),
            record(1, &[("vendasEntregas", 5000), ("pixInter", 5000)]),
            record(2, &[("dinheiro", 8000)]),
        ];
        let est = estimate_month(&records, NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
        assert_eq!(est.month_total, m(15000));
        assert_eq!(est.active_days, 1);
        assert_eq!(est.average_daily, m(15000));
        // April has 30 days.
        assert_eq!(est.projection, m(450_000));
        assert!((est.progress_percent - 100.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn estimator_with_no_records_is_all_zero() {
        let records: Vec<SaleRecord> = Vec::new();
        let est = estimate_month(&records, NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
        assert_eq!(est.average_daily, money::ZERO);
        assert_eq!(est.projection, money::ZERO);
        assert_eq!(est.progress_percent, 0.0);
    }
}
