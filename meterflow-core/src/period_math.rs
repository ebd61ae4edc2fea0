//! Calendar arithmetic for billing period boundaries.
//!
//! Isolated from the Period Engine's state machine because both the
//! subscription period advance and scheduled-job cadence computation need
//! the same month-clamping rule, and it is easy to get wrong in just one of
//! the two call sites if it's not shared.

use crate::model::pricing::BillingPeriodUnit;
use crate::model::subscription::BillingCycleAnchoring;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

/// Adds `months` calendar months to `dt`, clamping the day-of-month to the
/// last valid day of the target month (Jan 31 + 1 month -> Feb 28/29).
pub fn add_months_clamped(dt: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let total_months = dt.year() * 12 + (dt.month() as i32 - 1) + months;
    let target_year = total_months.div_euclid(12);
    let target_month = total_months.rem_euclid(12) + 1;
    let last_day = last_day_of_month(target_year, target_month as u32);
    let day = dt.day().min(last_day);
    let naive_date = NaiveDate::from_ymd_opt(target_year, target_month as u32, day)
        .expect("clamped day is always valid for its month");
    let naive_dt = naive_date.and_time(dt.time());
    Utc.from_utc_datetime(&naive_dt)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("valid first-of-month")
        .pred_opt()
        .expect("valid previous day")
        .day()
}

/// Computes the next billing-period boundary strictly after `current_end`.
///
/// `billing_anchor` supplies the reference instant (time-of-day, and for
/// `Anniversary` anchoring, day-of-period) that subsequent boundaries are
/// computed from. `Calendar` anchoring instead aligns to the start of the
/// calendar unit (e.g. the first of the month for `Month`).
pub fn next_period_boundary(
    current_end: DateTime<Utc>,
    billing_anchor: DateTime<Utc>,
    unit: BillingPeriodUnit,
    count: u32,
    anchoring: BillingCycleAnchoring,
) -> DateTime<Utc> {
    let count = count.max(1) as i32;
    match unit {
        BillingPeriodUnit::Day => current_end + chrono::Duration::days(count as i64),
        BillingPeriodUnit::Week => current_end + chrono::Duration::weeks(count as i64),
        BillingPeriodUnit::Month => match anchoring {
            BillingCycleAnchoring::Anniversary => add_months_clamped(current_end, count),
            BillingCycleAnchoring::Calendar => {
                let aligned = align_to_calendar_month_start(current_end, billing_anchor);
                add_months_clamped(aligned, count)
            }
        },
        BillingPeriodUnit::Year => match anchoring {
            BillingCycleAnchoring::Anniversary => add_months_clamped(current_end, count * 12),
            BillingCycleAnchoring::Calendar => {
                let aligned = align_to_calendar_year_start(current_end, billing_anchor);
                add_months_clamped(aligned, count * 12)
            }
        },
    }
}

fn align_to_calendar_month_start(dt: DateTime<Utc>, anchor: DateTime<Utc>) -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)
        .expect("valid first-of-month")
        .and_time(anchor.time());
    Utc.from_utc_datetime(&naive)
}

fn align_to_calendar_year_start(dt: DateTime<Utc>, anchor: DateTime<Utc>) -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(dt.year(), 1, 1)
        .expect("valid first-of-year")
        .and_time(anchor.time());
    Utc.from_utc_datetime(&naive)
}
