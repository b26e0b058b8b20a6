use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::warn;

use crate::types::{MonthDay, RepeatRule};

/// Candidate days checked by the weekly scan. One more than a week, so any
/// non-empty weekday set always matches.
const WEEKLY_SCAN_DAYS: u64 = 8;

/// Upper bound on months tried by the monthly rule. Two always suffice.
const MONTHLY_MAX_STEPS: u32 = 12;

/// Compute the next trigger instant for `rule`, strictly after `reference`.
///
/// `scheduled_at` is the reminder's original target; its UTC time of day is
/// kept for every occurrence. For `Once` the original instant is returned
/// unchanged and the caller is responsible for disabling the reminder.
pub fn next_trigger(
    rule: &RepeatRule,
    scheduled_at: DateTime<Utc>,
    reference: DateTime<Utc>,
) -> DateTime<Utc> {
    let time_of_day = scheduled_at.time();

    match rule {
        RepeatRule::Once => scheduled_at,
        RepeatRule::Daily => next_daily(time_of_day, reference),
        RepeatRule::Weekly { days } => {
            next_weekly(days, time_of_day, reference).unwrap_or_else(|| {
                // Only reachable with an empty or corrupt weekday set.
                warn!(?days, "weekly scan found no matching weekday; falling back to +7 days");
                scheduled_at + Duration::days(7)
            })
        }
        RepeatRule::Monthly { day } => next_monthly(*day, time_of_day, reference)
            .unwrap_or_else(|| {
                warn!(?day, "monthly rule found no valid date; falling back to +1 month");
                scheduled_at
                    .checked_add_months(Months::new(1))
                    .unwrap_or(scheduled_at + Duration::days(31))
            }),
    }
}

fn next_daily(time_of_day: NaiveTime, reference: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = reference.date_naive() + Days::new(1);
    let mut candidate = at_time(tomorrow, time_of_day);
    // Late processing or clock skew can leave the candidate behind the reference.
    while candidate <= reference {
        candidate += Duration::days(1);
    }
    candidate
}

fn next_weekly(
    days: &[u8],
    time_of_day: NaiveTime,
    reference: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let start = reference.date_naive() + Days::new(1);
    (0..WEEKLY_SCAN_DAYS)
        .map(|offset| start + Days::new(offset))
        .filter(|date| days.contains(&weekday_index(*date)))
        .map(|date| at_time(date, time_of_day))
        .find(|candidate| *candidate > reference)
}

fn next_monthly(
    day: MonthDay,
    time_of_day: NaiveTime,
    reference: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let (mut year, mut month) = following_month(reference.year(), reference.month());

    for _ in 0..MONTHLY_MAX_STEPS {
        let target_day = day.resolve(days_in_month(year, month));
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, target_day) {
            let candidate = at_time(date, time_of_day);
            if candidate > reference {
                return Some(candidate);
            }
        }
        (year, month) = following_month(year, month);
    }
    None
}

/// Weekday index with 0 = Sunday … 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Number of days in the given month (28–31).
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = following_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn following_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn at_time(date: NaiveDate, time_of_day: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time_of_day))
}
