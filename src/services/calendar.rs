//! Business calendar used to turn labor-hour estimates into wall-clock finish times.
//!
//! The shop works 08:00–12:00 and 13:00–17:00, Monday to Friday, except on
//! holidays. Hours are consumed greedily inside those windows.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Working windows as `(start_hour, end_hour)`, in order.
pub const WORK_WINDOWS: [(u32, u32); 2] = [(8, 12), (13, 17)];

/// Nominal working hours in a full day.
pub const HOURS_PER_WORK_DAY: u32 = 8;

const WEEK_SECONDS: i64 = 5 * HOURS_PER_WORK_DAY as i64 * 3600;

pub fn is_work_day(date: NaiveDate, holidays: &BTreeSet<NaiveDate>) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&date)
}

/// True when `at` lies inside a working window or exactly on its closing boundary.
pub fn is_within_work_window(at: NaiveDateTime, holidays: &BTreeSet<NaiveDate>) -> bool {
    if !is_work_day(at.date(), holidays) {
        return false;
    }
    WORK_WINDOWS.iter().any(|&(open, close)| {
        let start = hour_on(at.date(), open);
        let end = hour_on(at.date(), close);
        at >= start && at <= end
    })
}

/// Computes when `duration_hours` of work starting at `start` will be finished.
///
/// A start outside working time is first moved to the next window opening.
/// Zero hours returns that adjusted start. Negative or non-finite durations are
/// treated as zero. Durations that run past the last representable date
/// saturate at the last reachable working instant.
pub fn compute_finish(
    start: NaiveDateTime,
    duration_hours: f64,
    holidays: &BTreeSet<NaiveDate>,
) -> NaiveDateTime {
    let mut remaining = hours_to_seconds(duration_hours);
    let Some((mut cursor, mut window_end)) = next_window_slot(start, holidays) else {
        return start;
    };

    loop {
        if let Some((skipped_to, left)) = skip_whole_weeks(cursor, remaining, holidays) {
            remaining = left;
            match next_window_slot(skipped_to, holidays) {
                Some(slot) => (cursor, window_end) = slot,
                None => return skipped_to,
            }
            continue;
        }
        let available = (window_end - cursor).num_seconds();
        if remaining <= available {
            return cursor + Duration::seconds(remaining);
        }
        remaining -= available;
        match next_window_slot(window_end, holidays) {
            Some(slot) => (cursor, window_end) = slot,
            None => return window_end,
        }
    }
}

/// Jumps over whole holiday-free weeks when `cursor` is the first opening of its day.
///
/// Any seven consecutive days hold five weekdays, so each skipped week is
/// worth exactly [`WEEK_SECONDS`]. At least one second is always left over, so
/// the finish lies after the skipped span.
fn skip_whole_weeks(
    cursor: NaiveDateTime,
    remaining: i64,
    holidays: &BTreeSet<NaiveDate>,
) -> Option<(NaiveDateTime, i64)> {
    let day = cursor.date();
    if remaining <= WEEK_SECONDS || cursor != hour_on(day, WORK_WINDOWS[0].0) {
        return None;
    }
    let mut weeks = (remaining - 1) / WEEK_SECONDS;
    if let Some(holiday) = holidays.range(day..).next() {
        weeks = weeks.min((*holiday - day).num_days() / 7);
    }
    // Leave a week of headroom before the end of the date range.
    weeks = weeks.min((NaiveDate::MAX - day).num_days() / 7 - 1);
    if weeks <= 0 {
        return None;
    }
    let target = day.checked_add_days(Days::new(u64::try_from(weeks).ok()? * 7))?;
    Some((
        NaiveDateTime::new(target, NaiveTime::MIN),
        remaining - weeks * WEEK_SECONDS,
    ))
}

/// Returns the working instant at or after `at` together with the close of its window.
///
/// A window's closing instant is not itself workable, so `at == 17:00` moves to
/// the next working day. `None` once the date range is exhausted.
fn next_window_slot(
    at: NaiveDateTime,
    holidays: &BTreeSet<NaiveDate>,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let mut date = at.date();
    let mut earliest = at;

    loop {
        if is_work_day(date, holidays) {
            for &(open, close) in WORK_WINDOWS.iter() {
                let window_start = hour_on(date, open);
                let window_end = hour_on(date, close);
                if earliest < window_end {
                    return Some((earliest.max(window_start), window_end));
                }
            }
        }
        date = date.succ_opt()?;
        earliest = NaiveDateTime::new(date, NaiveTime::MIN);
    }
}

fn hour_on(date: NaiveDate, hour: u32) -> NaiveDateTime {
    NaiveDateTime::new(date, NaiveTime::MIN) + Duration::hours(i64::from(hour))
}

fn hours_to_seconds(hours: f64) -> i64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0;
    }
    let seconds = (hours * 3600.0).round();
    if seconds >= i64::MAX as f64 {
        i64::MAX
    } else {
        seconds as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2025-01-03 is a Friday.
    #[test]
    fn friday_afternoon_rolls_over_weekend() {
        let finish = compute_finish(at(2025, 1, 3, 16, 0), 2.0, &BTreeSet::new());
        assert_eq!(finish, at(2025, 1, 6, 9, 0));
    }

    #[test]
    fn holidays_extend_the_weekend() {
        let holidays: BTreeSet<_> = [date(2025, 1, 4), date(2025, 1, 5), date(2025, 1, 6)]
            .into_iter()
            .collect();
        let finish = compute_finish(at(2025, 1, 3, 16, 0), 2.0, &holidays);
        assert_eq!(finish, at(2025, 1, 7, 9, 0));
    }

    #[test]
    fn lunch_break_is_skipped() {
        let finish = compute_finish(at(2025, 1, 8, 11, 30), 1.0, &BTreeSet::new());
        assert_eq!(finish, at(2025, 1, 8, 13, 30));
    }

    #[test]
    fn zero_hours_returns_adjusted_start() {
        let none = BTreeSet::new();
        assert_eq!(compute_finish(at(2025, 1, 8, 6, 15), 0.0, &none), at(2025, 1, 8, 8, 0));
        assert_eq!(compute_finish(at(2025, 1, 8, 12, 20), 0.0, &none), at(2025, 1, 8, 13, 0));
        assert_eq!(compute_finish(at(2025, 1, 8, 17, 0), 0.0, &none), at(2025, 1, 9, 8, 0));
        assert_eq!(compute_finish(at(2025, 1, 4, 10, 0), 0.0, &none), at(2025, 1, 6, 8, 0));
    }

    #[test]
    fn work_can_end_exactly_at_close() {
        let finish = compute_finish(at(2025, 1, 8, 16, 0), 1.0, &BTreeSet::new());
        assert_eq!(finish, at(2025, 1, 8, 17, 0));
    }

    #[test]
    fn multi_day_estimates_span_full_days() {
        // Wednesday 08:00 plus 20h: Wed 8h, Thu 8h, Fri 4h (morning).
        let finish = compute_finish(at(2025, 1, 8, 8, 0), 20.0, &BTreeSet::new());
        assert_eq!(finish, at(2025, 1, 10, 12, 0));
    }

    #[test]
    fn fractional_hours_round_to_seconds() {
        let finish = compute_finish(at(2025, 1, 8, 8, 0), 0.25, &BTreeSet::new());
        assert_eq!(finish, at(2025, 1, 8, 8, 15));
    }

    #[test]
    fn negative_and_nan_durations_are_zero() {
        let none = BTreeSet::new();
        let start = at(2025, 1, 8, 9, 0);
        assert_eq!(compute_finish(start, -3.0, &none), start);
        assert_eq!(compute_finish(start, f64::NAN, &none), start);
    }

    #[test]
    fn long_jobs_match_day_by_day_consumption() {
        // 2025-01-20 and 2025-02-17 are Monday holidays, 2025-03-05 is a Wednesday.
        let holidays: BTreeSet<_> = [date(2025, 1, 20), date(2025, 2, 17), date(2025, 3, 5)]
            .into_iter()
            .collect();
        let start = at(2025, 1, 6, 8, 0);
        let stepped = (0..60).fold(start, |at, _| compute_finish(at, 8.0, &holidays));
        assert_eq!(compute_finish(start, 480.0, &holidays), stepped);
    }

    #[test]
    fn skipped_weeks_can_start_mid_week() {
        // Thursday 08:00 plus 41h: two weeks of 40h would not fit, one week lands
        // on the next Thursday 08:00 and 1h more follows.
        let finish = compute_finish(at(2025, 1, 9, 8, 0), 41.0, &BTreeSet::new());
        assert_eq!(finish, at(2025, 1, 16, 9, 0));
    }

    #[test]
    fn huge_durations_saturate_at_the_end_of_the_calendar() {
        let none = BTreeSet::new();
        let start = at(2025, 1, 6, 8, 0);
        let finish = compute_finish(start, 1e9, &none);
        assert!(finish > start);
        assert!(finish.year() > 262_000);
        assert!(is_within_work_window(finish, &none));
        assert_eq!(compute_finish(start, f64::MAX, &none), finish);
    }

    #[test]
    fn window_membership_includes_closing_boundary() {
        let none = BTreeSet::new();
        assert!(is_within_work_window(at(2025, 1, 8, 12, 0), &none));
        assert!(is_within_work_window(at(2025, 1, 8, 17, 0), &none));
        assert!(!is_within_work_window(at(2025, 1, 8, 12, 30), &none));
        assert!(!is_within_work_window(at(2025, 1, 11, 9, 0), &none));
    }
}
