//! Property and table tests for the business calendar.

mod common;

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use fleet_repair::services::calendar::{compute_finish, is_within_work_window};
use proptest::prelude::*;
use rstest::rstest;

use common::at;

fn start_strategy() -> impl Strategy<Value = NaiveDateTime> {
    (0i64..730, 0i64..24 * 4).prop_map(|(day, quarter)| {
        at(2025, 1, 1, 0, 0) + Duration::days(day) + Duration::minutes(quarter * 15)
    })
}

fn holiday_strategy() -> impl Strategy<Value = BTreeSet<NaiveDate>> {
    prop::collection::btree_set(0i64..730, 0..40).prop_map(|days| {
        days.into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(d))
            .collect()
    })
}

/// Quarter hours keep every duration exactly representable.
fn hours_strategy() -> impl Strategy<Value = f64> {
    (0u32..=160).prop_map(|quarters| f64::from(quarters) / 4.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn finish_lands_inside_a_work_window(
        start in start_strategy(),
        hours in hours_strategy(),
        holidays in holiday_strategy()
    ) {
        let finish = compute_finish(start, hours, &holidays);
        prop_assert!(
            is_within_work_window(finish, &holidays),
            "{} + {}h finished outside working time at {}", start, hours, finish
        );
        prop_assert!(!matches!(finish.weekday(), Weekday::Sat | Weekday::Sun));
        prop_assert!(!holidays.contains(&finish.date()));
    }

    #[test]
    fn finish_is_deterministic_and_never_before_start(
        start in start_strategy(),
        hours in hours_strategy(),
        holidays in holiday_strategy()
    ) {
        let first = compute_finish(start, hours, &holidays);
        let second = compute_finish(start, hours, &holidays);
        prop_assert_eq!(first, second);
        prop_assert!(first >= start);
    }

    #[test]
    fn splitting_a_job_does_not_change_its_finish(
        start in start_strategy(),
        first in 1u32..=80,
        second in 1u32..=80,
        holidays in holiday_strategy()
    ) {
        let a = f64::from(first) / 4.0;
        let b = f64::from(second) / 4.0;
        let in_one_go = compute_finish(start, a + b, &holidays);
        let in_two_parts = compute_finish(compute_finish(start, a, &holidays), b, &holidays);
        prop_assert_eq!(in_one_go, in_two_parts);
    }

    #[test]
    fn more_hours_never_finish_earlier(
        start in start_strategy(),
        hours in hours_strategy(),
        extra in 0u32..=40
    ) {
        let none = BTreeSet::new();
        let base = compute_finish(start, hours, &none);
        let longer = compute_finish(start, hours + f64::from(extra) / 4.0, &none);
        prop_assert!(longer >= base);
    }
}

// 2025-01-03 is a Friday; 2025-01-06 a Monday.
#[rstest]
#[case::lunch_is_skipped(at(2025, 1, 8, 11, 30), 1.0, at(2025, 1, 8, 13, 30))]
#[case::weekend_is_skipped(at(2025, 1, 3, 16, 0), 2.0, at(2025, 1, 6, 9, 0))]
#[case::before_opening(at(2025, 1, 8, 6, 0), 1.5, at(2025, 1, 8, 9, 30))]
#[case::saturday_start(at(2025, 1, 4, 10, 0), 0.0, at(2025, 1, 6, 8, 0))]
#[case::full_week(at(2025, 1, 6, 8, 0), 40.0, at(2025, 1, 10, 17, 0))]
#[case::ends_at_lunch(at(2025, 1, 8, 8, 0), 4.0, at(2025, 1, 8, 12, 0))]
fn worked_examples(
    #[case] start: NaiveDateTime,
    #[case] hours: f64,
    #[case] expected: NaiveDateTime,
) {
    assert_eq!(compute_finish(start, hours, &BTreeSet::new()), expected);
}

#[test]
fn holidays_push_past_the_long_weekend() {
    let holidays: BTreeSet<NaiveDate> = [(2025, 1, 4), (2025, 1, 5), (2025, 1, 6)]
        .into_iter()
        .map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
        .collect();
    assert_eq!(
        compute_finish(at(2025, 1, 3, 16, 0), 2.0, &holidays),
        at(2025, 1, 7, 9, 0)
    );
}
