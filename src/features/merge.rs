// src/features/merge.rs
//
// Backward as-of join: each left row receives the most recent right record
// whose date is not after the left row's date. Records from the future are
// never attached.

use chrono::NaiveDate;

/// Index of the last entry in `dates` (sorted ascending) that is <= `target`.
pub fn asof_position(dates: &[NaiveDate], target: NaiveDate) -> Option<usize> {
    dates.partition_point(|d| *d <= target).checked_sub(1)
}

/// Pairs each left item with the latest right item dated on or before it.
///
/// Both inputs must be sorted by date. Left items with no eligible right item
/// are dropped.
pub fn asof_join<'a, L, R>(
    left: &'a [L],
    right: &'a [R],
    left_date: impl Fn(&L) -> NaiveDate,
    right_date: impl Fn(&R) -> NaiveDate,
) -> Vec<(&'a L, &'a R)> {
    let mut joined = Vec::with_capacity(left.len());
    let mut cursor: Option<usize> = None;
    let mut next = 0;

    for item in left {
        let date = left_date(item);
        while next < right.len() && right_date(&right[next]) <= date {
            cursor = Some(next);
            next += 1;
        }
        if let Some(idx) = cursor {
            joined.push((item, &right[idx]));
        }
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn test_asof_position() {
        let dates = vec![date(1, 5), date(1, 12), date(1, 19)];
        assert_eq!(asof_position(&dates, date(1, 4)), None);
        assert_eq!(asof_position(&dates, date(1, 5)), Some(0));
        assert_eq!(asof_position(&dates, date(1, 18)), Some(1));
        assert_eq!(asof_position(&dates, date(2, 1)), Some(2));
    }

    #[test]
    fn test_asof_join_never_uses_future_records() {
        let left = vec![date(1, 5), date(1, 12), date(1, 19), date(1, 26), date(2, 2)];
        let right = vec![(date(1, 10), "q1"), (date(1, 26), "q2"), (date(3, 1), "q3")];

        let joined = asof_join(&left, &right, |d| *d, |r| r.0);
        // 01-05 has nothing before it and is dropped
        assert_eq!(joined.len(), 4);
        for (l, r) in &joined {
            assert!(r.0 <= **l);
        }
        assert_eq!(joined[0].1 .1, "q1");
        assert_eq!(joined[2].1 .1, "q2");
        assert_eq!(joined[3].1 .1, "q2");
    }
}
