// src/features/resample.rs
//
// Weekly resampling of raw bars. Weeks end on Friday; a bar dated Saturday
// belongs to the following Friday's week. Weeks without trades produce no row.

use crate::models::PriceBar;
use chrono::{Datelike, Duration, NaiveDate};
use log::warn;
use std::collections::BTreeMap;

/// Returns the Friday that closes the week containing `date`.
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let offset = (4 + 7 - date.weekday().num_days_from_monday() as i64) % 7;
    date + Duration::days(offset)
}

/// Groups bars by instrument, sorted by date, dropping duplicate
/// (instrument, date) pairs (the last one wins).
pub fn group_by_instrument(bars: &[PriceBar]) -> BTreeMap<String, Vec<PriceBar>> {
    let mut grouped: BTreeMap<String, BTreeMap<NaiveDate, PriceBar>> = BTreeMap::new();
    for bar in bars {
        let series = grouped.entry(bar.instrument.clone()).or_default();
        if series.insert(bar.date, bar.clone()).is_some() {
            warn!("Duplicate bar for {} on {}, keeping the last one", bar.instrument, bar.date);
        }
    }
    grouped
        .into_iter()
        .map(|(instrument, series)| (instrument, series.into_values().collect()))
        .collect()
}

/// Resamples one instrument's date-sorted bars to weekly bars:
/// first open, max high, min low, last close, summed volume.
pub fn resample_series(bars: &[PriceBar]) -> Vec<PriceBar> {
    let mut weekly: Vec<PriceBar> = Vec::new();

    for bar in bars.iter().filter(|b| b.close.is_finite()) {
        let week = week_ending(bar.date);
        match weekly.last_mut() {
            Some(current) if current.date == week => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
            _ => weekly.push(PriceBar {
                instrument: bar.instrument.clone(),
                date: week,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }),
        }
    }

    weekly
}

/// Resamples a multi-instrument bar set to weekly granularity.
pub fn resample_weekly(bars: &[PriceBar]) -> BTreeMap<String, Vec<PriceBar>> {
    group_by_instrument(bars)
        .into_iter()
        .map(|(instrument, series)| (instrument, resample_series(&series)))
        .filter(|(_, series)| !series.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_ending_friday() {
        // 2024-01-01 is a Monday
        assert_eq!(week_ending(date(2024, 1, 1)), date(2024, 1, 5));
        assert_eq!(week_ending(date(2024, 1, 5)), date(2024, 1, 5));
        assert_eq!(week_ending(date(2024, 1, 6)), date(2024, 1, 12));
        assert_eq!(week_ending(date(2024, 1, 7)), date(2024, 1, 12));
    }

    #[test]
    fn test_resample_last_close_summed_volume() {
        let bars = vec![
            PriceBar::from_close("AAA", date(2024, 1, 2), 10.0, 100.0),
            PriceBar::from_close("AAA", date(2024, 1, 4), 11.0, 50.0),
            PriceBar::from_close("AAA", date(2024, 1, 3), 12.0, 25.0),
            // no trades in the week ending 2024-01-12
            PriceBar::from_close("AAA", date(2024, 1, 16), 9.0, 10.0),
        ];
        let weekly = resample_weekly(&bars);
        let series = &weekly["AAA"];
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, date(2024, 1, 5));
        assert_eq!(series[0].close, 11.0);
        assert_eq!(series[0].volume, 175.0);
        assert_eq!(series[0].high, 12.0);
        assert_eq!(series[1].date, date(2024, 1, 19));
    }

    #[test]
    fn test_duplicate_dates_dropped() {
        let bars = vec![
            PriceBar::from_close("AAA", date(2024, 1, 2), 10.0, 100.0),
            PriceBar::from_close("AAA", date(2024, 1, 2), 10.5, 100.0),
        ];
        let grouped = group_by_instrument(&bars);
        assert_eq!(grouped["AAA"].len(), 1);
        assert_eq!(grouped["AAA"][0].close, 10.5);
    }
}
