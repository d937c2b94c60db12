// src/optimizer/returns.rs
//
// Date x instrument price and return matrices.
// Prices are outer-joined on date with holes kept as NaN (nothing is forward
// filled). Returns are simple returns; a return is NaN when either of its two
// prices is missing.

use crate::models::PriceTable;
use chrono::NaiveDate;
use log::warn;
use ndarray::{Array2, Axis};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatrix {
    pub dates: Vec<NaiveDate>,
    pub instruments: Vec<String>,
    /// dates x instruments, NaN where the instrument did not trade
    pub values: Array2<f64>,
}

impl PriceMatrix {
    /// Builds the matrix for `instruments` from prices dated on or before `cutoff`.
    ///
    /// Instruments without any price are left out with a warning; column order
    /// follows `instruments`.
    pub fn build(prices: &PriceTable, instruments: &[String], cutoff: Option<NaiveDate>) -> Self {
        let wanted: BTreeSet<&str> = instruments.iter().map(|s| s.as_str()).collect();
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<&str, f64>> = BTreeMap::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();

        for p in prices.points() {
            if cutoff.map_or(false, |c| p.date > c) {
                break;
            }
            if !p.price.is_finite() || !wanted.contains(p.instrument.as_str()) {
                continue;
            }
            seen.insert(p.instrument.as_str());
            by_date
                .entry(p.date)
                .or_default()
                .insert(p.instrument.as_str(), p.price);
        }

        let mut columns: Vec<String> = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            if columns.contains(instrument) {
                continue;
            }
            if seen.contains(instrument.as_str()) {
                columns.push(instrument.clone());
            } else {
                warn!("No price history for {}, skipped", instrument);
            }
        }

        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        let mut values = Array2::<f64>::from_elem((dates.len(), columns.len()), f64::NAN);
        for (i, row) in by_date.values().enumerate() {
            for (j, instrument) in columns.iter().enumerate() {
                if let Some(price) = row.get(instrument.as_str()) {
                    values[[i, j]] = *price;
                }
            }
        }

        Self {
            dates,
            instruments: columns,
            values,
        }
    }

    /// Simple returns between consecutive dates.
    pub fn returns(&self) -> ReturnsMatrix {
        let n = self.dates.len();
        if n < 2 {
            return ReturnsMatrix {
                dates: Vec::new(),
                instruments: self.instruments.clone(),
                values: Array2::zeros((0, self.instruments.len())),
            };
        }

        let mut values = Array2::<f64>::from_elem((n - 1, self.instruments.len()), f64::NAN);
        for i in 1..n {
            for j in 0..self.instruments.len() {
                let (prev, cur) = (self.values[[i - 1, j]], self.values[[i, j]]);
                if prev.is_finite() && cur.is_finite() && prev > 0.0 {
                    values[[i - 1, j]] = cur / prev - 1.0;
                }
            }
        }

        ReturnsMatrix {
            dates: self.dates[1..].to_vec(),
            instruments: self.instruments.clone(),
            values,
        }
    }
}

/// Simple returns indexed by date (rows) and instrument (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsMatrix {
    pub dates: Vec<NaiveDate>,
    pub instruments: Vec<String>,
    pub values: Array2<f64>,
}

impl ReturnsMatrix {
    pub fn new(dates: Vec<NaiveDate>, instruments: Vec<String>, values: Array2<f64>) -> Self {
        Self {
            dates,
            instruments,
            values,
        }
    }

    pub fn n_periods(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_instruments(&self) -> usize {
        self.values.ncols()
    }

    /// Keeps only dates on which every instrument has a return.
    pub fn complete_rows(&self) -> ReturnsMatrix {
        let keep: Vec<usize> = self
            .values
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
            .map(|(i, _)| i)
            .collect();

        ReturnsMatrix {
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            instruments: self.instruments.clone(),
            values: Array2::from_shape_fn((keep.len(), self.n_instruments()), |(i, j)| {
                self.values[[keep[i], j]]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn point(instrument: &str, d: u32, price: f64) -> PricePoint {
        PricePoint {
            instrument: instrument.to_string(),
            date: date(d),
            price,
        }
    }

    fn table() -> PriceTable {
        PriceTable::new(vec![
            point("A", 1, 10.0),
            point("A", 8, 11.0),
            point("A", 15, 12.1),
            point("B", 1, 20.0),
            // B did not trade on the 8th
            point("B", 15, 22.0),
            point("C", 1, 5.0),
            point("A", 22, 99.0),
        ])
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_holes_are_preserved() {
        let m = PriceMatrix::build(&table(), &names(&["A", "B"]), Some(date(15)));
        assert_eq!(m.dates.len(), 3);
        assert_eq!(m.instruments, names(&["A", "B"]));
        assert!(m.values[[1, 1]].is_nan());

        let r = m.returns();
        assert_eq!(r.n_periods(), 2);
        assert!((r.values[[0, 0]] - 0.1).abs() < 1e-12);
        assert!(r.values[[0, 1]].is_nan());
        assert!(r.values[[1, 1]].is_nan());

        let complete = r.complete_rows();
        assert_eq!(complete.n_periods(), 0);
    }

    #[test]
    fn test_cutoff_excludes_later_prices() {
        let m = PriceMatrix::build(&table(), &names(&["A"]), Some(date(15)));
        assert_eq!(*m.dates.last().unwrap(), date(15));
        let all = PriceMatrix::build(&table(), &names(&["A"]), None);
        assert_eq!(*all.dates.last().unwrap(), date(22));
    }

    #[test]
    fn test_unknown_instrument_skipped() {
        let m = PriceMatrix::build(&table(), &names(&["A", "ZZZ", "C"]), None);
        assert_eq!(m.instruments, names(&["A", "C"]));
    }
}
