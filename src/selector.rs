// src/selector.rs
//
// Ticker selection: score every feature row with a classifier, average the
// probabilities over each instrument's most recent quarter and keep the
// instruments whose average clears the threshold.

use crate::error::PipelineError;
use crate::models::FeatureTable;
use crate::traits::Classifier;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean probability of one instrument over its latest quarter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionScore {
    pub instrument: String,
    pub quarter_id: u32,
    pub mean_probability: f64,
    pub observations: usize,
}

/// Scores of every candidate and the instruments that cleared the threshold.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub threshold: f64,
    pub scores: Vec<SelectionScore>,
    /// Sorted by instrument id
    pub selected: Vec<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Errors with `EmptySelection` when nothing was selected.
    pub fn require_non_empty(self) -> Result<Self, PipelineError> {
        if self.selected.is_empty() {
            return Err(PipelineError::EmptySelection {
                threshold: self.threshold,
                candidates: self.scores.len(),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TickerSelector {
    threshold: f64,
}

impl TickerSelector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Per-instrument mean probability over the latest quarter.
    ///
    /// An empty table yields no scores and never reaches the classifier.
    pub fn score(
        &self,
        features: &FeatureTable,
        classifier: &dyn Classifier,
    ) -> Result<Vec<SelectionScore>, PipelineError> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = classifier.columns() {
            let actual = features.model_columns();
            if expected != actual.as_slice() {
                return Err(PipelineError::Classifier(format!(
                    "{} was trained on columns {:?}, feature table has {:?}",
                    classifier.name(),
                    expected,
                    actual
                )));
            }
        }

        let probabilities = classifier.predict_score(&features.model_matrix()?)?;
        if probabilities.len() != features.len() {
            return Err(PipelineError::Classifier(format!(
                "{} returned {} scores for {} rows",
                classifier.name(),
                probabilities.len(),
                features.len()
            )));
        }

        // instrument -> (latest quarter, sum, count)
        let mut latest: BTreeMap<&str, (u32, f64, usize)> = BTreeMap::new();
        for (row, p) in features.rows.iter().zip(&probabilities) {
            let entry = latest
                .entry(row.instrument.as_str())
                .or_insert((row.quarter_id, 0.0, 0));
            if row.quarter_id > entry.0 {
                *entry = (row.quarter_id, 0.0, 0);
            }
            if row.quarter_id == entry.0 {
                entry.1 += p;
                entry.2 += 1;
            }
        }

        Ok(latest
            .into_iter()
            .map(|(instrument, (quarter_id, sum, count))| SelectionScore {
                instrument: instrument.to_string(),
                quarter_id,
                mean_probability: sum / count as f64,
                observations: count,
            })
            .collect())
    }

    /// Scores the table and keeps instruments strictly above the threshold.
    pub fn select(
        &self,
        features: &FeatureTable,
        classifier: &dyn Classifier,
    ) -> Result<Selection, PipelineError> {
        let scores = self.score(features, classifier)?;
        let selected: Vec<String> = scores
            .iter()
            .filter(|s| s.mean_probability > self.threshold)
            .map(|s| s.instrument.clone())
            .collect();

        for s in &scores {
            debug!(
                "{}: p={:.4} over {} rows of quarter {}",
                s.instrument, s.mean_probability, s.observations, s.quarter_id
            );
        }
        info!(
            "{} selected {} of {} instruments (threshold {})",
            classifier.name(),
            selected.len(),
            scores.len(),
            self.threshold
        );

        Ok(Selection {
            threshold: self.threshold,
            scores,
            selected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureRow;
    use chrono::{Duration, NaiveDate};
    use ndarray::Array2;

    /// Returns the first feature column as the probability.
    struct FirstColumn;

    impl Classifier for FirstColumn {
        fn name(&self) -> &str {
            "first_column"
        }

        fn predict_score(&self, features: &Array2<f64>) -> Result<Vec<f64>, PipelineError> {
            Ok(features.column(0).to_vec())
        }
    }

    struct Panics;

    impl Classifier for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn predict_score(&self, _: &Array2<f64>) -> Result<Vec<f64>, PipelineError> {
            panic!("classifier must not be called");
        }
    }

    struct Short;

    impl Classifier for Short {
        fn name(&self) -> &str {
            "short"
        }

        fn predict_score(&self, _: &Array2<f64>) -> Result<Vec<f64>, PipelineError> {
            Ok(vec![0.9])
        }
    }

    fn row(instrument: &str, week: i64, quarter_id: u32, p: f64) -> FeatureRow {
        FeatureRow {
            instrument: instrument.to_string(),
            date: NaiveDate::from_ymd_opt(2023, 1, 6).unwrap() + Duration::weeks(week),
            quarter_id,
            since_quarter_start: 0.0,
            features: vec![p],
            close_raw: 10.0,
            outperformed: None,
        }
    }

    fn table() -> FeatureTable {
        FeatureTable::new(
            vec!["p".to_string()],
            vec![
                // A: old quarter is great, latest quarter is mediocre
                row("A", 0, 1, 0.99),
                row("A", 1, 2, 0.5),
                row("A", 2, 2, 0.6),
                row("B", 0, 1, 0.7),
                row("B", 1, 1, 0.8),
                row("C", 0, 3, 0.65),
            ],
        )
    }

    #[test]
    fn test_uses_latest_quarter_only() {
        let scores = TickerSelector::new(0.6).score(&table(), &FirstColumn).unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0].instrument, "A");
        assert_eq!(scores[0].quarter_id, 2);
        assert!((scores[0].mean_probability - 0.55).abs() < 1e-12);
        assert_eq!(scores[0].observations, 2);
        assert!((scores[1].mean_probability - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        let selection = TickerSelector::new(0.65).select(&table(), &FirstColumn).unwrap();
        assert_eq!(selection.selected, vec!["B"]);
    }

    #[test]
    fn test_raising_threshold_never_grows_selection() {
        let features = table();
        let mut previous = usize::MAX;
        for step in 0..=20 {
            let threshold = step as f64 * 0.05;
            let n = TickerSelector::new(threshold)
                .select(&features, &FirstColumn)
                .unwrap()
                .selected
                .len();
            assert!(n <= previous);
            previous = n;
        }
    }

    #[test]
    fn test_empty_table_skips_classifier() {
        let empty = FeatureTable::new(vec!["p".to_string()], vec![]);
        let selection = TickerSelector::new(0.6).select(&empty, &Panics).unwrap();
        assert!(selection.is_empty());
        let err = selection.require_non_empty().unwrap_err();
        assert!(err.is_empty_selection());
    }

    #[test]
    fn test_score_count_mismatch() {
        let result = TickerSelector::new(0.6).score(&table(), &Short);
        assert!(matches!(result, Err(PipelineError::Classifier(_))));
    }

    #[test]
    fn test_trained_columns_must_match() {
        use crate::classifier::LogisticModel;
        let matching = LogisticModel::new("lr", vec![1.0, 0.0], 0.0)
            .with_columns(vec!["p".to_string(), "since_quarter_start".to_string()]);
        assert!(TickerSelector::new(0.6).score(&table(), &matching).is_ok());

        let reordered = LogisticModel::new("lr", vec![0.0, 1.0], 0.0)
            .with_columns(vec!["since_quarter_start".to_string(), "p".to_string()]);
        let result = TickerSelector::new(0.6).score(&table(), &reordered);
        assert!(matches!(result, Err(PipelineError::Classifier(_))));
    }
}
