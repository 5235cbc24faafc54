use std::fs::File;
use std::io::Write;

use anyhow::{Context, Result};
use csv::Writer;
use matchcast_core::{BacktestResult, ScoredPrediction};

pub struct CsvStorage;

impl CsvStorage {
    /// Writes the scored predictions of every period to a CSV file.
    ///
    /// Format: period,match_id,kickoff,window,market,probability,confidence,outcome,absolute_error,correct
    ///
    /// # Errors
    /// Returns error if file cannot be created or writing fails
    pub fn write_predictions(path: &str, results: &[BacktestResult]) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {path}"))?;
        Self::write_predictions_to(file, results)
    }

    /// Writes the same rows as [`CsvStorage::write_predictions`] to any writer.
    ///
    /// # Errors
    /// Returns error if writing fails
    pub fn write_predictions_to<W: Write>(sink: W, results: &[BacktestResult]) -> Result<()> {
        let mut writer = Writer::from_writer(sink);

        writer.write_record([
            "period",
            "match_id",
            "kickoff",
            "window",
            "market",
            "probability",
            "confidence",
            "outcome",
            "absolute_error",
            "correct",
        ])?;

        for result in results {
            let period = result.period.key();
            for prediction in &result.predictions {
                writer.write_record(Self::row(&period, prediction))?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn row(period: &str, prediction: &ScoredPrediction) -> [String; 10] {
        [
            period.to_string(),
            prediction.match_id().to_string(),
            prediction.kickoff().to_rfc3339(),
            prediction.window().to_string(),
            prediction.market().to_string(),
            format!("{:.6}", prediction.probability()),
            format!("{:.6}", prediction.confidence()),
            format!("{:.1}", prediction.outcome()),
            format!("{:.6}", prediction.absolute_error()),
            prediction.is_correct().to_string(),
        ]
    }
}
