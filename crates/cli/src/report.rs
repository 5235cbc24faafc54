#![allow(clippy::format_push_string)]

use matchcast_backtest::temporal::{ModelComparison, OverfittingReport};
use matchcast_core::{BacktestMetrics, BacktestResult, PersistenceStatus};
use matchcast_ensemble::RetrainReport;

const RULE: &str = "═══════════════════════════════════════════════════════════════\n";
const THIN: &str = "───────────────────────────────────────────────────────────────\n";

/// Fixed-width text reports for the CLI.
pub struct ReportFormatter;

impl ReportFormatter {
    #[must_use]
    pub fn backtest(results: &[BacktestResult]) -> String {
        let mut output = String::new();
        banner(&mut output, "BACKTEST RESULTS");

        if results.is_empty() {
            output.push_str("No periods were completed.\n");
            output.push_str(RULE);
            return output;
        }

        for result in results {
            Self::period(&mut output, result);
        }

        let predictions: usize = results.iter().map(|r| r.predictions.len()).sum();
        let eligible: usize = results.iter().map(|r| r.eligible).sum();
        let failed = results
            .iter()
            .filter(|r| r.persistence == PersistenceStatus::Failed)
            .count();
        output.push_str("Run Totals\n");
        output.push_str(THIN);
        output.push_str(&format!("Periods:               {}\n", results.len()));
        output.push_str(&format!("Scored Predictions:    {predictions}\n"));
        output.push_str(&format!("Eligible Units:        {eligible}\n"));
        if failed > 0 {
            output.push_str(&format!(
                "\n⚠️  {failed} period result(s) could not be persisted.\n"
            ));
        }
        output.push('\n');
        output.push_str(RULE);
        output
    }

    fn period(output: &mut String, result: &BacktestResult) {
        let period = &result.period;
        output.push_str(&format!(
            "Period {} (matchweeks {}-{})\n",
            period.season_label, period.matchweeks.first, period.matchweeks.last
        ));
        output.push_str(THIN);
        output.push_str(&format!(
            "Start:                 {}\n",
            period.start.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!(
            "End:                   {}\n",
            period.end.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!("Model:                 {}\n", result.config.model_kind));
        metrics(output, &result.metrics);
        output.push_str(&format!(
            "Coverage:              {:.2}% of {} eligible\n",
            result.coverage * 100.0,
            result.eligible
        ));

        let excluded = &result.exclusions;
        output.push_str(&format!(
            "Excluded:              {} insufficient, {} low confidence, {} no outcome, {} timeout, {} store error\n",
            excluded.insufficient_data,
            excluded.low_confidence,
            excluded.outcome_unavailable,
            excluded.store_timeouts,
            excluded.store_errors
        ));
        if !result.weight_versions.is_empty() {
            let versions: Vec<String> = result
                .weight_versions
                .iter()
                .map(|(window, version)| format!("{window}=v{version}"))
                .collect();
            output.push_str(&format!("Weight Versions:       {}\n", versions.join(", ")));
        }
        output.push_str(&format!("Persistence:           {:?}\n", result.persistence));
        output.push('\n');

        if !result.windows.is_empty() {
            output.push_str("Window     Preds   Accuracy    Brier   Confidence   vs Prev\n");
            for window in &result.windows {
                let delta = window
                    .improvement_vs_previous
                    .map_or_else(|| "-".to_string(), |d| format!("{:+.2}%", d * 100.0));
                output.push_str(&format!(
                    "{:<10} {:>5}   {:>7.2}%   {:>6.4}   {:>9.2}%   {:>7}\n",
                    window.window.to_string(),
                    window.predictions,
                    window.accuracy * 100.0,
                    window.brier_score,
                    window.avg_confidence * 100.0,
                    delta
                ));
            }
            output.push('\n');
        }

        let summary = &result.summary;
        if let (Some(best), Some(worst)) = (summary.best_window, summary.worst_window) {
            output.push_str(&format!("Best / Worst Window:   {best} / {worst}\n"));
        }
        output.push_str(&format!(
            "Reliability:           {:.4}\n",
            summary.model_reliability
        ));
        output.push_str(&format!(
            "Temporal Consistency:  {:.4}\n",
            summary.temporal_consistency
        ));
        if let Some(warning) = &summary.reliability_warning {
            output.push_str(&format!("⚠️  {warning}\n"));
        }
        for recommendation in &summary.recommendations {
            output.push_str(&format!("  • {recommendation}\n"));
        }
        output.push('\n');
    }

    #[must_use]
    pub fn comparison(comparison: &ModelComparison) -> String {
        let mut output = String::new();
        banner(&mut output, "MODEL COMPARISON");
        output.push_str(&format!(
            "Season {} over {} period(s)\n\n",
            comparison.season_label,
            comparison.periods.len()
        ));

        output.push_str("Rank  Model        Preds   Accuracy    Brier   Coverage   p-value   Brier Δ vs baseline\n");
        output.push_str(THIN);
        for score in &comparison.rankings {
            let delta = score.brier_vs_baseline.as_ref().map_or_else(
                || "-".to_string(),
                |b| format!("{:+.4} [{:+.4}, {:+.4}]", b.point_estimate, b.ci_lower, b.ci_upper),
            );
            output.push_str(&format!(
                "{:<5} {:<12} {:>5}   {:>7.2}%   {:>6.4}   {:>7.2}%   {:>7.4}   {}\n",
                score.rank,
                score.model_kind.to_string(),
                score.metrics.total,
                score.metrics.accuracy * 100.0,
                score.metrics.brier_score,
                score.coverage * 100.0,
                score.significance.p_value,
                delta
            ));
        }
        output.push('\n');
        output.push_str(RULE);
        output
    }

    #[must_use]
    pub fn overfitting(report: &OverfittingReport) -> String {
        let mut output = String::new();
        banner(&mut output, "OVERFITTING CHECK");
        output.push_str(&format!("Model:                 {}\n", report.model_kind));
        output.push_str(&format!(
            "Periods:               {} in-sample / {} out-of-sample\n\n",
            report.in_sample_periods, report.out_of_sample_periods
        ));

        output.push_str("In-Sample\n");
        output.push_str(THIN);
        metrics(&mut output, &report.in_sample);
        output.push('\n');
        output.push_str("Out-of-Sample\n");
        output.push_str(THIN);
        metrics(&mut output, &report.out_of_sample);
        output.push('\n');

        let degradation = &report.degradation;
        output.push_str("Degradation\n");
        output.push_str(THIN);
        output.push_str(&format!(
            "Accuracy Ratio:        {:.4}\n",
            degradation.accuracy_ratio
        ));
        output.push_str(&format!(
            "Accuracy Drop:         {:+.2}%\n",
            degradation.accuracy_diff * 100.0
        ));
        output.push_str(&format!("Brier Change:          {:+.4}\n", degradation.brier_diff));
        output.push_str(&format!(
            "Risk:                  {:?}\n",
            degradation.overfitting_risk
        ));
        output.push_str(&format!(
            "Out-of-Sample p-value: {:.4} (Wilson 95% CI {:.2}%-{:.2}%)\n",
            report.significance.accuracy.p_value,
            report.significance.accuracy.wilson_ci_lower * 100.0,
            report.significance.accuracy.wilson_ci_upper * 100.0
        ));
        output.push('\n');
        output.push_str(RULE);
        output.push_str(if report.passed() {
            "PASSED: significant out-of-sample edge with acceptable degradation.\n"
        } else {
            "FAILED: no significant out-of-sample edge or degradation too high.\n"
        });
        output
    }

    #[must_use]
    pub fn retrain(report: &RetrainReport) -> String {
        let mut output = String::new();
        banner(&mut output, "ENSEMBLE WEIGHT RETRAIN");
        output.push_str(&format!(
            "Started:               {}\n\n",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        for (window, snapshot) in &report.published {
            output.push_str(&format!("{window} → v{}\n", snapshot.version));
            for (model, weight) in &snapshot.weights {
                output.push_str(&format!("  {model:<18} {:>6.2}%\n", weight * 100.0));
            }
        }
        for (window, reason) in &report.skipped {
            output.push_str(&format!("{window} kept: {reason}\n"));
        }
        output.push('\n');
        output.push_str(RULE);
        output
    }
}

fn banner(output: &mut String, title: &str) {
    output.push('\n');
    output.push_str(RULE);
    output.push_str(&format!("{title:^63}\n"));
    output.push_str(RULE);
    output.push('\n');
}

fn metrics(output: &mut String, metrics: &BacktestMetrics) {
    output.push_str(&format!("Predictions:           {}\n", metrics.total));
    if metrics.total == 0 {
        output.push_str("Accuracy:              N/A (no predictions)\n");
        return;
    }
    output.push_str(&format!(
        "Accuracy:              {:.2}% ({}/{})\n",
        metrics.accuracy * 100.0,
        metrics.correct,
        metrics.total
    ));
    output.push_str(&format!("Brier Score:           {:.4}\n", metrics.brier_score));
    output.push_str(&format!("Log Loss:              {:.4}\n", metrics.log_loss));
    output.push_str(&format!(
        "Calibration Error:     {:.4}\n",
        metrics.expected_calibration_error
    ));
    output.push_str(&format!(
        "Avg Confidence:        {:.2}%\n",
        metrics.avg_confidence * 100.0
    ));

    let financial = &metrics.financial;
    output.push_str(&format!(
        "Bankroll:              {:.2} → {:.2} over {} bets\n",
        financial.starting_bankroll, financial.final_bankroll, financial.bets_placed
    ));
    if financial.bets_placed > 0 {
        output.push_str(&format!(
            "Net Profit:            {:.2} (ROI {:.2}%)\n",
            financial.net_profit,
            financial.roi * 100.0
        ));
        output.push_str(&format!("Sharpe Ratio:          {:.4}\n", financial.sharpe_ratio));
        output.push_str(&format!(
            "Max Drawdown:          {:.2}%\n",
            financial.max_drawdown * 100.0
        ));
        output.push_str(&format!("Peak Bankroll:         {:.2}\n", financial.peak_bankroll));
    }
}
