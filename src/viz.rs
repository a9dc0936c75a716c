//! Churn report: batch scoring summary and Plotters charts

use std::fmt::Display;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::{info, warn};

use crate::artifacts::ModelArtifact;
use crate::data::CustomerRecord;
use crate::error::{ChurnError, Result};
use crate::predict::Predictor;
use crate::schema::DECISION_THRESHOLD;

/// Number of histogram bins over [0, 1]
pub const HISTOGRAM_BINS: usize = 10;

const BAR_COLORS: [RGBColor; 2] = [BLUE, RED];

/// Outcome of scoring every record of a dataset
#[derive(Debug, Clone, Default)]
pub struct ScoreSummary {
    pub probabilities: Vec<f64>,
    /// Row index and reason for every record that could not be scored
    pub skipped: Vec<(usize, String)>,
}

impl ScoreSummary {
    pub fn churn_rate(&self) -> f64 {
        if self.probabilities.is_empty() {
            return 0.0;
        }
        let churners = self
            .probabilities
            .iter()
            .filter(|&&p| p >= DECISION_THRESHOLD)
            .count();
        churners as f64 / self.probabilities.len() as f64
    }
}

/// Score records, collecting the failures instead of stopping at the first one
pub fn score_records(predictor: &Predictor, records: &[CustomerRecord]) -> ScoreSummary {
    let mut summary = ScoreSummary::default();
    for (row, record) in records.iter().enumerate() {
        match predictor.predict(record) {
            Ok(prediction) => summary.probabilities.push(prediction.probability),
            Err(err) => {
                warn!(row, error = %err, "record skipped");
                summary.skipped.push((row, err.to_string()));
            }
        }
    }
    summary
}

/// Count probabilities into `bins` equal-width buckets over [0, 1].
/// A probability of exactly 1.0 lands in the last bucket.
pub fn probability_histogram(probabilities: &[f64], bins: usize) -> Vec<usize> {
    let mut counts = vec![0; bins];
    if bins == 0 {
        return counts;
    }
    for &p in probabilities {
        let idx = ((p.clamp(0.0, 1.0) * bins as f64) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}

/// Features ranked by absolute standardized weight, largest first
pub fn feature_importance(model: &ModelArtifact) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = model
        .feature_names
        .iter()
        .cloned()
        .zip(model.classifier.weights.iter().map(|w| w.abs()))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

fn render_err<E: Display>(err: E) -> ChurnError {
    ChurnError::Render(err.to_string())
}

/// Draw the churn probability histogram
pub fn create_probability_histogram(counts: &[usize], output_path: &Path) -> Result<()> {
    let max_count = counts.iter().copied().max().unwrap_or(1).max(1) as f64;
    let width = 1.0 / counts.len().max(1) as f64;

    let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Churn Probability Distribution", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..1f64, 0f64..(max_count * 1.1))
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("Churn Probability")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(counts.iter().enumerate().map(|(i, &count)| {
            let left = i as f64 * width;
            let color = if left >= 0.5 { &BAR_COLORS[1] } else { &BAR_COLORS[0] };
            Rectangle::new([(left, 0.0), (left + width * 0.9, count as f64)], color.filled())
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %output_path.display(), "probability histogram saved");
    Ok(())
}

/// Draw absolute standardized weights per feature
pub fn create_feature_importance_chart(
    importance: &[(String, f64)],
    output_path: &Path,
) -> Result<()> {
    let max_weight = importance
        .iter()
        .map(|(_, weight)| *weight)
        .fold(0.0, f64::max)
        .max(f64::EPSILON);
    let names: Vec<&str> = importance.iter().map(|(name, _)| name.as_str()).collect();

    let root = BitMapBackend::new(output_path, (900, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importance (|standardized weight|)", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(names.len() as f64 - 0.5), 0f64..(max_weight * 1.1))
        .map_err(render_err)?;

    let label_for = |x: &f64| {
        let idx = x.round();
        if idx >= 0.0 && (x - idx).abs() < 1e-6 {
            names.get(idx as usize).map(|name| name.to_string()).unwrap_or_default()
        } else {
            String::new()
        }
    };

    chart
        .configure_mesh()
        .x_labels(names.len())
        .x_label_formatter(&label_for)
        .y_desc("Weight")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(importance.iter().enumerate().map(|(i, (_, weight))| {
            let x = i as f64;
            Rectangle::new([(x - 0.4, 0.0), (x + 0.4, *weight)], BAR_COLORS[0].filled())
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %output_path.display(), "feature importance chart saved");
    Ok(())
}

/// Print the scoring summary and stored evaluation metrics to the console
pub fn print_report_statistics(summary: &ScoreSummary, predictor: &Predictor) {
    let model = predictor.artifacts().model();

    println!("\n=== Churn Report ===");
    println!("Model run: {}", predictor.version());
    println!("Trained at: {}", model.trained_at.to_rfc3339());
    println!(
        "Training rows: {}, evaluation rows: {}",
        model.train_rows, model.eval_rows
    );
    if let Some(metrics) = &model.metrics {
        println!(
            "Hold-out accuracy: {:.3}, precision: {:.3}, recall: {:.3}, log loss: {:.4}",
            metrics.accuracy, metrics.precision, metrics.recall, metrics.log_loss
        );
    }

    println!("\nCustomers scored: {}", summary.probabilities.len());
    println!("Customers skipped: {}", summary.skipped.len());
    for (row, reason) in summary.skipped.iter().take(10) {
        println!("  row {}: {}", row, reason);
    }
    println!("Predicted churn rate: {:.1}%", summary.churn_rate() * 100.0);

    println!("\nFeature importance:");
    for (name, weight) in feature_importance(model) {
        println!("  {:24} {:8.4}", name, weight);
    }
}

/// Score a dataset and write both charts next to `base_output_path`.
///
/// # Returns
/// * The scoring summary and the paths of the histogram and importance charts
pub fn generate_report(
    predictor: &Predictor,
    records: &[CustomerRecord],
    base_output_path: &Path,
) -> Result<(ScoreSummary, PathBuf, PathBuf)> {
    let summary = score_records(predictor, records);

    let histogram_path = base_output_path.to_path_buf();
    let counts = probability_histogram(&summary.probabilities, HISTOGRAM_BINS);
    create_probability_histogram(&counts, &histogram_path)?;

    let importance_path = importance_chart_path(base_output_path);
    create_feature_importance_chart(
        &feature_importance(predictor.artifacts().model()),
        &importance_path,
    )?;

    print_report_statistics(&summary, predictor);
    Ok((summary, histogram_path, importance_path))
}

/// `report.png` becomes `report_importance.png`
pub fn importance_chart_path(base: &Path) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    base.with_file_name(format!("{}_importance.png", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactPair, RunVersion, ScalerArtifact};
    use crate::encoder::ImputationMeans;
    use crate::model::{LogisticModel, StandardScaler};
    use crate::schema::{self, SCHEMA_VERSION};
    use chrono::Utc;
    use tempfile::tempdir;

    fn predictor() -> Predictor {
        let trained_at = Utc::now();
        let pair = ArtifactPair::new(
            ScalerArtifact {
                version: RunVersion::new("run-a"),
                schema_version: SCHEMA_VERSION.to_string(),
                feature_names: schema::feature_names(),
                impute_means: ImputationMeans::from_array([40.0, 20.0, 10.0]),
                scaler: StandardScaler {
                    mean: vec![40.0, 20.0, 10.0, 0.0, 0.0, 0.0],
                    scale: vec![10.0, 10.0, 10.0, 1.0, 1.0, 1.0],
                },
                trained_at,
            },
            ModelArtifact {
                version: RunVersion::new("run-a"),
                schema_version: SCHEMA_VERSION.to_string(),
                feature_names: schema::feature_names(),
                classifier: LogisticModel {
                    weights: vec![0.5, 2.0, -1.0, 0.1, -0.3, -3.0],
                    bias: 0.0,
                },
                train_rows: 10,
                eval_rows: 0,
                metrics: None,
                trained_at,
            },
        )
        .unwrap();
        Predictor::new(pair)
    }

    #[test]
    fn test_probability_histogram() {
        let counts = probability_histogram(&[0.0, 0.05, 0.15, 0.5, 0.99, 1.0], 10);
        assert_eq!(counts, vec![2, 1, 0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(counts.iter().sum::<usize>(), 6);
    }

    #[test]
    fn test_feature_importance_ranking() {
        let ranked = feature_importance(predictor().artifacts().model());
        assert_eq!(ranked.len(), 6);
        assert_eq!(ranked[0].0, "contract_type_Two year");
        assert_eq!(ranked[0].1, 3.0);
        assert_eq!(ranked[1].0, "days_since_payment");
        assert_eq!(ranked[5].0, "gender_Male");
    }

    #[test]
    fn test_score_records_collects_skips() {
        let records = vec![
            CustomerRecord {
                gender: Some("Male".to_string()),
                contract_type: Some("One year".to_string()),
                ..Default::default()
            },
            CustomerRecord {
                gender: Some("Robot".to_string()),
                contract_type: Some("One year".to_string()),
                ..Default::default()
            },
        ];

        let summary = score_records(&predictor(), &records);
        assert_eq!(summary.probabilities.len(), 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].0, 1);
    }

    fn scoring_records() -> Vec<CustomerRecord> {
        ["Month-to-month", "One year", "Two year"]
            .iter()
            .enumerate()
            .map(|(i, contract)| CustomerRecord {
                gender: Some(if i % 2 == 0 { "Male" } else { "Female" }.to_string()),
                contract_type: Some(contract.to_string()),
                avg_monthly_spend: Some(30.0 + 10.0 * i as f64),
                days_since_payment: Some(5 * i as u32),
                tenure: Some(2 + 6 * i as u32),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_create_probability_histogram() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("histogram.png");

        let counts = probability_histogram(&[0.1, 0.4, 0.45, 0.8], HISTOGRAM_BINS);
        let result = create_probability_histogram(&counts, &output_path);
        assert!(result.is_ok());
        assert!(output_path.exists());
    }

    #[test]
    fn test_create_feature_importance_chart() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("importance.png");

        let importance = feature_importance(predictor().artifacts().model());
        let result = create_feature_importance_chart(&importance, &output_path);
        assert!(result.is_ok());
        assert!(output_path.exists());
    }

    #[test]
    fn test_generate_report() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("report.png");

        let (summary, histogram, importance) =
            generate_report(&predictor(), &scoring_records(), &output_path).unwrap();
        assert_eq!(summary.probabilities.len(), 3);
        assert!(summary.skipped.is_empty());
        assert_eq!(histogram, output_path);
        assert!(histogram.exists());
        assert!(importance.exists());
        assert_eq!(importance, temp_dir.path().join("report_importance.png"));
    }

    #[test]
    fn test_generate_report_with_no_scorable_records() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("empty.png");

        let (summary, histogram, importance) =
            generate_report(&predictor(), &[], &output_path).unwrap();
        assert_eq!(summary.churn_rate(), 0.0);
        assert!(histogram.exists());
        assert!(importance.exists());
    }

    #[test]
    fn test_importance_chart_path() {
        assert_eq!(
            importance_chart_path(Path::new("out/report.png")),
            PathBuf::from("out/report_importance.png")
        );
    }
}
