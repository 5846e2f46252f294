//! Prediction CLI command

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::Value;
use std::collections::HashMap;
use tabled::Tabled;

use crate::client::{ApiClient, PredictRequest, PredictResponse};
use crate::output::{color_category, color_probability, print_info, print_warning, OutputFormat};

/// Row for the base model breakdown table
#[derive(Tabled)]
struct BaseRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Log days")]
    log_days: String,
    #[tabled(rename = "Days")]
    days: String,
}

/// Row for the contributing factors table
#[derive(Tabled)]
struct FactorRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Importance")]
    importance: String,
    #[tabled(rename = "Impact")]
    impact: String,
}

/// Parse a `key=value` feature argument. Values that parse as JSON keep
/// their type, anything else is taken as a string.
fn parse_feature(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("invalid feature '{}', expected key=value", raw);
    };
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

/// Collect features from an optional JSON file plus inline overrides
fn collect_features(
    features: &[String],
    features_file: Option<&str>,
) -> Result<HashMap<String, Value>> {
    let mut collected: HashMap<String, Value> = match features_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read features file {}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Features file {} is not a JSON object", path))?
        }
        None => HashMap::new(),
    };

    for raw in features {
        let (key, value) = parse_feature(raw)?;
        collected.insert(key, value);
    }

    Ok(collected)
}

/// Request a prediction and render the result
pub async fn run(
    client: &ApiClient,
    app_name: &str,
    features: Vec<String>,
    features_file: Option<String>,
    model: Option<String>,
    compare: bool,
    format: OutputFormat,
) -> Result<()> {
    let request = PredictRequest {
        app_name: app_name.to_string(),
        features: collect_features(&features, features_file.as_deref())?,
        model_name: model,
        compare_competitors: compare,
    };

    let response: PredictResponse = client.post("api/v1/predict", &request).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
        }
        OutputFormat::Table => print_prediction(&response),
    }

    Ok(())
}

fn print_prediction(response: &PredictResponse) {
    let result = &response.prediction;

    println!("{}", "Longevity Prediction".bold());
    println!("{}", "=".repeat(60));
    println!("App:   {}", result.app_name.cyan());
    println!("Model: {}", result.model_used.cyan());
    println!();
    println!(
        "Predicted lifespan: {} ({:.1} months, {:.2} years)",
        format!("{:.0} days", result.predicted_longevity_days).bold(),
        result.predicted_longevity_months,
        result.predicted_longevity_years,
    );
    println!(
        "Category: {}   Success probability: {}",
        color_category(&result.interpretation.category),
        color_probability(&result.interpretation.success_probability),
    );
    println!(
        "Expected lifespan: {}",
        result.interpretation.expected_lifespan
    );
    println!("{}", result.interpretation.description);

    if !result.warnings.is_empty() {
        println!();
        for warning in &result.warnings {
            print_warning(warning);
        }
    }

    if let Some(bases) = &result.base_predictions {
        let rows: Vec<BaseRow> = bases
            .iter()
            .map(|b| BaseRow {
                role: b.role.clone(),
                model: b.model.clone(),
                log_days: format!("{:.4}", b.log_days),
                days: format!("{:.0}", b.days),
            })
            .collect();

        println!();
        println!("{}", "Base model breakdown".bold());
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        println!("{}", table);
    }

    if let Some(factors) = &result.contributing_factors {
        let rows: Vec<FactorRow> = factors
            .iter()
            .map(|f| FactorRow {
                feature: f.feature.clone(),
                value: f.value.to_string(),
                importance: format!("{:.4}", f.importance),
                impact: f.impact.clone(),
            })
            .collect();

        println!();
        println!("{}", "Contributing factors".bold());
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        println!("{}", table);
    }

    if !result.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations".bold());
        for rec in &result.recommendations {
            println!("  {} {}: {}", "•".blue(), rec.area.bold(), rec.issue);
            println!("    {}", rec.recommendation);
        }
    }

    if let Some(id) = response.saved_id {
        println!();
        print_info(&format!("Saved to history with id {}", id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_feature_keeps_json_types() {
        let (key, value) = parse_feature("rating=4.5").unwrap();
        assert_eq!(key, "rating");
        assert_eq!(value, Value::from(4.5));

        let (_, value) = parse_feature("is_free=true").unwrap();
        assert_eq!(value, Value::Bool(true));

        let (_, value) = parse_feature("category=Education").unwrap();
        assert_eq!(value, Value::String("Education".to_string()));
    }

    #[test]
    fn test_parse_feature_rejects_missing_equals() {
        let err = parse_feature("rating").unwrap_err();
        assert!(err.to_string().contains("key=value"));
    }

    #[test]
    fn test_collect_features_inline_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rating": 3.0, "size_mb": 25}}"#).unwrap();

        let features = vec!["rating=4.5".to_string()];
        let collected =
            collect_features(&features, Some(file.path().to_str().unwrap())).unwrap();

        assert_eq!(collected["rating"], Value::from(4.5));
        assert_eq!(collected["size_mb"], Value::from(25));
    }
}
