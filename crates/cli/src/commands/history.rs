//! Prediction history CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, DeleteResponse, HistoryStats, PredictionRecord};
use crate::output::{
    color_category, format_days, format_timestamp, print_success, print_warning, OutputFormat,
};

/// Row for the history table
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Predicted")]
    predicted: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Created")]
    created: String,
}

/// List saved predictions, newest first
pub async fn list(
    client: &ApiClient,
    offset: usize,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/predictions?offset={}&limit={}", offset, limit);
    let records: Vec<PredictionRecord> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&records)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No saved predictions");
                return Ok(());
            }

            let rows: Vec<HistoryRow> = records
                .iter()
                .map(|r| HistoryRow {
                    id: r.id,
                    app: r.app_name.clone(),
                    model: r.model_used.clone(),
                    predicted: format_days(r.predicted_longevity_days),
                    category: color_category(&r.result.interpretation.category),
                    created: format_timestamp(&r.created_at),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} predictions", records.len());
        }
    }

    Ok(())
}

/// Show one saved prediction in full
pub async fn show(client: &ApiClient, id: u64, format: OutputFormat) -> Result<()> {
    let record: PredictionRecord = client.get(&format!("api/v1/predictions/{}", id)).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&record)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Saved Prediction".bold());
            println!("{}", "=".repeat(60));
            println!("ID:      {}", record.id);
            println!("App:     {}", record.app_name.cyan());
            println!("Model:   {}", record.model_used.cyan());
            println!("Created: {}", format_timestamp(&record.created_at));
            println!();
            println!(
                "Predicted lifespan: {} ({:.1} months, {:.2} years)",
                format_days(record.predicted_longevity_days).bold(),
                record.result.predicted_longevity_months,
                record.result.predicted_longevity_years,
            );
            println!(
                "Category: {}",
                color_category(&record.result.interpretation.category)
            );

            if !record.result.warnings.is_empty() {
                println!();
                for warning in &record.result.warnings {
                    print_warning(warning);
                }
            }
        }
    }

    Ok(())
}

/// Delete a saved prediction
pub async fn delete(client: &ApiClient, id: u64, format: OutputFormat) -> Result<()> {
    let response: DeleteResponse = client.delete(&format!("api/v1/predictions/{}", id)).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&format!("Deleted prediction {}", response.deleted));
        }
    }

    Ok(())
}

/// Show aggregate statistics for the caller's history
pub async fn stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: HistoryStats = client.get("api/v1/predictions/stats").await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&stats)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Prediction History Stats".bold());
            println!("{}", "=".repeat(60));
            println!("Total predictions: {}", stats.total);
            println!("Last 30 days:      {}", stats.last_30_days);
            match stats.average_days {
                Some(average) => println!("Average predicted: {}", format_days(average)),
                None => println!("Average predicted: n/a"),
            }
        }
    }

    Ok(())
}
