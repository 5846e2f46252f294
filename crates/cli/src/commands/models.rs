//! Model listing CLI command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ModelList};
use crate::output::{print_warning, OutputFormat};

/// Row for models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "R2")]
    r2: String,
    #[tabled(rename = "Default")]
    default: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// List the models the server can serve
pub async fn run(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: ModelList = client.get("api/v1/models").await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if result.models.is_empty() {
                print_warning("No models found");
                return Ok(());
            }

            let rows: Vec<ModelRow> = result
                .models
                .iter()
                .map(|m| ModelRow {
                    name: m.name.clone(),
                    role: m.role.clone().unwrap_or_default(),
                    rmse: m
                        .validation_metrics
                        .as_ref()
                        .and_then(|v| v.test_rmse)
                        .map(|v| format!("{:.4}", v))
                        .unwrap_or_default(),
                    r2: m
                        .validation_metrics
                        .as_ref()
                        .and_then(|v| v.test_r2)
                        .map(|v| format!("{:.4}", v))
                        .unwrap_or_default(),
                    default: if m.is_default {
                        "✓".to_string()
                    } else {
                        "".to_string()
                    },
                    description: m.description.clone().unwrap_or_default(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
