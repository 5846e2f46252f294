//! API client for communicating with the prediction server

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the prediction server. Every request carries the caller
/// identity in the `x-user-id` header.
pub struct ApiClient {
    client: Client,
    base_url: Url,
    user: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, user: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            user: user.to_string(),
        })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .header("x-user-id", &self.user)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .header("x-user-id", &self.user)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .delete(url)
            .header("x-user-id", &self.user)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest {
    pub app_name: String,
    pub features: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub compare_competitors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: PredictionResult,
    pub saved_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub app_name: String,
    pub model_used: String,
    pub predicted_longevity_days: f64,
    pub predicted_longevity_months: f64,
    pub predicted_longevity_years: f64,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_predictions: Option<Vec<BasePrediction>>,
    pub interpretation: Interpretation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributing_factors: Option<Vec<ContributingFactor>>,
    pub recommendations: Vec<Recommendation>,
    pub analyzed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasePrediction {
    pub role: String,
    pub model: String,
    pub log_days: f64,
    pub days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interpretation {
    pub category: String,
    pub description: String,
    pub expected_lifespan: String,
    pub success_probability: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub feature: String,
    pub value: serde_json::Value,
    pub importance: f64,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub area: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelSummary>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_metrics: Option<ValidationMetrics>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub name: Option<String>,
    pub test_rmse: Option<f64>,
    pub test_r2: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: u64,
    pub user_id: String,
    pub app_name: String,
    pub model_used: String,
    pub predicted_longevity_days: f64,
    pub created_at: String,
    pub result: PredictionResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: u64,
    pub last_30_days: u64,
    pub average_days: Option<f64>,
}
