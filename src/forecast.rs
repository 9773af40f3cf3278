//! Client for the external consumption predictor.
//!
//! Forecasting is not part of this service: an external model exposes a
//! single `GET /predict` endpoint returning the expected consumption for
//! the next period together with a confidence score and a coarse alert
//! level. This module only speaks that contract; no forecasting
//! algorithm lives here.
//!
//! The caller supplies a bounded timeout at construction. A timed-out
//! predictor surfaces as [`EngineError::DependencyTimeout`], which
//! callers treat as retryable.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default request timeout for the predictor.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Coarse risk classification attached to a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastAlertLevel {
    Normal,
    Warning,
    Critical,
}

/// A single consumption forecast from the external predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Expected consumption for the next period, in liters.
    pub predicted_consumption: f64,

    /// Model confidence in `0..=1`.
    pub confidence: f64,

    pub alert_level: ForecastAlertLevel,
}

/// HTTP client for the predictor service.
#[derive(Clone)]
pub struct PredictorClient {
    client: reqwest::Client,
    base_url: String,
}

impl PredictorClient {
    /// Create a client for the predictor at `base_url` with the default
    /// timeout.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building predictor HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the current consumption forecast.
    pub async fn predict(&self) -> Result<Prediction, EngineError> {
        let url = format!("{}/predict", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify(e, "consumption predictor"))?;

        let prediction = response
            .error_for_status()
            .map_err(|e| classify(e, "consumption predictor"))?
            .json::<Prediction>()
            .await
            .map_err(|e| classify(e, "consumption predictor"))?;

        Ok(prediction)
    }
}

fn classify(err: reqwest::Error, dependency: &str) -> EngineError {
    if err.is_timeout() {
        EngineError::DependencyTimeout(dependency.to_string())
    } else {
        EngineError::Dependency(err.into())
    }
}
