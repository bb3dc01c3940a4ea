//! HTTP client for an external (LIVE) decision engine.

use super::{Decision, DecisionError, DecisionSource};
use crate::domain::{Action, AssetId, Decimal, Regime};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Decision engine reached over HTTP at `{base_url}/v1/signal`.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

#[derive(Debug, Serialize)]
struct SignalRequest<'a> {
    asset: &'a str,
    price_history: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume_history: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct SignalResponse {
    signal: String,
    confidence: f64,
    regime: String,
    #[serde(default)]
    risk_score: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

impl RemoteSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_elapsed: Duration::from_secs(30),
        }
    }

    /// Bound the total time spent retrying one call.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn post_signal(&self, body: &SignalRequest<'_>) -> Result<SignalResponse, DecisionError> {
        let url = format!("{}/v1/signal", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    warn!("Decision engine request failed: {}", e);
                    backoff::Error::transient(DecisionError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DecisionError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DecisionError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DecisionError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<SignalResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(DecisionError::ParseError(e.to_string())))
        })
        .await
    }
}

fn parse_decision(resp: SignalResponse) -> Result<Decision, DecisionError> {
    let action = resp
        .signal
        .parse::<Action>()
        .map_err(|e| DecisionError::InvalidDecision(e.to_string()))?;
    let regime = resp
        .regime
        .parse::<Regime>()
        .map_err(|e| DecisionError::InvalidDecision(e.to_string()))?;
    if !(0.0..=1.0).contains(&resp.confidence) {
        return Err(DecisionError::InvalidDecision(format!(
            "confidence {} outside [0, 1]",
            resp.confidence
        )));
    }

    Ok(Decision {
        action,
        confidence: resp.confidence,
        regime,
        risk_score: resp.risk_score.unwrap_or(0.5).clamp(0.0, 1.0),
        reason: resp.reason.unwrap_or_default(),
    })
}

#[async_trait]
impl DecisionSource for RemoteSource {
    async fn decide(
        &self,
        asset: &AssetId,
        prices: &[Decimal],
        volumes: Option<&[Decimal]>,
    ) -> Result<Decision, DecisionError> {
        debug!(
            "Requesting decision for asset={}, window={}",
            asset,
            prices.len()
        );

        let body = SignalRequest {
            asset: asset.as_str(),
            price_history: prices.iter().map(Decimal::to_f64).collect(),
            volume_history: volumes.map(|v| v.iter().map(Decimal::to_f64).collect()),
        };

        let response = self.post_signal(&body).await?;
        parse_decision(response)
    }
}
