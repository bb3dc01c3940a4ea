//! Decision sources: the opaque engines the shield sits in front of.

use crate::domain::{Action, AssetId, Decimal, Regime};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub mod momentum;
pub mod registry;
pub mod remote;
pub mod rsi;

pub use momentum::MomentumSource;
pub use registry::{DecisionRegistry, RegistryError};
pub use remote::RemoteSource;
pub use rsi::RsiSource;

/// What a source proposes for one asset at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// In [0, 1].
    pub confidence: f64,
    pub regime: Regime,
    /// In [0, 1].
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub reason: String,
}

impl Decision {
    /// Neutral decision used when no source could answer.
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            regime: Regime::Sideways,
            risk_score: 0.0,
            reason: reason.into(),
        }
    }
}

/// Capability interface for a decision engine.
///
/// Implementations may be non-deterministic in general; simulations that must
/// reproduce exactly use one of the deterministic built-ins.
#[async_trait]
pub trait DecisionSource: Send + Sync + fmt::Debug {
    /// Propose an action for `asset` given its trailing window (oldest first,
    /// current price last).
    async fn decide(
        &self,
        asset: &AssetId,
        prices: &[Decimal],
        volumes: Option<&[Decimal]>,
    ) -> Result<Decision, DecisionError>;
}

/// Error type for decision source calls.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionError {
    /// Connection failure or timeout
    NetworkError(String),
    /// Non-success HTTP status
    HttpError { status: u16, message: String },
    /// Body could not be parsed
    ParseError(String),
    /// Upstream asked us to slow down
    RateLimited,
    /// Response parsed but violates the contract
    InvalidDecision(String),
    /// Source cannot decide on this input
    Unavailable(String),
}

impl fmt::Display for DecisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DecisionError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DecisionError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DecisionError::RateLimited => write!(f, "Rate limited"),
            DecisionError::InvalidDecision(msg) => write!(f, "Invalid decision: {}", msg),
            DecisionError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
        }
    }
}

impl std::error::Error for DecisionError {}

/// Which path produced the decision the runner acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Live(Decision),
    Fallback { decision: Decision, reason: String },
}

impl DecisionOutcome {
    pub fn decision(&self) -> &Decision {
        match self {
            DecisionOutcome::Live(d) => d,
            DecisionOutcome::Fallback { decision, .. } => decision,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DecisionOutcome::Fallback { .. })
    }
}

/// Ask `primary`; on error ask `fallback`; if that fails too, hold.
///
/// Never returns an error: source failures must not abort a simulation.
pub async fn decide_with_fallback(
    primary: &dyn DecisionSource,
    fallback: &dyn DecisionSource,
    asset: &AssetId,
    prices: &[Decimal],
    volumes: Option<&[Decimal]>,
) -> DecisionOutcome {
    let primary_err = match primary.decide(asset, prices, volumes).await {
        Ok(decision) => return DecisionOutcome::Live(decision),
        Err(e) => e,
    };
    warn!("Decision source failed for {}: {}", asset, primary_err);

    let decision = match fallback.decide(asset, prices, volumes).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!("Fallback decision source failed for {}: {}", asset, e);
            Decision::hold(format!("no source available: {}", e))
        }
    };

    DecisionOutcome::Fallback {
        decision,
        reason: primary_err.to_string(),
    }
}
