pub mod api;
pub mod config;
pub mod dataset;
pub mod db;
pub mod decision;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod report;

pub use config::{Config, EngineMode};
pub use db::{init_db, Repository};
pub use decision::{Decision, DecisionRegistry, DecisionSource};
pub use domain::{Action, AssetId, Dataset, Decimal, PriceSeries, Regime, Side, TimeMs};
pub use engine::{Comparison, GateConfig, GateMode, Policy, Runner, RunnerConfig, ScenarioResult};
pub use error::AppError;
pub use orchestration::{CorpusReport, Orchestrator, ScenarioPlan};
