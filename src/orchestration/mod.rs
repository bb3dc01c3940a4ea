//! Scenario orchestration: presets, scoped configuration, corpus runs and
//! synthetic stress tests.

pub mod orchestrator;
pub mod presets;
pub mod scope;
pub mod stress;

pub use orchestrator::{
    CorpusReport, DatasetReport, GateSpec, NamedGate, OrchestrationError, Orchestrator,
    ScenarioPlan,
};
pub use presets::{all_presets, gate_overrides, most_conservative, preset, PresetError};
pub use scope::{ConfigScope, ScopeGuard};
pub use stress::{
    bear_dataset, bear_regime_test, crash_dataset, crash_test, health_failure_test, StressCheck,
    StressReport,
};
