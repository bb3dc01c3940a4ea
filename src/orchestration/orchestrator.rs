use super::presets::{all_presets, gate_overrides, most_conservative, preset, PresetError};
use super::scope::ConfigScope;
use crate::config::ConfigError;
use crate::dataset::{validate_for_fp_study, DatasetError};
use crate::decision::{DecisionRegistry, RegistryError};
use crate::domain::{Dataset, SeriesError};
use crate::engine::{
    compare, opportunity_cost, BlockClassifier, Comparison, FprSummary, GateConfig, HedgeRunner,
    OpportunityCost, OpportunityCostSummary, Policy, RsaError, Runner, ScenarioResult,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

/// A gate configuration to run: a named preset or an explicit one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateSpec {
    Preset(String),
    Custom { name: String, gate: GateConfig },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedGate {
    pub name: String,
    pub gate: GateConfig,
}

/// What to run against every dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPlan {
    /// Registry name of the decision source.
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_gates")]
    pub gates: Vec<GateSpec>,
    #[serde(default = "default_include_hedge")]
    pub include_hedge: bool,
}

fn default_source() -> String {
    "momentum".to_string()
}

fn default_include_hedge() -> bool {
    true
}

fn default_gates() -> Vec<GateSpec> {
    all_presets()
        .into_iter()
        .map(|(name, _)| GateSpec::Preset(name))
        .collect()
}

impl Default for ScenarioPlan {
    fn default() -> Self {
        Self {
            source: default_source(),
            gates: default_gates(),
            include_hedge: default_include_hedge(),
        }
    }
}

/// Every run on one dataset, with each treatment compared to the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub fingerprint: String,
    pub rows: usize,
    pub baseline: ScenarioResult,
    pub treatments: Vec<ScenarioResult>,
    #[serde(default)]
    pub hedge: Option<ScenarioResult>,
    pub comparisons: Vec<Comparison>,
    /// Each gated run against the hedge; empty without a hedge run.
    #[serde(default)]
    pub opportunity_costs: Vec<OpportunityCost>,
}

/// Results over a set of datasets with corpus-wide block classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusReport {
    pub source: String,
    pub configs: Vec<NamedGate>,
    pub most_conservative: Option<String>,
    pub datasets: Vec<DatasetReport>,
    pub fpr: FprSummary,
    /// Per configuration, averaged over datasets that ran the hedge.
    #[serde(default)]
    pub opportunity_cost: Vec<OpportunityCostSummary>,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: DecisionRegistry,
    scope: ConfigScope,
}

impl Orchestrator {
    pub fn new(registry: DecisionRegistry, scope: ConfigScope) -> Self {
        Self { registry, scope }
    }

    pub fn registry(&self) -> &DecisionRegistry {
        &self.registry
    }

    pub fn scope(&self) -> &ConfigScope {
        &self.scope
    }

    /// Resolve preset names and reject duplicate configuration names.
    pub fn resolve_gates(&self, plan: &ScenarioPlan) -> Result<Vec<NamedGate>, OrchestrationError> {
        let mut seen = BTreeSet::new();
        let mut gates = Vec::with_capacity(plan.gates.len());
        for spec in &plan.gates {
            let named = match spec {
                GateSpec::Preset(name) => NamedGate {
                    name: name.trim().to_ascii_lowercase(),
                    gate: preset(name)?,
                },
                GateSpec::Custom { name, gate } => NamedGate {
                    name: name.clone(),
                    gate: gate.clone(),
                },
            };
            if named.name.is_empty() || !seen.insert(named.name.clone()) {
                return Err(OrchestrationError::DuplicateConfig(named.name));
            }
            gates.push(named);
        }
        Ok(gates)
    }

    /// Baseline, one gated run per configuration, and the optional hedge.
    ///
    /// Works on a private copy of the scope, so concurrent calls never observe
    /// each other's overrides.
    pub async fn run_dataset(
        &self,
        plan: &ScenarioPlan,
        dataset: &Dataset,
    ) -> Result<DatasetReport, OrchestrationError> {
        let gates = self.resolve_gates(plan)?;
        let source = self.registry.require(&plan.source)?;
        let mut scope = self.scope.clone();

        let runner_config = scope.runner_config()?;
        let baseline = Runner::new(runner_config.clone(), Policy::Baseline, source.clone())
            .run(dataset)
            .await;

        let mut treatments = Vec::with_capacity(gates.len());
        for named in &gates {
            let guard = scope.apply(gate_overrides(&named.gate));
            let gate = guard.gate_config()?;
            let config = guard.runner_config()?;
            let policy = Policy::gated(named.name.clone(), gate);
            let result = Runner::new(config, policy, source.clone()).run(dataset).await;
            drop(guard);
            treatments.push(result);
        }

        let hedge = if plan.include_hedge {
            Some(HedgeRunner::new(runner_config, scope.hedge_config()?).run(dataset))
        } else {
            None
        };

        let comparisons = treatments
            .iter()
            .chain(hedge.iter())
            .map(|t| compare(&baseline, t))
            .collect::<Result<Vec<_>, _>>()?;
        let opportunity_costs = match &hedge {
            Some(h) => treatments
                .iter()
                .map(|t| opportunity_cost(&baseline, t, h))
                .collect(),
            None => Vec::new(),
        };

        Ok(DatasetReport {
            dataset: dataset.name().to_string(),
            fingerprint: dataset.fingerprint(),
            rows: dataset.row_count(),
            baseline,
            treatments,
            hedge,
            comparisons,
            opportunity_costs,
        })
    }

    /// Run the plan over each dataset in turn.
    pub async fn run_corpus(
        &self,
        plan: &ScenarioPlan,
        datasets: &[Dataset],
    ) -> Result<CorpusReport, OrchestrationError> {
        let gates = self.start_corpus(plan, datasets)?;
        let mut reports = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            reports.push(self.run_dataset(plan, dataset).await?);
        }
        Ok(self.finish_corpus(plan, gates, reports))
    }

    /// Like [`run_corpus`](Self::run_corpus) with the datasets in flight at once.
    pub async fn run_corpus_concurrent(
        &self,
        plan: &ScenarioPlan,
        datasets: &[Dataset],
    ) -> Result<CorpusReport, OrchestrationError> {
        let gates = self.start_corpus(plan, datasets)?;
        let reports = try_join_all(datasets.iter().map(|d| self.run_dataset(plan, d))).await?;
        Ok(self.finish_corpus(plan, gates, reports))
    }

    /// All presets over datasets long enough for false-positive analysis.
    pub async fn run_fp_study(
        &self,
        source: &str,
        datasets: &[Dataset],
    ) -> Result<CorpusReport, OrchestrationError> {
        for dataset in datasets {
            validate_for_fp_study(dataset)?;
        }
        let plan = ScenarioPlan {
            source: source.to_string(),
            gates: default_gates(),
            include_hedge: false,
        };
        self.run_corpus(&plan, datasets).await
    }

    fn start_corpus(
        &self,
        plan: &ScenarioPlan,
        datasets: &[Dataset],
    ) -> Result<Vec<NamedGate>, OrchestrationError> {
        if datasets.is_empty() {
            return Err(OrchestrationError::NoDatasets);
        }
        info!(
            "Running corpus: {} datasets, source {}, {} gate configs, hedge {}",
            datasets.len(),
            plan.source,
            plan.gates.len(),
            plan.include_hedge
        );
        self.resolve_gates(plan)
    }

    fn finish_corpus(
        &self,
        plan: &ScenarioPlan,
        configs: Vec<NamedGate>,
        mut datasets: Vec<DatasetReport>,
    ) -> CorpusReport {
        let pairs: Vec<(String, GateConfig)> = configs
            .iter()
            .map(|c| (c.name.clone(), c.gate.clone()))
            .collect();
        let most_conservative = most_conservative(&pairs).map(str::to_string);

        let classifier = BlockClassifier::new(most_conservative.clone());
        for report in datasets.iter_mut() {
            for treatment in report.treatments.iter_mut() {
                classifier.classify_all(&mut treatment.block_events);
            }
        }
        let fpr = FprSummary::from_events(
            datasets
                .iter()
                .flat_map(|r| r.treatments.iter())
                .flat_map(|t| t.block_events.iter()),
        );

        let opportunity_cost = configs
            .iter()
            .filter_map(|c| {
                OpportunityCostSummary::aggregate(
                    &c.name,
                    datasets.iter().flat_map(|r| r.opportunity_costs.iter()),
                )
            })
            .collect();

        info!(
            "Corpus finished: {} blocks classified, global FPR {:?}",
            fpr.global.total_blocks, fpr.global.fpr
        );
        CorpusReport {
            source: plan.source.clone(),
            configs,
            most_conservative,
            datasets,
            fpr,
            opportunity_cost,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Preset(#[from] PresetError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Rsa(#[from] RsaError),
    #[error("duplicate or empty configuration name: {0:?}")]
    DuplicateConfig(String),
    #[error("no datasets supplied")]
    NoDatasets,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, Decimal, PriceSeries, TimeMs};
    use crate::engine::{GateMode, PolicyKind};

    fn dataset(name: &str, n: usize) -> Dataset {
        let closes: Vec<Decimal> = (0..n)
            .map(|i| Decimal::from(100 + (i as i64 % 7) * 3 - (i as i64 / 10)))
            .collect();
        let series =
            PriceSeries::from_closes(AssetId::from("BTC"), TimeMs::new(0), 60_000, &closes).unwrap();
        Dataset::single(name, series)
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(DecisionRegistry::with_builtins(), ConfigScope::new())
    }

    #[test]
    fn test_plan_defaults_from_json() {
        let plan: ScenarioPlan = serde_json::from_str("{}").unwrap();
        assert_eq!(plan.source, "momentum");
        assert_eq!(plan, ScenarioPlan::default());

        let plan: ScenarioPlan = serde_json::from_str(
            r#"{"gates":["balanced",{"name":"tight","gate":{"mode":"STRICT","max_drawdown_threshold":-0.02,"block_bear_buys":true,"health_check_enabled":true}}]}"#,
        )
        .unwrap();
        assert_eq!(plan.gates[0], GateSpec::Preset("balanced".to_string()));
        assert!(matches!(&plan.gates[1], GateSpec::Custom { name, .. } if name == "tight"));
    }

    #[test]
    fn test_resolve_rejects_unknown_and_duplicates() {
        let o = orchestrator();
        let plan = ScenarioPlan {
            gates: vec![GateSpec::Preset("nope".to_string())],
            ..Default::default()
        };
        assert!(matches!(
            o.resolve_gates(&plan),
            Err(OrchestrationError::Preset(PresetError::Unknown(_)))
        ));

        let plan = ScenarioPlan {
            gates: vec![
                GateSpec::Preset("Balanced".to_string()),
                GateSpec::Preset("balanced".to_string()),
            ],
            ..Default::default()
        };
        assert!(matches!(
            o.resolve_gates(&plan),
            Err(OrchestrationError::DuplicateConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_run_dataset_shape() {
        let o = orchestrator();
        let report = o
            .run_dataset(&ScenarioPlan::default(), &dataset("wobble", 60))
            .await
            .unwrap();

        assert_eq!(report.baseline.policy, PolicyKind::Baseline);
        let ids: Vec<&str> = report
            .treatments
            .iter()
            .map(|t| t.scenario_id.as_str())
            .collect();
        assert_eq!(ids, vec!["conservative", "balanced", "aggressive"]);
        assert!(report.hedge.is_some());
        assert_eq!(report.comparisons.len(), 4);
        assert_eq!(report.rows, 60);
    }

    #[tokio::test]
    async fn test_scope_untouched_after_runs() {
        let mut scope = ConfigScope::new();
        scope.set("CAPITAL_SHIELD_MODE", "PERMISSIVE");
        let o = Orchestrator::new(DecisionRegistry::with_builtins(), scope.clone());
        o.run_dataset(&ScenarioPlan::default(), &dataset("wobble", 30))
            .await
            .unwrap();
        assert_eq!(o.scope(), &scope);
        assert_eq!(o.scope().gate_config().unwrap().mode, GateMode::Permissive);
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let plan = ScenarioPlan {
            source: "oracle".to_string(),
            ..Default::default()
        };
        let err = orchestrator()
            .run_dataset(&plan, &dataset("wobble", 20))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Registry(_)));
    }

    #[tokio::test]
    async fn test_invalid_scope_config_fails_fast() {
        let mut scope = ConfigScope::new();
        scope.set("LEVERAGE", "-2");
        let o = Orchestrator::new(DecisionRegistry::with_builtins(), scope);
        let err = o
            .run_dataset(&ScenarioPlan::default(), &dataset("wobble", 20))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let o = orchestrator();
        let datasets = vec![dataset("a", 40), dataset("b", 55)];
        let plan = ScenarioPlan::default();

        let sequential = o.run_corpus(&plan, &datasets).await.unwrap();
        let concurrent = o.run_corpus_concurrent(&plan, &datasets).await.unwrap();
        assert_eq!(sequential, concurrent);
        assert_eq!(sequential.most_conservative.as_deref(), Some("conservative"));
    }

    #[tokio::test]
    async fn test_opportunity_cost_against_hedge() {
        let o = orchestrator();
        let datasets = vec![dataset("a", 40), dataset("b", 55)];
        let report = o
            .run_corpus(&ScenarioPlan::default(), &datasets)
            .await
            .unwrap();

        for d in &report.datasets {
            let hedge = d.hedge.as_ref().unwrap();
            assert_eq!(d.opportunity_costs.len(), d.treatments.len());
            for (cost, shield) in d.opportunity_costs.iter().zip(&d.treatments) {
                assert_eq!(cost.config_id, shield.scenario_id);
                let gap = shield.metrics.pnl_percent - hedge.metrics.pnl_percent;
                assert!((cost.shield_vs_hedge - gap).abs() < 1e-9);
            }
        }

        let ids: Vec<&str> = report
            .opportunity_cost
            .iter()
            .map(|s| s.config_id.as_str())
            .collect();
        assert_eq!(ids, vec!["conservative", "balanced", "aggressive"]);
        for summary in &report.opportunity_cost {
            assert_eq!(summary.datasets, 2);
            let sum = summary.shield_vs_hedge + summary.hedge_vs_baseline;
            assert!((sum - summary.shield_vs_baseline).abs() < 1e-9);
        }

        let no_hedge = ScenarioPlan {
            include_hedge: false,
            ..Default::default()
        };
        let report = o.run_corpus(&no_hedge, &datasets).await.unwrap();
        assert!(report.datasets[0].opportunity_costs.is_empty());
        assert!(report.opportunity_cost.is_empty());
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let err = orchestrator()
            .run_corpus(&ScenarioPlan::default(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::NoDatasets));
    }

    #[tokio::test]
    async fn test_fp_study_requires_long_datasets() {
        let err = orchestrator()
            .run_fp_study("momentum", &[dataset("short", 50)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Dataset(DatasetError::TooFewRows { .. })
        ));
    }

    #[tokio::test]
    async fn test_fp_study_classifies_every_block() {
        let report = orchestrator()
            .run_fp_study("momentum", &[dataset("long", 240)])
            .await
            .unwrap();
        for treatment in &report.datasets[0].treatments {
            assert!(treatment
                .block_events
                .iter()
                .all(|e| e.classification.is_some()));
        }
        let total: usize = report
            .datasets
            .iter()
            .flat_map(|d| d.treatments.iter())
            .map(|t| t.blocked_count())
            .sum();
        let g = &report.fpr.global;
        assert_eq!(g.false_positives + g.true_positives + g.not_applicable, total);
    }
}
