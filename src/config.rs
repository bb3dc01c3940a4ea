use crate::domain::Decimal;
use crate::engine::{ExecutionCostConfig, GateConfig, GateMode, HedgeConfig, RunnerConfig};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub engine_mode: EngineMode,
    pub engine_api_url: Option<String>,
    pub gate: GateConfig,
    pub runner: RunnerConfig,
    pub hedge: HedgeConfig,
}

/// Where decisions come from outside of explicitly named sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Deterministic built-in momentum engine.
    Mock,
    /// Remote engine at `ENGINE_API_URL`.
    Live,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", "8000", "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let engine_mode = match env_map
            .get("ENGINE_MODE")
            .map(|s| s.trim().to_ascii_uppercase())
            .as_deref()
            .unwrap_or("MOCK")
        {
            "MOCK" => EngineMode::Mock,
            "LIVE" => EngineMode::Live,
            other => {
                return Err(ConfigError::InvalidValue(
                    "ENGINE_MODE".to_string(),
                    format!("must be MOCK or LIVE, got {}", other),
                ))
            }
        };

        let engine_api_url = env_map.get("ENGINE_API_URL").cloned();
        if engine_mode == EngineMode::Live && engine_api_url.is_none() {
            return Err(ConfigError::MissingEnv("ENGINE_API_URL".to_string()));
        }

        Ok(Config {
            port,
            database_path,
            engine_mode,
            engine_api_url,
            gate: GateConfig::from_env_map(&env_map)?,
            runner: RunnerConfig::from_env_map(&env_map)?,
            hedge: HedgeConfig::from_env_map(&env_map)?,
        })
    }
}

impl GateConfig {
    /// Gate settings from env-style keys; absent keys take their defaults.
    pub fn from_env_map(env_map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let (mode_key, mode) = match env_map.get("CAPITAL_SHIELD_MODE") {
            Some(v) => ("CAPITAL_SHIELD_MODE", Some(v)),
            None => ("SHIELD_MODE", env_map.get("SHIELD_MODE")),
        };
        let mode = match mode {
            Some(v) => GateMode::from_str(v)
                .map_err(|e| ConfigError::InvalidValue(mode_key.to_string(), e))?,
            None => GateMode::Permissive,
        };

        let max_drawdown_threshold: f64 = parse_or(
            env_map,
            "MAX_DRAWDOWN_THRESHOLD",
            "-0.10",
            "must be a number",
        )?;
        if !(max_drawdown_threshold > -1.0 && max_drawdown_threshold < 0.0) {
            return Err(ConfigError::InvalidValue(
                "MAX_DRAWDOWN_THRESHOLD".to_string(),
                format!("must be within (-1, 0), got {}", max_drawdown_threshold),
            ));
        }

        let min_confidence = match env_map.get("MIN_SIGNAL_CONFIDENCE") {
            Some(raw) => {
                let value = raw.trim().parse::<f64>().ok().filter(|v| (0.0..=1.0).contains(v));
                Some(value.ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "MIN_SIGNAL_CONFIDENCE".to_string(),
                        format!("must be a number within [0, 1], got {}", raw),
                    )
                })?)
            }
            None => None,
        };

        Ok(GateConfig {
            mode,
            max_drawdown_threshold,
            block_bear_buys: parse_bool(env_map, "BLOCK_BEAR_BUYS", false)?,
            health_check_enabled: parse_bool(env_map, "HEALTH_CHECK_ENABLED", true)?,
            min_confidence,
        })
    }
}

impl RunnerConfig {
    pub fn from_env_map(env_map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = RunnerConfig::default();

        let initial_equity = parse_decimal(env_map, "INITIAL_EQUITY", "100000")?;
        if !initial_equity.is_positive() {
            return Err(ConfigError::InvalidValue(
                "INITIAL_EQUITY".to_string(),
                "must be positive".to_string(),
            ));
        }
        let max_position_fraction = parse_decimal(env_map, "MAX_POSITION_SIZE", "0.1")?;
        if !max_position_fraction.is_positive() || max_position_fraction > Decimal::one() {
            return Err(ConfigError::InvalidValue(
                "MAX_POSITION_SIZE".to_string(),
                "must be within (0, 1]".to_string(),
            ));
        }
        let leverage = parse_decimal(env_map, "LEVERAGE", "1")?;
        if !leverage.is_positive() {
            return Err(ConfigError::InvalidValue(
                "LEVERAGE".to_string(),
                "must be positive".to_string(),
            ));
        }

        let lookback: usize =
            parse_or(env_map, "LOOKBACK_PERIODS", "100", "must be a valid usize")?;
        if lookback < defaults.min_history {
            return Err(ConfigError::InvalidValue(
                "LOOKBACK_PERIODS".to_string(),
                format!("must be at least {}", defaults.min_history),
            ));
        }

        let execution = ExecutionCostConfig {
            enabled: parse_bool(env_map, "EXEC_COST_ENABLED", false)?,
            model: parse_or(
                env_map,
                "SLIPPAGE_MODEL",
                "fixed_bps",
                "must be fixed_bps or vol_scaled",
            )?,
            fixed_bps: parse_decimal(env_map, "FIXED_SLIPPAGE_BPS", "5")?,
            base_bps: parse_decimal(env_map, "BASE_SLIPPAGE_BPS", "3")?,
            latency_ms: parse_or(env_map, "LATENCY_MS", "50", "must be a valid u64")?,
        };

        Ok(RunnerConfig {
            initial_equity,
            max_position_fraction,
            leverage,
            lookback,
            execution,
            ..defaults
        })
    }
}

impl HedgeConfig {
    pub fn from_env_map(env_map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let drawdown_threshold: f64 =
            parse_or(env_map, "HEDGE_DRAWDOWN_THRESHOLD", "0.10", "must be a number")?;
        if !(drawdown_threshold > 0.0 && drawdown_threshold < 1.0) {
            return Err(ConfigError::InvalidValue(
                "HEDGE_DRAWDOWN_THRESHOLD".to_string(),
                format!("must be within (0, 1), got {}", drawdown_threshold),
            ));
        }
        let reduction = parse_decimal(env_map, "HEDGE_REDUCTION", "0.5")?;
        if !reduction.is_positive() || reduction > Decimal::one() {
            return Err(ConfigError::InvalidValue(
                "HEDGE_REDUCTION".to_string(),
                "must be within (0, 1]".to_string(),
            ));
        }

        Ok(HedgeConfig {
            drawdown_threshold,
            reduction,
            hold_ticks: parse_or(env_map, "HEDGE_TICKS", "20", "must be a valid usize")?,
        })
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string()))
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    parse_or(env_map, key, default, "must be a decimal number")
}

fn parse_bool(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be true or false, got {}", v),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SlippageModel;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.engine_mode, EngineMode::Mock);
        assert_eq!(config.gate, GateConfig::default());
        assert_eq!(config.runner, RunnerConfig::default());
        assert_eq!(config.hedge, HedgeConfig::default());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_live_mode_requires_engine_url() {
        let mut env_map = setup_required_env();
        env_map.insert("ENGINE_MODE".to_string(), "live".to_string());
        match Config::from_env_map(env_map.clone()) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "ENGINE_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }

        env_map.insert(
            "ENGINE_API_URL".to_string(),
            "http://localhost:9000".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.engine_mode, EngineMode::Live);
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_shield_mode() {
        let mut env_map = setup_required_env();
        env_map.insert("CAPITAL_SHIELD_MODE".to_string(), "paranoid".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CAPITAL_SHIELD_MODE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_gate_from_env_map() {
        let mut env_map = HashMap::new();
        env_map.insert("SHIELD_MODE".to_string(), "strict".to_string());
        env_map.insert("MAX_DRAWDOWN_THRESHOLD".to_string(), "-0.05".to_string());
        env_map.insert("BLOCK_BEAR_BUYS".to_string(), "true".to_string());
        env_map.insert("MIN_SIGNAL_CONFIDENCE".to_string(), "0.7".to_string());

        let gate = GateConfig::from_env_map(&env_map).unwrap();
        assert_eq!(gate.mode, GateMode::Strict);
        assert_eq!(gate.max_drawdown_threshold, -0.05);
        assert!(gate.block_bear_buys);
        assert!(gate.health_check_enabled);
        assert_eq!(gate.min_confidence, Some(0.7));
    }

    #[test]
    fn test_drawdown_threshold_must_be_negative() {
        for bad in ["0.1", "0", "-1", "abc"] {
            let mut env_map = HashMap::new();
            env_map.insert("MAX_DRAWDOWN_THRESHOLD".to_string(), bad.to_string());
            match GateConfig::from_env_map(&env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MAX_DRAWDOWN_THRESHOLD"),
                _ => panic!("Expected InvalidValue error for {}", bad),
            }
        }
    }

    #[test]
    fn test_invalid_confidence_floor() {
        let mut env_map = HashMap::new();
        env_map.insert("MIN_SIGNAL_CONFIDENCE".to_string(), "1.5".to_string());
        match GateConfig::from_env_map(&env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MIN_SIGNAL_CONFIDENCE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_execution_cost_keys() {
        let mut env_map = setup_required_env();
        env_map.insert("EXEC_COST_ENABLED".to_string(), "1".to_string());
        env_map.insert("SLIPPAGE_MODEL".to_string(), "vol_scaled".to_string());
        env_map.insert("LATENCY_MS".to_string(), "5".to_string());

        let config = Config::from_env_map(env_map).unwrap();
        assert!(config.runner.execution.enabled);
        assert_eq!(config.runner.execution.model, SlippageModel::VolScaled);
        assert_eq!(config.runner.execution.latency_ms, 5);
    }

    #[test]
    fn test_invalid_bool() {
        let mut env_map = setup_required_env();
        env_map.insert("BLOCK_BEAR_BUYS".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "BLOCK_BEAR_BUYS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_hedge_keys() {
        let mut env_map = HashMap::new();
        env_map.insert("HEDGE_TICKS".to_string(), "5".to_string());
        env_map.insert("HEDGE_REDUCTION".to_string(), "0.25".to_string());
        let hedge = HedgeConfig::from_env_map(&env_map).unwrap();
        assert_eq!(hedge.hold_ticks, 5);
        assert_eq!(hedge.reduction, Decimal::scaled(25, 2));

        env_map.insert("HEDGE_REDUCTION".to_string(), "2".to_string());
        assert!(HedgeConfig::from_env_map(&env_map).is_err());
    }
}
