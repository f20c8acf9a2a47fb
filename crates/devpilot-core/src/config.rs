//! Engine configuration.
//!
//! ```yaml
//! defaultStepTimeoutMs: 300000
//! defaultRetryDelayMs: 1000
//! suggestionThreshold: 0.3
//! priorSummaryChars: 500
//! specialistDir: ./specialists
//! maxFinishedExecutions: 1000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::workflow::tracker::DEFAULT_MAX_FINISHED;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Per-attempt step timeout when a step does not set one
    pub default_step_timeout_ms: u64,
    /// Delay between local step retries when a step does not set one
    pub default_retry_delay_ms: u64,
    /// Suggestions scoring below this are discarded
    pub suggestion_threshold: f64,
    /// Max characters of a dependency's output passed to the next step
    pub prior_summary_chars: usize,
    /// Extra specialist YAML definitions
    pub specialist_dir: Option<String>,
    /// Finished runs kept in memory; older ones are evicted
    pub max_finished_executions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: 300_000,
            default_retry_delay_ms: 1_000,
            suggestion_threshold: 0.3,
            prior_summary_chars: 500,
            specialist_dir: None,
            max_finished_executions: DEFAULT_MAX_FINISHED,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse engine config: {}", e))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read engine config '{}': {}", path.display(), e))?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml("suggestionThreshold: 0.5\n").unwrap();
        assert_eq!(config.suggestion_threshold, 0.5);
        assert_eq!(config.default_step_timeout_ms, 300_000);
        assert_eq!(config.prior_summary_chars, 500);
        assert!(config.specialist_dir.is_none());
        assert_eq!(config.max_finished_executions, 1_000);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "defaultRetryDelayMs: 10\nspecialistDir: /tmp/specialists\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.default_retry_delay_ms, 10);
        assert_eq!(config.specialist_dir.as_deref(), Some("/tmp/specialists"));
    }
}
