//! Run statistics, option diagnostics and run artifacts

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use dsc_core::util::mean;

use crate::classifier::ClassifierKind;
use crate::config::ChainingConfig;
use crate::option::{ExecutionStats, OptionKind, SkillOption};

/// Per-episode histories of one training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub scores: Vec<f64>,
    pub durations: Vec<usize>,
    pub validation_scores: Vec<f64>,
    /// Trained option count at the end of each episode
    pub num_options_history: Vec<usize>,
    /// Executions per option name in each episode
    pub option_executions: Vec<BTreeMap<String, u64>>,
}

impl EpisodeStats {
    pub fn record_episode(
        &mut self,
        score: f64,
        duration: usize,
        num_options: usize,
        executions: BTreeMap<String, u64>,
    ) {
        self.scores.push(score);
        self.durations.push(duration);
        self.num_options_history.push(num_options);
        self.option_executions.push(executions);
    }

    pub fn num_episodes(&self) -> usize {
        self.scores.len()
    }

    /// Mean score over the last `n` episodes
    pub fn recent_mean_score(&self, n: usize) -> f64 {
        mean(&self.scores[self.scores.len().saturating_sub(n)..])
    }

    /// Mean duration over the last `n` episodes
    pub fn recent_mean_duration(&self, n: usize) -> f64 {
        let recent: Vec<f64> = self.durations[self.durations.len().saturating_sub(n)..]
            .iter()
            .map(|&d| d as f64)
            .collect();
        mean(&recent)
    }
}

/// Reward and value traces collected for one option
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionHistory {
    /// Undiscounted reward of every execution
    pub rewards: Vec<f64>,
    /// Mean critic value over a replay sample after every execution
    pub sampled_q: Vec<f64>,
}

/// Snapshot of one option for run artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDiagnostics {
    pub name: String,
    pub index: usize,
    pub kind: OptionKind,
    pub parent: Option<String>,
    pub trained: bool,
    pub num_goal_hits: usize,
    pub execution: ExecutionStats,
    pub classifier_kind: Option<ClassifierKind>,
    pub num_positive_samples: usize,
    pub num_negative_samples: usize,
    pub history: OptionHistory,
}

impl OptionDiagnostics {
    pub fn from_option(option: &SkillOption, history: Option<&OptionHistory>) -> Self {
        Self {
            name: option.name().to_string(),
            index: option.index(),
            kind: option.kind(),
            parent: option.parent_name().map(str::to_string),
            trained: option.is_trained(),
            num_goal_hits: option.num_goal_hits(),
            execution: option.stats().clone(),
            classifier_kind: option.classifier().map(|c| c.kind()),
            num_positive_samples: option.positive_examples().iter().map(Vec::len).sum(),
            num_negative_samples: option.negative_examples().len(),
            history: history.cloned().unwrap_or_default(),
        }
    }
}

/// Everything persisted for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunData {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub mdp: String,
    pub config: ChainingConfig,
    pub stats: EpisodeStats,
    pub options: Vec<OptionDiagnostics>,
}

impl RunData {
    pub fn new(
        mdp: impl Into<String>,
        config: ChainingConfig,
        stats: EpisodeStats,
        options: Vec<OptionDiagnostics>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            mdp: mdp.into(),
            config,
            stats,
            options,
        }
    }

    /// Write `run_<seed>/run_data.json` under `dir`, returning the file path
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let run_dir = dir.join(format!("run_{}", self.config.seed));
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

        let path = run_dir.join("run_data.json");
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run data")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Saved run {} to {}", self.run_id, path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse run data")
    }
}
