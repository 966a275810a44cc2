//! Train command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use dsc_core::{Mdp, PointMassMdp};
use dsc_rl::SkillChaining;

use crate::settings::Config;

#[derive(Args)]
pub struct TrainArgs {
    /// Number of training episodes
    #[arg(short, long)]
    pub episodes: Option<u64>,

    /// Primitive steps per episode
    #[arg(short, long)]
    pub steps: Option<usize>,

    /// Random seed for the agent and the environment
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory for run artifacts
    #[arg(short, long)]
    pub log_dir: Option<PathBuf>,

    /// Use the dense distance-based reward
    #[arg(long)]
    pub dense: bool,
}

impl TrainArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(episodes) = self.episodes {
            config.run.episodes = episodes;
        }
        if let Some(steps) = self.steps {
            config.chaining.max_steps = steps;
        }
        if let Some(seed) = self.seed {
            config.chaining.seed = seed;
            config.environment.seed = seed;
        }
        if let Some(dir) = &self.log_dir {
            config.run.log_dir.clone_from(dir);
        }
        if self.dense {
            config.environment.dense_reward = true;
        }
    }
}

pub fn run(args: &TrainArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let mdp = PointMassMdp::new(config.environment.clone());
    info!(
        "Training on {} for {} episodes (seed {})",
        mdp.name(),
        config.run.episodes,
        config.chaining.seed
    );

    let mut dsc = SkillChaining::new(
        mdp,
        config.chaining.clone(),
        config.classifier.clone(),
        config.ddpg.clone(),
        config.dqn.clone(),
    )
    .context("Failed to create skill chaining agent")?;

    dsc.train(config.run.episodes)?;
    let path = dsc.save_run(&config.run.log_dir)?;

    let stats = dsc.stats();
    println!("Training complete");
    println!("  Episodes:        {}", stats.num_episodes());
    println!("  Mean score (100): {:.2}", stats.recent_mean_score(100));
    println!("  Mean length (100): {:.1}", stats.recent_mean_duration(100));
    println!("  Options:");
    for option in dsc.options() {
        let parent = option.parent_name().unwrap_or("-");
        println!(
            "    [{}] {:<16} {:<8} parent={:<16} goal_hits={}",
            option.index(),
            option.name(),
            option.kind().as_str(),
            parent,
            option.num_goal_hits()
        );
    }
    if let Some(frontier) = dsc.frontier() {
        println!(
            "  Untrained frontier: {} ({} hits)",
            frontier.name(),
            frontier.num_goal_hits()
        );
    }
    println!("  Artifacts: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_to_both_seeds() {
        let args = TrainArgs {
            episodes: Some(7),
            steps: Some(120),
            seed: Some(42),
            log_dir: Some(PathBuf::from("/tmp/dsc-runs")),
            dense: true,
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.run.episodes, 7);
        assert_eq!(config.chaining.max_steps, 120);
        assert_eq!(config.chaining.seed, 42);
        assert_eq!(config.environment.seed, 42);
        assert_eq!(config.run.log_dir, PathBuf::from("/tmp/dsc-runs"));
        assert!(config.environment.dense_reward);
    }

    #[test]
    fn test_short_run_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("dsc.toml");
        std::fs::write(&config_path, "[chaining]\nmax_steps = 20\nseed = 5\n").unwrap();

        let args = TrainArgs {
            episodes: Some(2),
            steps: None,
            seed: None,
            log_dir: Some(dir.path().join("runs")),
            dense: false,
        };
        run(&args, Some(&config_path)).unwrap();

        assert!(dir
            .path()
            .join("runs")
            .join("run_5")
            .join("run_data.json")
            .exists());
    }
}
