//! Inspect command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use dsc_rl::RunData;

#[derive(Args)]
pub struct InspectArgs {
    /// Path to a run_data.json file or the run directory containing it
    pub path: PathBuf,

    /// Episodes to average over
    #[arg(short, long, default_value_t = 100)]
    pub window: usize,

    /// Print the raw JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &InspectArgs) -> Result<()> {
    let path = if args.path.is_dir() {
        args.path.join("run_data.json")
    } else {
        args.path.clone()
    };
    let data = RunData::load(&path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    print!("{}", summarize(&data, args.window));
    Ok(())
}

fn summarize(data: &RunData, window: usize) -> String {
    let stats = &data.stats;
    let mut out = String::new();
    out.push_str(&format!("Run {}\n", data.run_id));
    out.push_str(&format!("  Created:   {}\n", data.created_at.to_rfc3339()));
    out.push_str(&format!("  MDP:       {}\n", data.mdp));
    out.push_str(&format!("  Seed:      {}\n", data.config.seed));
    out.push_str(&format!("  Episodes:  {}\n", stats.num_episodes()));
    out.push_str(&format!(
        "  Mean score (last {window}):  {:.2}\n",
        stats.recent_mean_score(window)
    ));
    out.push_str(&format!(
        "  Mean length (last {window}): {:.1}\n",
        stats.recent_mean_duration(window)
    ));
    if let Some(last) = stats.validation_scores.last() {
        out.push_str(&format!("  Last validation score: {last:.2}\n"));
    }

    out.push_str("  Options:\n");
    for option in &data.options {
        let rate = if option.execution.num_executions == 0 {
            0.0
        } else {
            option.execution.successful_executions as f64 / option.execution.num_executions as f64
        };
        out.push_str(&format!(
            "    [{}] {:<16} trained={:<5} hits={:<3} executions={:<6} success={:.2} positives={} negatives={}\n",
            option.index,
            option.name,
            option.trained,
            option.num_goal_hits,
            option.execution.num_executions,
            rate,
            option.num_positive_samples,
            option.num_negative_samples,
        ));
    }
    out
}
