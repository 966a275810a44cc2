//! Utility functions for DSC
//!
//! Provides small statistics helpers and environment loading.

use std::path::{Path, PathBuf};

/// Arithmetic mean, 0.0 for an empty slice.
///
/// # Example
/// ```
/// use dsc_core::util::mean;
///
/// assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
/// assert_eq!(mean(&[]), 0.0);
/// ```
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance, 0.0 for an empty slice.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Sum of `gamma^k * r_k` over a reward sequence.
///
/// # Example
/// ```
/// use dsc_core::util::discounted_sum;
///
/// let total = discounted_sum([-1.0, -1.0, 0.0].into_iter(), 0.5);
/// assert_eq!(total, -1.5);
/// ```
pub fn discounted_sum(rewards: impl Iterator<Item = f64>, gamma: f64) -> f64 {
    let mut discount = 1.0;
    let mut total = 0.0;
    for reward in rewards {
        total += discount * reward;
        discount *= gamma;
    }
    total
}

/// Load environment variables from the DSC env file if not already set.
/// Searches standard locations in order:
/// 1. ./dsc.env
/// 2. User's config directory/dsc/dsc.env
/// 3. ~/.config/dsc/dsc.env
///
/// Returns the file that was read, if any.
pub fn load_env_file() -> Option<PathBuf> {
    let env_paths = [
        "dsc.env".to_string(),
        dirs::config_dir()
            .map(|p| p.join("dsc/dsc.env").to_string_lossy().to_string())
            .unwrap_or_default(),
        dirs::home_dir()
            .map(|p| p.join(".config/dsc/dsc.env").to_string_lossy().to_string())
            .unwrap_or_default(),
    ];

    for path in &env_paths {
        if path.is_empty() {
            continue;
        }
        if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path).ok()?;
            parse_env_file(&contents);
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Parse env file contents and set environment variables (only if not already set).
/// Supports formats:
/// - `KEY=value`
/// - `export KEY=value`
/// - `KEY="quoted value"`
/// - `KEY='single quoted'`
/// - Comments starting with #
pub fn parse_env_file(contents: &str) {
    for (key, value) in parse_env_pairs(contents) {
        if std::env::var(&key).is_err() {
            std::env::set_var(key, value);
        }
    }
}

fn parse_env_pairs(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            line.split_once('=').map(|(key, value)| {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                (key.trim().to_string(), value.to_string())
            })
        })
        .collect()
}
