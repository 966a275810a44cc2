//! Skill chaining controller - drives episodes and grows the option chain
//!
//! The controller owns every option. Trained options live in a list whose
//! positions are the actions of the policy over options (the root is always
//! at position 0). A single untrained frontier option collects trajectories
//! that reach its termination region; once trained it is promoted, the
//! policy over options is grown by one action, and a new frontier is spawned
//! behind it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use dsc_core::util::discounted_sum;
use dsc_core::{DscError, Mdp, Result, State, Transition};

use crate::config::{ChainingConfig, ClassifierConfig, DdpgConfig, DqnConfig};
use crate::option::{OptionKind, SkillOption};
use crate::policy::{ContinuousPolicy, Ddpg, OptionValueNetwork};
use crate::stats::{EpisodeStats, OptionDiagnostics, OptionHistory, RunData};

/// Replay sample size for the per-execution critic diagnostic
const Q_SAMPLE_SIZE: usize = 500;

/// Episodes between progress lines
const LOG_INTERVAL: u64 = 10;

/// Top-level driver of the chaining protocol
pub struct SkillChaining<M: Mdp> {
    mdp: M,
    config: ChainingConfig,
    classifier_config: ClassifierConfig,
    ddpg_config: DdpgConfig,
    options: Vec<SkillOption>,
    frontier: Option<SkillOption>,
    policy_over_options: OptionValueNetwork,
    init_states: Vec<State>,
    stats: EpisodeStats,
    option_history: BTreeMap<String, OptionHistory>,
    episode: u64,
}

impl<M: Mdp> SkillChaining<M> {
    pub fn new(
        mdp: M,
        config: ChainingConfig,
        classifier_config: ClassifierConfig,
        ddpg_config: DdpgConfig,
        dqn_config: DqnConfig,
    ) -> Result<Self> {
        config.validate()?;
        classifier_config.validate()?;

        let policy_over_options =
            OptionValueNetwork::new(mdp.state_space_size(), 1, dqn_config, config.seed);

        let mut chaining = Self {
            mdp,
            config,
            classifier_config,
            ddpg_config,
            options: Vec::new(),
            frontier: None,
            policy_over_options,
            init_states: Vec::new(),
            stats: EpisodeStats::default(),
            option_history: BTreeMap::new(),
            episode: 0,
        };

        let root_solver = chaining.make_solver("global_option", 0);
        let root = SkillOption::root(
            chaining.config.clone(),
            chaining.classifier_config.clone(),
            root_solver,
        );
        chaining.options.push(root);

        if chaining.config.max_num_options > 0 {
            let goal_solver = chaining.make_solver("goal_option", 1);
            chaining.frontier = Some(SkillOption::goal(
                chaining.config.clone(),
                chaining.classifier_config.clone(),
                goal_solver,
            ));
        }

        info!(
            "Skill chaining on {} (max {} options, {} hits per option)",
            chaining.mdp.name(),
            chaining.config.max_num_options,
            chaining.config.num_subgoal_hits_required
        );
        Ok(chaining)
    }

    fn make_solver(&self, option_name: &str, index: usize) -> Box<dyn ContinuousPolicy> {
        Box::new(Ddpg::new(
            format!("{option_name}_ddpg_agent"),
            self.mdp.state_space_size(),
            self.mdp.action_space_size(),
            self.mdp.action_space_bound(),
            self.ddpg_config.clone(),
            self.config.seed.wrapping_add(index as u64),
        ))
    }

    pub fn mdp(&self) -> &M {
        &self.mdp
    }

    pub fn mdp_mut(&mut self) -> &mut M {
        &mut self.mdp
    }

    pub fn config(&self) -> &ChainingConfig {
        &self.config
    }

    /// Trained options; positions are policy-over-options actions
    pub fn options(&self) -> &[SkillOption] {
        &self.options
    }

    pub fn frontier(&self) -> Option<&SkillOption> {
        self.frontier.as_ref()
    }

    /// The current policy over options (replaced whenever an option is added)
    pub fn policy_over_options(&self) -> &OptionValueNetwork {
        &self.policy_over_options
    }

    pub fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    pub fn option_history(&self, name: &str) -> Option<&OptionHistory> {
        self.option_history.get(name)
    }

    pub fn init_states(&self) -> &[State] {
        &self.init_states
    }

    /// Number of episodes run so far
    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// Options that may be selected from `state`: the root always, others
    /// when their initiation holds and their termination does not
    fn option_mask(&self, state: &State) -> Vec<bool> {
        self.options
            .iter()
            .map(|option| {
                option.kind() == OptionKind::Root
                    || (option.initiation_test(state) && !option.termination_test(state, &self.mdp))
            })
            .collect()
    }

    /// Pick an option to execute from `state` (epsilon-greedy)
    pub fn act(&mut self, state: &State) -> usize {
        let mask = self.option_mask(state);
        let option_idx = self.policy_over_options.select(state.features(), &mask);
        self.policy_over_options.update_epsilon();
        option_idx
    }

    fn execute_option(
        &mut self,
        option_idx: usize,
        step_number: usize,
        exploring: bool,
    ) -> Result<(Vec<Transition>, f64)> {
        let (root, learned) = self
            .options
            .split_first_mut()
            .ok_or(DscError::InvalidOption(option_idx))?;

        if option_idx == 0 {
            return root.execute(&mut self.mdp, None, step_number, exploring);
        }
        let option = learned
            .get_mut(option_idx - 1)
            .ok_or(DscError::InvalidOption(option_idx))?;
        option.execute(&mut self.mdp, Some(root.solver_mut()), step_number, exploring)
    }

    /// Select and execute one option from `state`.
    ///
    /// Returns the primitive transitions, their undiscounted reward sum and
    /// the resulting state.
    pub fn take_action(
        &mut self,
        state: &State,
        step_number: usize,
        executions: &mut BTreeMap<String, u64>,
    ) -> Result<(Vec<Transition>, f64, State)> {
        let mut option_idx = self.act(state);
        let exploring = self.config.random_exploration;
        let (mut transitions, mut reward) = self.execute_option(option_idx, step_number, exploring)?;

        if transitions.is_empty() && option_idx != 0 {
            debug!(
                "{} produced no transitions, falling back to the root option",
                self.options[option_idx]
            );
            option_idx = 0;
            (transitions, reward) = self.execute_option(0, step_number, exploring)?;
        }

        let next_state = transitions
            .last()
            .map_or_else(|| state.clone(), |t| t.next_state.clone());

        if let Some(frontier) = self.frontier.as_mut() {
            if frontier.termination_test(&next_state, &self.mdp)
                && !frontier.termination_test(state, &self.mdp)
            {
                frontier.record_final_transition(state.clone(), option_idx);
            }
        }

        self.smdp_update(option_idx, &transitions, &next_state)?;
        self.off_policy_updates(option_idx, &transitions);

        let name = self.options[option_idx].name().to_string();
        *executions.entry(name.clone()).or_insert(0) += 1;
        let sampled_q = self.options[option_idx]
            .solver_mut()
            .sampled_q_value(Q_SAMPLE_SIZE)
            .unwrap_or(0.0);
        let history = self.option_history.entry(name).or_default();
        history.rewards.push(reward);
        history.sampled_q.push(sampled_q);

        Ok((transitions, reward, next_state))
    }

    /// Credit the executed option in the policy over options.
    ///
    /// Every sub-trajectory that starts inside the option's initiation
    /// region is used as an SMDP sample ending at `next_state`.
    fn smdp_update(
        &mut self,
        option_idx: usize,
        transitions: &[Transition],
        next_state: &State,
    ) -> Result<()> {
        let selected = &self.options[option_idx];
        let reached_termination = selected.termination_test(next_state, &self.mdp);

        for (i, transition) in transitions.iter().enumerate() {
            let start = &transition.state;
            if !selected.initiation_test(start) {
                continue;
            }
            let (reward, num_steps) = if self.config.use_full_smdp_update {
                let remaining = &transitions[i..];
                (
                    discounted_sum(remaining.iter().map(|t| t.reward), self.config.gamma),
                    remaining.len(),
                )
            } else if reached_termination {
                (self.config.subgoal_reward, 1)
            } else {
                (-1.0, 1)
            };
            self.policy_over_options.update(
                start.features(),
                option_idx,
                reward,
                next_state.features(),
                next_state.is_terminal(),
                num_steps,
            )?;
        }
        Ok(())
    }

    /// Share the executed transitions with every other trained learned option
    fn off_policy_updates(&mut self, executed_idx: usize, transitions: &[Transition]) {
        for (idx, option) in self.options.iter_mut().enumerate() {
            if idx == executed_idx || option.kind() == OptionKind::Root {
                continue;
            }
            let applied = transitions
                .iter()
                .filter(|t| option.off_policy_update(t, &self.mdp))
                .count();
            if applied > 0 {
                debug!("{}: {} off-policy updates", option.name(), applied);
            }
        }
    }

    fn data_derived_q(&self, option: &SkillOption) -> f64 {
        option
            .final_transitions()
            .iter()
            .map(|(state, idx)| self.policy_over_options.q_value(state.features(), *idx))
            .filter(|q| q.is_finite())
            .fold(None, |best: Option<f64>, q| Some(best.map_or(q, |b| b.max(q))))
            .unwrap_or(0.0)
    }

    /// Move the trained frontier into the option list and grow the policy over options
    fn promote_frontier(&mut self) -> Result<()> {
        let Some(option) = self.frontier.take() else {
            return Ok(());
        };
        let init_q = match self.config.init_q {
            Some(value) => value,
            None => self.data_derived_q(&option),
        };

        info!(
            "Promoting {} to option {} (initial Q {:.3})",
            option,
            self.options.len(),
            init_q
        );
        self.options.push(option);
        self.policy_over_options = self.policy_over_options.grow(self.options.len(), init_q)?;

        if self.should_create_more_options() {
            let parent = &self.options[self.options.len() - 1];
            let name = format!("option_{}", self.options.len() - 1);
            let solver = self.make_solver(&name, parent.index() + 1);
            let child = SkillOption::child(
                name,
                parent,
                self.config.clone(),
                self.classifier_config.clone(),
                solver,
            )?;
            info!("Created {} with parent {}", child, parent);
            self.frontier = Some(child);
        }
        Ok(())
    }

    /// Whether the chain should keep growing.
    ///
    /// Stops at `max_num_options` learned options, or once some trained
    /// option already covers a recorded start state.
    pub fn should_create_more_options(&self) -> bool {
        let learned = self.options.len().saturating_sub(1);
        if self.config.max_num_options == 0 || learned >= self.config.max_num_options {
            return false;
        }
        for start in &self.init_states {
            if let Some(option) = self.options[1..].iter().find(|o| o.initiation_test(start)) {
                info!("Start state is inside {}'s initiation region", option);
                return false;
            }
        }
        true
    }

    /// Run one training episode, returning its score and duration
    pub fn run_episode(&mut self) -> Result<(f64, usize)> {
        let episode = self.episode;
        let max_steps = self.config.max_steps;

        self.mdp.reset();
        let mut state = self.mdp.init_state().clone();
        self.init_states.push(state.clone());

        let mut score = 0.0;
        let mut step_number = 0;
        let mut frontier_hit = false;
        let mut experience_buffer: Vec<Transition> = Vec::new();
        let mut state_buffer: Vec<State> = Vec::new();
        let mut executions: BTreeMap<String, u64> = BTreeMap::new();

        while step_number < max_steps {
            let (transitions, reward, next_state) =
                self.take_action(&state, step_number, &mut executions)?;
            if transitions.is_empty() {
                warn!("No option could act from the current state, ending episode {}", episode);
                break;
            }
            score += reward;
            step_number += transitions.len();
            state = next_state;

            for transition in transitions {
                state_buffer.push(transition.state.clone());
                experience_buffer.push(transition);
            }
            if state.is_terminal() || step_number == max_steps.saturating_sub(1) {
                state_buffer.push(state.clone());
            }

            if !frontier_hit {
                if let Some(frontier) = self.frontier.as_mut() {
                    if !frontier.is_trained() && frontier.termination_test(&state, &self.mdp) {
                        frontier_hit = true;
                        if frontier.record_trajectory(
                            episode,
                            &experience_buffer,
                            &state_buffer,
                            &self.mdp,
                        )? {
                            self.promote_frontier()?;
                        }
                    }
                }
            }

            if state.is_terminal() {
                break;
            }
        }

        self.stats
            .record_episode(score, step_number, self.options.len(), executions);
        self.log_progress(episode);

        let interval = self.config.evaluation_interval;
        if interval > 0 && episode > 0 && episode % interval == 0 {
            let validation = self.evaluate()?;
            info!("Episode {} validation score: {:.2}", episode, validation);
            self.stats.validation_scores.push(validation);
        }

        self.episode += 1;
        Ok((score, step_number))
    }

    /// Run `num_episodes` training episodes
    pub fn train(&mut self, num_episodes: u64) -> Result<&EpisodeStats> {
        for _ in 0..num_episodes {
            self.run_episode()?;
        }
        info!(
            "Finished {} episodes with {} trained options",
            self.episode,
            self.options.len()
        );
        Ok(&self.stats)
    }

    fn log_progress(&self, episode: u64) {
        let score = self.stats.recent_mean_score(LOG_INTERVAL as usize);
        let duration = self.stats.recent_mean_duration(LOG_INTERVAL as usize);
        let epsilon = self.options[0].solver().epsilon();
        debug!(
            "Episode {} | avg score {:.2} | avg duration {:.1} | root eps {:.3}",
            episode, score, duration, epsilon
        );
        if episode % LOG_INTERVAL == 0 {
            info!(
                "Episode {} | avg score {:.2} | avg duration {:.1} | options {} | root eps {:.3}",
                episode,
                score,
                duration,
                self.options.len(),
                epsilon
            );
        }
    }

    /// Greedy pass over the trained options without learning.
    ///
    /// Returns the episode score.
    pub fn evaluate(&mut self) -> Result<f64> {
        self.mdp.reset();
        let mut state = self.mdp.init_state().clone();
        let mut score = 0.0;
        let mut step_number = 0;

        while !state.is_terminal() && step_number < self.config.max_steps {
            let mask = self.option_mask(&state);
            let mut option_idx = self.policy_over_options.greedy(state.features(), &mask);

            let mut outcome = self.options[option_idx].trained_execution(&mut self.mdp, step_number);
            if outcome.2 == step_number && option_idx != 0 {
                option_idx = 0;
                outcome = self.options[option_idx].trained_execution(&mut self.mdp, step_number);
            }
            let (reward, next_state, next_step) = outcome;
            if next_step == step_number {
                break;
            }
            score += reward;
            state = next_state;
            step_number = next_step;
        }
        Ok(score)
    }

    /// Diagnostics for every trained option and the frontier
    pub fn option_diagnostics(&self) -> Vec<OptionDiagnostics> {
        self.options
            .iter()
            .chain(self.frontier.iter())
            .map(|o| OptionDiagnostics::from_option(o, self.option_history.get(o.name())))
            .collect()
    }

    pub fn run_data(&self) -> RunData {
        RunData::new(
            self.mdp.name(),
            self.config.clone(),
            self.stats.clone(),
            self.option_diagnostics(),
        )
    }

    /// Write this run's artifacts under `dir`
    pub fn save_run(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        self.run_data().save(dir)
    }
}
