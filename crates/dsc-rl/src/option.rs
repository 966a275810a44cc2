//! Options: temporally-extended actions with learned initiation regions
//!
//! An option's termination region is its parent's initiation region, or the
//! MDP's goal when it has no parent. Options spawned from the frontier
//! therefore chain backward from the goal toward the start state.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dsc_core::{DscError, Mdp, Result, State, Transition};

use crate::classifier::InitiationClassifier;
use crate::config::{ChainingConfig, ClassifierConfig};
use crate::policy::{standard_normal, ContinuousPolicy};

/// Role of an option in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    /// Primitive-timescale option that can run anywhere
    Root,
    /// First option of the chain, terminating at the MDP goal
    Goal,
    /// Option spawned behind a trained parent
    Learned,
}

impl OptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::Root => "root",
            OptionKind::Goal => "goal",
            OptionKind::Learned => "learned",
        }
    }
}

/// The parent's fitted initiation region, used as this option's termination region
#[derive(Debug, Clone)]
struct ParentRegion {
    index: usize,
    name: String,
    region: Arc<InitiationClassifier>,
}

/// Per-option execution counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub num_executions: u64,
    pub successful_executions: u64,
    pub total_steps: u64,
}

/// A temporally-extended action with its own closed-loop controller
pub struct SkillOption {
    name: String,
    kind: OptionKind,
    index: usize,
    parent: Option<ParentRegion>,
    config: ChainingConfig,
    classifier_config: ClassifierConfig,
    classifier: Option<Arc<InitiationClassifier>>,
    /// One position sequence per recorded trajectory
    positive_examples: Vec<Vec<Vec<f64>>>,
    /// Flattened positives of every ancestor
    negative_examples: Vec<Vec<f64>>,
    experience_buffer: Vec<Vec<Transition>>,
    num_goal_hits: usize,
    last_hit_episode: Option<u64>,
    final_transitions: Vec<(State, usize)>,
    solver: Box<dyn ContinuousPolicy>,
    rng: ChaCha8Rng,
    stats: ExecutionStats,
}

impl SkillOption {
    fn new(
        name: String,
        kind: OptionKind,
        index: usize,
        parent: Option<ParentRegion>,
        negative_examples: Vec<Vec<f64>>,
        config: ChainingConfig,
        classifier_config: ClassifierConfig,
        solver: Box<dyn ContinuousPolicy>,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        rng.set_stream(index as u64);
        Self {
            name,
            kind,
            index,
            parent,
            config,
            classifier_config,
            classifier: None,
            positive_examples: Vec::new(),
            negative_examples,
            experience_buffer: Vec::new(),
            num_goal_hits: 0,
            last_hit_episode: None,
            final_transitions: Vec::new(),
            solver,
            rng,
            stats: ExecutionStats::default(),
        }
    }

    /// The global option: initiation everywhere, one primitive step per execution
    pub fn root(
        config: ChainingConfig,
        classifier_config: ClassifierConfig,
        solver: Box<dyn ContinuousPolicy>,
    ) -> Self {
        Self::new(
            "global_option".to_string(),
            OptionKind::Root,
            0,
            None,
            Vec::new(),
            config,
            classifier_config,
            solver,
        )
    }

    /// The first frontier option, terminating at the MDP goal
    pub fn goal(
        config: ChainingConfig,
        classifier_config: ClassifierConfig,
        solver: Box<dyn ContinuousPolicy>,
    ) -> Self {
        Self::new(
            "goal_option".to_string(),
            OptionKind::Goal,
            1,
            None,
            Vec::new(),
            config,
            classifier_config,
            solver,
        )
    }

    /// Spawn an option behind a trained parent.
    ///
    /// The new option's negatives are every ancestor's positives: the
    /// parent's own positives followed by the parent's negatives.
    pub fn child(
        name: impl Into<String>,
        parent: &SkillOption,
        config: ChainingConfig,
        classifier_config: ClassifierConfig,
        solver: Box<dyn ContinuousPolicy>,
    ) -> Result<Self> {
        let region = parent
            .classifier
            .clone()
            .ok_or_else(|| DscError::NotTrained(parent.name.clone()))?;

        let negatives: Vec<Vec<f64>> = parent
            .positive_examples
            .iter()
            .flatten()
            .chain(parent.negative_examples.iter())
            .cloned()
            .collect();

        let name = name.into();
        debug!(
            "Creating {} behind {} with {} negative samples",
            name,
            parent.name,
            negatives.len()
        );

        Ok(Self::new(
            name,
            OptionKind::Learned,
            parent.index + 1,
            Some(ParentRegion {
                index: parent.index,
                name: parent.name.clone(),
                region,
            }),
            negatives,
            config,
            classifier_config,
            solver,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent.as_ref().map(|p| p.index)
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.name.as_str())
    }

    /// Whether the initiation region has been learned (always true for the root)
    pub fn is_trained(&self) -> bool {
        self.kind == OptionKind::Root || self.classifier.is_some()
    }

    pub fn classifier(&self) -> Option<&Arc<InitiationClassifier>> {
        self.classifier.as_ref()
    }

    pub fn num_goal_hits(&self) -> usize {
        self.num_goal_hits
    }

    pub fn positive_examples(&self) -> &[Vec<Vec<f64>>] {
        &self.positive_examples
    }

    pub fn negative_examples(&self) -> &[Vec<f64>] {
        &self.negative_examples
    }

    pub fn experience_buffer(&self) -> &[Vec<Transition>] {
        &self.experience_buffer
    }

    pub fn final_transitions(&self) -> &[(State, usize)] {
        &self.final_transitions
    }

    /// Remember that `option` carried the agent from `state` into this
    /// option's termination region
    pub fn record_final_transition(&mut self, state: State, option: usize) {
        self.final_transitions.push((state, option));
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn solver(&self) -> &dyn ContinuousPolicy {
        self.solver.as_ref()
    }

    pub fn solver_mut(&mut self) -> &mut dyn ContinuousPolicy {
        self.solver.as_mut()
    }

    /// Per-execution step limit
    pub fn timeout(&self) -> Option<usize> {
        match self.kind {
            OptionKind::Root => Some(1),
            _ => self.config.option_timeout,
        }
    }

    fn position(&self, state: &State) -> Vec<f64> {
        state.position(self.config.position_dims)
    }

    /// Whether the option may start from `state`
    pub fn initiation_test(&self, state: &State) -> bool {
        if self.kind == OptionKind::Root {
            return true;
        }
        self.classifier
            .as_ref()
            .is_some_and(|c| c.contains(&self.position(state)))
    }

    /// Whether execution must stop at `state`
    pub fn termination_test(&self, state: &State, mdp: &dyn Mdp) -> bool {
        match &self.parent {
            Some(parent) => parent.region.contains(&self.position(state)),
            None => mdp.is_goal_state(state),
        }
    }

    /// Record one trajectory that reached this option's termination region.
    ///
    /// Counts at most once per episode and never after training. Keeps the
    /// last `buffer_length` states as positive examples and the matching
    /// experiences for policy initialisation. Returns true when this call
    /// completed training.
    pub fn record_trajectory(
        &mut self,
        episode: u64,
        experiences: &[Transition],
        states: &[State],
        mdp: &dyn Mdp,
    ) -> Result<bool> {
        if self.is_trained() {
            debug!("{} is already trained, ignoring trajectory", self.name);
            return Ok(false);
        }
        if self.last_hit_episode == Some(episode) {
            debug!("{} already counted a hit in episode {}", self.name, episode);
            return Ok(false);
        }
        self.last_hit_episode = Some(episode);

        let keep = self.config.buffer_length;
        let positions: Vec<Vec<f64>> = states[states.len().saturating_sub(keep)..]
            .iter()
            .map(|s| self.position(s))
            .collect();
        self.positive_examples.push(positions);
        self.experience_buffer
            .push(experiences[experiences.len().saturating_sub(keep)..].to_vec());
        self.num_goal_hits += 1;

        info!(
            "{} reached its termination region ({}/{})",
            self.name, self.num_goal_hits, self.config.num_subgoal_hits_required
        );

        if self.num_goal_hits >= self.config.num_subgoal_hits_required {
            self.fit_classifier()?;
            self.initialize_policy(mdp);
            return Ok(true);
        }
        Ok(false)
    }

    /// Fit the initiation classifier from the recorded examples
    pub fn fit_classifier(&mut self) -> Result<()> {
        if self.kind == OptionKind::Root {
            return Err(DscError::Config(
                "the root option has no initiation classifier".to_string(),
            ));
        }
        let positives: Vec<Vec<f64>> = self.positive_examples.iter().flatten().cloned().collect();
        let classifier =
            InitiationClassifier::fit(&positives, &self.negative_examples, &self.classifier_config)?;

        info!(
            "Trained {} initiation classifier for {} ({} positive, {} negative samples)",
            classifier.kind().as_str(),
            self.name,
            classifier.num_positive(),
            classifier.num_negative()
        );
        self.classifier = Some(Arc::new(classifier));
        Ok(())
    }

    /// Replay the recorded experiences through the on-policy update path
    fn initialize_policy(&mut self, mdp: &dyn Mdp) {
        let experiences: Vec<Transition> = self.experience_buffer.iter().flatten().cloned().collect();
        for transition in &experiences {
            self.update_option_solver(transition, mdp);
        }
        debug!(
            "Initialised {} policy from {} experiences",
            self.name,
            experiences.len()
        );
    }

    /// Reward the option's controller sees when arriving at `state`
    pub fn compute_shaped_reward(&self, state: &State, mdp: &dyn Mdp) -> f64 {
        if self.termination_test(state, mdp) || state.is_terminal() {
            return self.config.subgoal_reward;
        }
        if !mdp.dense_reward() {
            return -1.0;
        }

        let position = self.position(state);
        match &self.parent {
            None => {
                let distance = mdp.distance_to_goal(&position);
                if distance <= mdp.goal_tolerance() {
                    self.config.subgoal_reward
                } else {
                    -mdp.reward_scale() * distance
                }
            }
            // Signed distance to the parent's region, zero once inside
            Some(parent) => parent.region.decision_function(&position).min(0.0),
        }
    }

    /// Learn from a transition generated by another option.
    ///
    /// Returns whether an update was issued.
    pub fn off_policy_update(&mut self, transition: &Transition, mdp: &dyn Mdp) -> bool {
        if transition.state.is_terminal() {
            return false;
        }
        if !mdp.is_primitive_action(&transition.action) {
            warn!("{}: off-policy update skipped for a non-primitive action", self.name);
            return false;
        }
        if self.termination_test(&transition.state, mdp) {
            debug!("{}: off-policy update skipped from a termination state", self.name);
            return false;
        }
        if !self.initiation_test(&transition.state) {
            return false;
        }

        let (reward, done) = if self.termination_test(&transition.next_state, mdp) {
            (self.config.subgoal_reward, true)
        } else {
            (
                self.compute_shaped_reward(&transition.next_state, mdp),
                transition.next_state.is_terminal(),
            )
        };
        self.solver.update(
            transition.state.features(),
            &transition.action,
            reward,
            transition.next_state.features(),
            done,
        );
        true
    }

    /// On-policy update from a transition this option generated
    pub fn update_option_solver(&mut self, transition: &Transition, mdp: &dyn Mdp) {
        if self.termination_test(&transition.state, mdp) {
            warn!(
                "{}: solver update requested from a termination state",
                self.name
            );
            return;
        }
        if !mdp.is_primitive_action(&transition.action) {
            warn!(
                "{}: solver update requested for a non-primitive action {:?}",
                self.name, transition.action
            );
            return;
        }

        let (reward, done) = if self.termination_test(&transition.next_state, mdp) {
            debug!("{} execution successful", self.name);
            (self.config.subgoal_reward, true)
        } else if transition.next_state.is_terminal() {
            (self.config.subgoal_reward, true)
        } else {
            (self.compute_shaped_reward(&transition.next_state, mdp), false)
        };
        self.solver.update(
            transition.state.features(),
            &transition.action,
            reward,
            transition.next_state.features(),
            done,
        );
    }

    fn choose_action(&mut self, state: &State, action_dim: usize, bound: f64, exploring: bool) -> Vec<f64> {
        if !exploring {
            let action = self.solver.select_action(state.features(), false);
            self.solver.update_epsilon();
            return action;
        }

        if self.rng.gen::<f64>() < self.config.random_action_prob {
            return (0..action_dim)
                .map(|_| self.rng.gen_range(-bound..=bound))
                .collect();
        }
        let mut action = self.solver.select_action(state.features(), false);
        for a in &mut action {
            let noise = bound * self.config.exploration_noise * standard_normal(&mut self.rng);
            *a = (*a + noise).clamp(-bound, bound);
        }
        action
    }

    /// Run the option's control loop from the MDP's current state.
    ///
    /// Stops at termination, at a terminal MDP state, when the episode step
    /// budget is spent or at the option's timeout. Each primitive transition
    /// trains this option and, for non-root options, is also handed to
    /// `root_solver`. Returns the transitions and their undiscounted reward
    /// sum.
    pub fn execute(
        &mut self,
        mdp: &mut dyn Mdp,
        mut root_solver: Option<&mut dyn ContinuousPolicy>,
        step_number: usize,
        exploring: bool,
    ) -> Result<(Vec<Transition>, f64)> {
        let mut state = mdp.current_state().clone();
        if !self.initiation_test(&state) {
            return Err(DscError::InitiationNotSatisfied {
                option: self.name.clone(),
            });
        }

        self.stats.num_executions += 1;
        let timeout = self.timeout();
        let action_dim = mdp.action_space_size();
        let bound = mdp.action_space_bound();

        let mut transitions = Vec::new();
        let mut total_reward = 0.0;
        let mut step_number = step_number;
        let mut num_steps = 0;

        while !self.termination_test(&state, &*mdp)
            && !state.is_terminal()
            && step_number < self.config.max_steps
            && timeout.map_or(true, |t| num_steps < t)
        {
            let action = self.choose_action(&state, action_dim, bound, exploring);
            let (reward, next_state) = mdp.execute_action(&action);
            let transition = Transition::new(state, action, reward, next_state.clone());

            self.update_option_solver(&transition, &*mdp);

            if self.kind != OptionKind::Root {
                if let Some(root) = root_solver.as_mut() {
                    root.update(
                        transition.state.features(),
                        &transition.action,
                        reward,
                        next_state.features(),
                        next_state.is_terminal(),
                    );
                    if !exploring {
                        root.update_epsilon();
                    }
                }
            }

            transitions.push(transition);
            total_reward += reward;
            state = next_state;
            step_number += 1;
            num_steps += 1;
        }

        if self.termination_test(&state, &*mdp) {
            self.stats.successful_executions += 1;
        }
        self.stats.total_steps += num_steps as u64;
        debug!("{} ran {} steps (reward {:.2})", self.name, num_steps, total_reward);

        Ok((transitions, total_reward))
    }

    /// Greedy execution without learning, used for evaluation.
    ///
    /// Returns the accumulated reward, the final state and the updated step
    /// counter.
    pub fn trained_execution(&mut self, mdp: &mut dyn Mdp, step_number: usize) -> (f64, State, usize) {
        let mut state = mdp.current_state().clone();
        let timeout = self.timeout();
        let mut score = 0.0;
        let mut step_number = step_number;
        let mut num_steps = 0;

        while !self.termination_test(&state, &*mdp)
            && !state.is_terminal()
            && step_number < self.config.max_steps
            && timeout.map_or(true, |t| num_steps < t)
        {
            let action = self.solver.select_action(state.features(), true);
            let (reward, next_state) = mdp.execute_action(&action);
            score += reward;
            state = next_state;
            step_number += 1;
            num_steps += 1;
        }
        (score, state, step_number)
    }
}

impl fmt::Display for SkillOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for SkillOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillOption")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("parent", &self.parent_name())
            .field("trained", &self.is_trained())
            .field("num_goal_hits", &self.num_goal_hits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DdpgConfig;
    use crate::policy::Ddpg;
    use dsc_core::{PointMassConfig, PointMassMdp};

    fn config() -> ChainingConfig {
        ChainingConfig {
            num_subgoal_hits_required: 3,
            ..ChainingConfig::default()
        }
    }

    fn solver(name: &str) -> Box<dyn ContinuousPolicy> {
        Box::new(Ddpg::new(
            format!("{name}_ddpg_agent"),
            4,
            2,
            1.0,
            DdpgConfig::default(),
            0,
        ))
    }

    fn goal_option() -> SkillOption {
        SkillOption::goal(config(), ClassifierConfig::default(), solver("goal_option"))
    }

    /// Twenty states on a 5 x 4 grid centred on `(cx, cy)` with the transitions between them
    fn cluster(cx: f64, cy: f64) -> (Vec<Transition>, Vec<State>) {
        let states: Vec<State> = (0..20)
            .map(|i| {
                let x = cx - 0.5 + 0.25 * f64::from(i % 5);
                let y = cy - 0.375 + 0.25 * f64::from(i / 5);
                State::new(vec![x, y, 0.0, 0.0], false)
            })
            .collect();
        let transitions = states
            .windows(2)
            .map(|w| Transition::new(w[0].clone(), vec![0.0, 0.0], -1.0, w[1].clone()))
            .collect();
        (transitions, states)
    }

    fn train(option: &mut SkillOption, cx: f64, cy: f64, mdp: &dyn Mdp) {
        let (experiences, states) = cluster(cx, cy);
        for episode in 0..option.config.num_subgoal_hits_required as u64 {
            option
                .record_trajectory(episode, &experiences, &states, mdp)
                .unwrap();
        }
        assert!(option.is_trained());
    }

    fn probe_states() -> Vec<State> {
        let mut states = Vec::new();
        for i in 0..=10 {
            for j in 0..=10 {
                states.push(State::new(
                    vec![0.5 * f64::from(i), 0.5 * f64::from(j), 0.0, 0.0],
                    false,
                ));
            }
        }
        states
    }

    #[test]
    fn test_parentless_termination_is_goal_test() {
        let mdp = PointMassMdp::default();
        let root = SkillOption::root(config(), ClassifierConfig::default(), solver("global_option"));
        let goal = goal_option();

        for state in probe_states() {
            assert_eq!(goal.termination_test(&state, &mdp), mdp.is_goal_state(&state));
            assert_eq!(root.termination_test(&state, &mdp), mdp.is_goal_state(&state));
        }
    }

    #[test]
    fn test_child_termination_is_parent_initiation() {
        let mdp = PointMassMdp::default();
        let mut goal = goal_option();
        train(&mut goal, 3.6, 3.6, &mdp);

        let child = SkillOption::child(
            "option_1",
            &goal,
            config(),
            ClassifierConfig::default(),
            solver("option_1"),
        )
        .unwrap();

        assert_eq!(child.index(), 2);
        assert_eq!(child.parent_index(), Some(1));
        assert_eq!(child.kind(), OptionKind::Learned);
        for state in probe_states() {
            assert_eq!(child.termination_test(&state, &mdp), goal.initiation_test(&state));
        }
    }

    #[test]
    fn test_root_initiation_accepts_everything() {
        let root = SkillOption::root(config(), ClassifierConfig::default(), solver("global_option"));
        assert!(root.is_trained());
        assert!(root.initiation_test(&State::new(vec![0.0, 0.0, 0.0, 0.0], false)));
        assert!(root.initiation_test(&State::new(vec![f64::NAN, f64::INFINITY], true)));
        assert!(root.initiation_test(&State::new(vec![], false)));
        assert_eq!(root.timeout(), Some(1));
    }

    #[test]
    fn test_untrained_option_rejects_initiation() {
        let goal = goal_option();
        assert!(!goal.is_trained());
        assert!(!goal.initiation_test(&State::new(vec![4.0, 4.0, 0.0, 0.0], false)));
    }

    #[test]
    fn test_record_trajectory_threshold() {
        let mdp = PointMassMdp::default();
        let mut goal = goal_option();
        let (experiences, states) = cluster(3.6, 3.6);

        assert!(!goal.record_trajectory(0, &experiences, &states, &mdp).unwrap());
        assert!(!goal.record_trajectory(1, &experiences, &states, &mdp).unwrap());
        assert!(goal.classifier().is_none());
        assert_eq!(goal.num_goal_hits(), 2);

        assert!(goal.record_trajectory(2, &experiences, &states, &mdp).unwrap());
        assert!(goal.classifier().is_some());
        assert!(goal.initiation_test(&State::new(vec![3.6, 3.6, 0.0, 0.0], false)));
        assert!(!goal.initiation_test(&State::new(vec![0.0, 0.0, 0.0, 0.0], false)));

        // Trained options ignore further trajectories
        assert!(!goal.record_trajectory(3, &experiences, &states, &mdp).unwrap());
        assert_eq!(goal.num_goal_hits(), 3);
    }

    #[test]
    fn test_record_trajectory_counts_once_per_episode() {
        let mdp = PointMassMdp::default();
        let mut goal = goal_option();
        let (experiences, states) = cluster(3.6, 3.6);

        goal.record_trajectory(7, &experiences, &states, &mdp).unwrap();
        goal.record_trajectory(7, &experiences, &states, &mdp).unwrap();
        assert_eq!(goal.num_goal_hits(), 1);
        assert_eq!(goal.positive_examples().len(), 1);

        goal.record_trajectory(8, &experiences, &states, &mdp).unwrap();
        assert_eq!(goal.num_goal_hits(), 2);
    }

    #[test]
    fn test_record_trajectory_keeps_suffix() {
        let mdp = PointMassMdp::default();
        let cfg = ChainingConfig {
            buffer_length: 5,
            ..config()
        };
        let mut goal = SkillOption::goal(cfg, ClassifierConfig::default(), solver("goal_option"));
        let (experiences, states) = cluster(3.6, 3.6);

        goal.record_trajectory(0, &experiences, &states, &mdp).unwrap();
        let positives = &goal.positive_examples()[0];
        assert_eq!(positives.len(), 5);
        assert_eq!(positives[4], states[19].position(2));
        assert_eq!(goal.experience_buffer()[0].len(), 5);
        assert_eq!(goal.experience_buffer()[0][4], experiences[18]);
    }

    #[test]
    fn test_negatives_collect_every_ancestor() {
        let mdp = PointMassMdp::default();
        let mut goal = goal_option();
        train(&mut goal, 3.6, 3.6, &mdp);

        let mut first = SkillOption::child(
            "option_1",
            &goal,
            config(),
            ClassifierConfig::default(),
            solver("option_1"),
        )
        .unwrap();
        let goal_samples: Vec<Vec<f64>> = goal.positive_examples().iter().flatten().cloned().collect();
        assert_eq!(first.negative_examples(), goal_samples.as_slice());

        train(&mut first, 2.0, 2.0, &mdp);
        let second = SkillOption::child(
            "option_2",
            &first,
            config(),
            ClassifierConfig::default(),
            solver("option_2"),
        )
        .unwrap();

        let mut expected: Vec<Vec<f64>> = first.positive_examples().iter().flatten().cloned().collect();
        expected.extend(goal_samples);
        assert_eq!(second.negative_examples(), expected.as_slice());
        assert_eq!(second.index(), 3);
    }

    #[test]
    fn test_child_requires_trained_parent() {
        let goal = goal_option();
        let result = SkillOption::child(
            "option_1",
            &goal,
            config(),
            ClassifierConfig::default(),
            solver("option_1"),
        );
        assert!(matches!(result, Err(DscError::NotTrained(_))));
    }

    #[test]
    fn test_execute_outside_initiation_is_contract_violation() {
        let mut mdp = PointMassMdp::default();
        let mut goal = goal_option();

        let err = goal.execute(&mut mdp, None, 0, true).unwrap_err();
        assert!(matches!(err, DscError::InitiationNotSatisfied { .. }));
        assert!(err.is_contract_violation());
        assert_eq!(goal.stats().num_executions, 0);
    }

    #[test]
    fn test_root_executes_single_step() {
        let mut mdp = PointMassMdp::default();
        let mut root = SkillOption::root(config(), ClassifierConfig::default(), solver("global_option"));

        let (transitions, reward) = root.execute(&mut mdp, None, 0, true).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(reward, transitions[0].reward);
        assert_eq!(root.solver().replay_len(), 1);
        assert_eq!(&transitions[0].next_state, mdp.current_state());
    }

    #[test]
    fn test_execute_respects_step_budget() {
        let mut mdp = PointMassMdp::default();
        let mut root = SkillOption::root(config(), ClassifierConfig::default(), solver("global_option"));
        let (transitions, _) = root.execute(&mut mdp, None, config().max_steps, true).unwrap();
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_execute_feeds_root_solver() {
        let mut mdp = PointMassMdp::default();
        let mut goal = goal_option();
        train(&mut goal, 1.0, 1.0, &mdp);
        mdp.set_position(1.0, 1.0);
        assert!(goal.initiation_test(mdp.current_state()));

        let mut root_solver = solver("global_option");
        let (transitions, total) = goal
            .execute(&mut mdp, Some(root_solver.as_mut()), 0, true)
            .unwrap();

        assert!(!transitions.is_empty());
        assert!(transitions.len() <= 100);
        assert_eq!(root_solver.replay_len(), transitions.len());
        let sum: f64 = transitions.iter().map(|t| t.reward).sum();
        assert!((total - sum).abs() < 1e-12);
        assert_eq!(goal.stats().num_executions, 1);
    }

    #[test]
    fn test_sparse_shaped_reward() {
        let mdp = PointMassMdp::default();
        let goal = goal_option();
        assert_eq!(
            goal.compute_shaped_reward(&State::new(vec![1.0, 1.0, 0.0, 0.0], false), &mdp),
            -1.0
        );
        assert_eq!(
            goal.compute_shaped_reward(&State::new(vec![4.0, 4.0, 0.0, 0.0], true), &mdp),
            0.0
        );
    }

    #[test]
    fn test_dense_shaped_reward() {
        let mdp = PointMassMdp::new(PointMassConfig {
            dense_reward: true,
            reward_scale: 0.5,
            ..PointMassConfig::default()
        });
        let mut goal = goal_option();

        let far = State::new(vec![1.0, 4.0, 0.0, 0.0], false);
        assert!((goal.compute_shaped_reward(&far, &mdp) + 1.5).abs() < 1e-12);

        train(&mut goal, 3.6, 3.6, &mdp);
        let child = SkillOption::child(
            "option_1",
            &goal,
            config(),
            ClassifierConfig::default(),
            solver("option_1"),
        )
        .unwrap();
        let origin = State::new(vec![0.0, 0.0, 0.0, 0.0], false);
        assert!(child.compute_shaped_reward(&origin, &mdp) < 0.0);

        let inside = State::new(vec![3.6, 3.6, 0.0, 0.0], false);
        assert!(child.termination_test(&inside, &mdp));
        assert_eq!(child.compute_shaped_reward(&inside, &mdp), 0.0);
    }

    #[test]
    fn test_off_policy_update_scope() {
        let mdp = PointMassMdp::default();
        let mut goal = goal_option();
        train(&mut goal, 2.0, 2.0, &mdp);
        let before = goal.solver().replay_len();

        let outside = Transition::new(
            State::new(vec![0.0, 0.0, 0.0, 0.0], false),
            vec![1.0, 1.0],
            -1.0,
            State::new(vec![0.5, 0.5, 0.5, 0.5], false),
        );
        assert!(!goal.off_policy_update(&outside, &mdp));

        let at_goal = Transition::new(
            State::new(vec![4.0, 4.0, 0.0, 0.0], false),
            vec![0.0, 0.0],
            0.0,
            State::new(vec![4.0, 4.0, 0.0, 0.0], true),
        );
        assert!(!goal.off_policy_update(&at_goal, &mdp));

        let inside = Transition::new(
            State::new(vec![2.0, 2.0, 0.0, 0.0], false),
            vec![0.2, 0.0],
            -1.0,
            State::new(vec![2.1, 2.0, 0.1, 0.0], false),
        );
        assert!(goal.off_policy_update(&inside, &mdp));
        assert_eq!(goal.solver().replay_len(), before + 1);
    }

    #[test]
    fn test_updates_skip_non_primitive_actions() {
        let mdp = PointMassMdp::default();
        let mut goal = goal_option();
        train(&mut goal, 2.0, 2.0, &mdp);
        let before = goal.solver().replay_len();

        let transition = |action: Vec<f64>| {
            Transition::new(
                State::new(vec![2.0, 2.0, 0.0, 0.0], false),
                action,
                -1.0,
                State::new(vec![2.1, 2.0, 0.1, 0.0], false),
            )
        };

        assert!(!goal.off_policy_update(&transition(vec![3.0, 0.0]), &mdp));
        assert!(!goal.off_policy_update(&transition(vec![0.2]), &mdp));
        goal.update_option_solver(&transition(vec![f64::NAN, 0.0]), &mdp);
        assert_eq!(goal.solver().replay_len(), before);

        goal.update_option_solver(&transition(vec![0.2, 0.0]), &mdp);
        assert_eq!(goal.solver().replay_len(), before + 1);
    }

    #[test]
    fn test_trained_execution_does_not_learn() {
        let mut mdp = PointMassMdp::default();
        let mut root = SkillOption::root(config(), ClassifierConfig::default(), solver("global_option"));
        let (score, state, step) = root.trained_execution(&mut mdp, 5);
        assert_eq!(step, 6);
        assert_eq!(&state, mdp.current_state());
        assert!(score <= 0.0);
        assert_eq!(root.solver().replay_len(), 0);
    }
}
