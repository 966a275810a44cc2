//! Integration tests for the MDP contract and the point-mass domain

#![allow(clippy::float_cmp)]

use dsc_core::util::{discounted_sum, mean};
use dsc_core::{Mdp, PointMassConfig, PointMassMdp, State, Transition};

fn drive(mdp: &mut dyn Mdp, action: &[f64], steps: usize) -> Vec<Transition> {
    let mut transitions = Vec::new();
    for _ in 0..steps {
        let state = mdp.current_state().clone();
        if state.is_terminal() {
            break;
        }
        let (reward, next_state) = mdp.execute_action(action);
        transitions.push(Transition::new(state, action.to_vec(), reward, next_state));
    }
    transitions
}

#[test]
fn test_diagonal_policy_reaches_goal() {
    let mut mdp = PointMassMdp::default();
    let transitions = drive(&mut mdp, &[1.0, 1.0], 50);

    let last = transitions.last().unwrap();
    assert!(last.next_state.is_terminal());
    assert!(mdp.is_goal_state(&last.next_state));
    // (0,0) -> within 0.6 of (4,4) at 1.0 per axis per step
    assert_eq!(transitions.len(), 4);
    assert_eq!(last.reward, 0.0);
    assert!(transitions[..3].iter().all(|t| t.reward == -1.0));
}

#[test]
fn test_transitions_chain_states() {
    let mut mdp = PointMassMdp::default();
    let transitions = drive(&mut mdp, &[0.3, 0.8], 10);
    for pair in transitions.windows(2) {
        assert_eq!(pair[0].next_state, pair[1].state);
    }
}

#[test]
fn test_reset_restores_start() {
    let mut mdp = PointMassMdp::default();
    drive(&mut mdp, &[1.0, 0.0], 5);
    mdp.reset();
    assert_eq!(mdp.current_state(), mdp.init_state());
    assert_eq!(mdp.current_state().position(2), vec![0.0, 0.0]);
}

#[test]
fn test_noisy_reset_is_reproducible() {
    let config = PointMassConfig {
        init_noise: 0.2,
        seed: 11,
        ..PointMassConfig::default()
    };
    let mut a = PointMassMdp::new(config.clone());
    let mut b = PointMassMdp::new(config);
    for _ in 0..5 {
        a.reset();
        b.reset();
        assert_eq!(a.init_state(), b.init_state());
        let p = a.init_state().position(2);
        assert!(p.iter().all(|v| v.abs() <= 0.2));
    }
}

#[test]
fn test_dense_reward_tracks_distance() {
    let mut mdp = PointMassMdp::new(PointMassConfig {
        dense_reward: true,
        reward_scale: 1.0,
        ..PointMassConfig::default()
    });
    let (reward, state) = mdp.execute_action(&[1.0, 1.0]);
    let distance = mdp.distance_to_goal(&state.position(2));
    assert!((reward + distance).abs() < 1e-12);
}

#[test]
fn test_primitive_action_bounds() {
    let mdp = PointMassMdp::default();
    assert!(mdp.is_primitive_action(&[0.5, -1.0]));
    assert!(!mdp.is_primitive_action(&[1.5, 0.0]));
    assert!(!mdp.is_primitive_action(&[0.0]));
}

#[test]
fn test_malformed_states_are_never_goal() {
    let mdp = PointMassMdp::default();
    assert!(!mdp.is_goal_state(&State::new(vec![], false)));
    assert!(!mdp.is_goal_state(&State::new(vec![f64::NAN, 4.0], false)));
}

#[test]
fn test_episode_return_helpers() {
    let mut mdp = PointMassMdp::default();
    let transitions = drive(&mut mdp, &[1.0, 1.0], 50);
    let rewards: Vec<f64> = transitions.iter().map(|t| t.reward).collect();

    assert_eq!(discounted_sum(rewards.iter().copied(), 1.0), -3.0);
    assert!(discounted_sum(rewards.iter().copied(), 0.9) > -3.0);
    assert!((mean(&rewards) + 3.0 / 4.0).abs() < 1e-12);
}
