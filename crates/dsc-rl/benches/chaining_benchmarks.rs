//! Skill chaining benchmarks
//!
//! Hot paths of a training run:
//! 1. InitiationClassifier::contains() - queried for every option at every decision
//! 2. InitiationClassifier::fit() - blocks the control loop when an option is promoted
//! 3. ContinuousPolicy::update() - one learning step per primitive transition
//! 4. OptionValueNetwork::select() / grow()

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dsc_core::{PointMassConfig, PointMassMdp};
use dsc_rl::{
    ChainingConfig, ClassifierConfig, ContinuousPolicy, Ddpg, DdpgConfig, DqnConfig,
    InitiationClassifier, OptionValueNetwork, SkillChaining,
};

fn cluster(n: usize, cx: f64, cy: f64) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let angle = i as f64 * 0.7;
            let radius = 0.05 * (i % 10) as f64;
            vec![cx + radius * angle.cos(), cy + radius * angle.sin()]
        })
        .collect()
}

fn bench_classifier_fit(c: &mut Criterion) {
    let config = ClassifierConfig::default();
    let mut group = c.benchmark_group("classifier/fit_one_class");
    for n in [20, 60, 200] {
        let positives = cluster(n, 3.5, 3.5);
        group.bench_with_input(BenchmarkId::from_parameter(n), &positives, |b, positives| {
            b.iter(|| InitiationClassifier::fit(black_box(positives), &[], &config).unwrap());
        });
    }
    group.finish();
}

fn bench_classifier_fit_two_class(c: &mut Criterion) {
    let config = ClassifierConfig::default();
    let positives = cluster(60, 2.0, 2.0);
    let negatives = cluster(60, 3.5, 3.5);
    c.bench_function("classifier/fit_two_class", |b| {
        b.iter(|| {
            InitiationClassifier::fit(black_box(&positives), black_box(&negatives), &config)
                .unwrap()
        });
    });
}

fn bench_classifier_contains(c: &mut Criterion) {
    let classifier =
        InitiationClassifier::fit(&cluster(60, 3.5, 3.5), &[], &ClassifierConfig::default())
            .unwrap();
    c.bench_function("classifier/contains", |b| {
        b.iter(|| classifier.contains(black_box(&[3.4, 3.6])));
    });
}

fn bench_ddpg_update(c: &mut Criterion) {
    let mut ddpg = Ddpg::new("bench", 4, 2, 1.0, DdpgConfig::default(), 0);
    let state = [0.5, 0.5, 0.1, -0.1];
    let next_state = [0.6, 0.4, 0.1, -0.1];
    for _ in 0..128 {
        ddpg.update(&state, &[0.2, -0.2], -1.0, &next_state, false);
    }
    c.bench_function("ddpg/update", |b| {
        b.iter(|| ddpg.update(black_box(&state), &[0.2, -0.2], -1.0, &next_state, false));
    });
}

fn bench_option_value_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("option_value/select");
    for options in [2, 4, 8] {
        let mut network = OptionValueNetwork::new(4, options, DqnConfig::default(), 0);
        let mask = vec![true; options];
        group.bench_with_input(BenchmarkId::from_parameter(options), &mask, |b, mask| {
            b.iter(|| network.select(black_box(&[0.5, 0.5, 0.0, 0.0]), mask));
        });
    }
    group.finish();
}

fn bench_option_value_grow(c: &mut Criterion) {
    let network = OptionValueNetwork::new(4, 4, DqnConfig::default(), 0);
    c.bench_function("option_value/grow", |b| {
        b.iter(|| network.grow(black_box(5), 0.0).unwrap());
    });
}

fn bench_episode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chaining/episode");
    group.sample_size(10);
    group.bench_function("point_mass_100_steps", |b| {
        let config = ChainingConfig {
            max_steps: 100,
            ..ChainingConfig::default()
        };
        let mut dsc = SkillChaining::new(
            PointMassMdp::new(PointMassConfig::default()),
            config,
            ClassifierConfig::default(),
            DdpgConfig::default(),
            DqnConfig::default(),
        )
        .unwrap();
        b.iter(|| dsc.run_episode().unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_classifier_fit,
    bench_classifier_fit_two_class,
    bench_classifier_contains,
    bench_ddpg_update,
    bench_option_value_select,
    bench_option_value_grow,
    bench_episode,
);
criterion_main!(benches);
