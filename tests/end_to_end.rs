use crossbeam_channel::{unbounded, Receiver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;

use fgr_trainer::config::{AcquisitionConfig, Hyperparameters};
use fgr_trainer::controller::{CvSummary, ModelTrainer, OnlineTrainer, RepetitionSource};
use fgr_trainer::cross_validation::{cv_fit, CrossValidationTrainer};
use fgr_trainer::folds::split_by_gesture;
use fgr_trainer::softmax::SoftmaxClassifier;
use fgr_trainer::types::{LabeledSet, RepetitionLabel};
use fgr_trainer::{Classifier, TrainerConfig};

const GESTURES: [(&str, [f32; 4]); 3] = [
    ("fist", [3.0, 0.0, 0.0, 1.0]),
    ("open", [0.0, 3.0, 0.0, 1.0]),
    ("pinch", [0.0, 0.0, 3.0, 1.0]),
];
const WINDOWS_PER_REP: usize = 3;

/// Repeticiones `reps` de los tres gestos, tres ventanas ruidosas cada una
fn block(reps: std::ops::RangeInclusive<u32>, rng: &mut StdRng) -> LabeledSet {
    let mut set = LabeledSet::new();
    for (gesture, center) in GESTURES {
        for repetition in reps.clone() {
            let key = RepetitionLabel {
                subject: 1,
                position: 1,
                session: 1,
                trial: 0,
                gesture: gesture.to_string(),
                repetition,
            }
            .key();
            for _ in 0..WINDOWS_PER_REP {
                let features = center.iter().map(|c| c + rng.gen_range(-0.3f32..0.3)).collect();
                set.push(features, key.clone());
            }
        }
    }
    set
}

fn params() -> Hyperparameters {
    Hyperparameters {
        epochs: 30,
        batch_size: 16,
        learning_rate: 0.05,
        ..Hyperparameters::default()
    }
}

#[test]
fn test_three_gestures_twelve_repetitions_five_folds() {
    let mut rng = StdRng::seed_from_u64(7);
    let data = block(1..=12, &mut rng);

    let assignment = split_by_gesture(&data.labels, 5, 42).unwrap();
    assert!(assignment.warning.is_none());
    assert!(assignment.sample_folds.iter().all(Option::is_some));

    let cv = cv_fit(&SoftmaxClassifier::new(), &data, 5, &params(), 42).unwrap();
    assert_eq!(cv.accuracies().len(), 5);
    assert!(cv.accuracies().iter().all(|a| (0.0..=1.0).contains(a)));
    assert!(cv.mean_accuracy() > 0.9);
}

/// Validación cruzada real, precisiones reportadas según guion
struct ScriptedAccuracies {
    inner: CrossValidationTrainer<SoftmaxClassifier>,
    script: VecDeque<f64>,
    folds_seen: Vec<usize>,
    final_calls: usize,
    held_out: Option<LabeledSet>,
    final_train_size: usize,
}

impl ModelTrainer for ScriptedAccuracies {
    fn cross_validate(&mut self, data: &LabeledSet, folds: usize) -> fgr_trainer::Result<CvSummary> {
        let real = self.inner.cross_validate(data, folds)?;
        assert_eq!(real.accuracies.len(), folds);
        self.folds_seen.push(folds);
        let scripted = self.script.pop_front().unwrap_or(0.0);
        Ok(CvSummary {
            accuracies: vec![scripted; folds],
            discarded: real.discarded,
        })
    }

    fn final_fit(&mut self, data: &LabeledSet, held_out: &LabeledSet) -> fgr_trainer::Result<f64> {
        self.final_calls += 1;
        self.final_train_size = data.len();
        self.held_out = Some(held_out.clone());
        self.inner.final_fit(data, held_out)
    }
}

/// Entrega los bloques en orden; a partir del segundo espera a que termine una ronda
struct RoundSource {
    blocks: VecDeque<LabeledSet>,
    round_done: Receiver<()>,
    first: bool,
}

impl RepetitionSource for RoundSource {
    fn record_block(&mut self, _config: &AcquisitionConfig) -> anyhow::Result<LabeledSet> {
        if !self.first {
            self.round_done.recv_timeout(Duration::from_secs(30))?;
        }
        self.first = false;
        self.blocks
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("sin más bloques"))
    }
}

#[test]
fn test_online_session_stops_after_third_round() {
    let mut rng = StdRng::seed_from_u64(11);
    let blocks: VecDeque<LabeledSet> = vec![
        block(1..=4, &mut rng),
        block(5..=8, &mut rng),
        block(9..=12, &mut rng),
        block(13..=14, &mut rng),
        block(15..=16, &mut rng),
    ]
    .into();
    let expected_held_out = blocks[3].clone();

    let (done_tx, done_rx) = unbounded();
    let source = RoundSource {
        blocks,
        round_done: done_rx,
        first: true,
    };
    let trainer = ScriptedAccuracies {
        inner: CrossValidationTrainer::new(SoftmaxClassifier::new(), params(), 42),
        script: VecDeque::from(vec![0.6, 0.75, 0.95]),
        folds_seen: Vec::new(),
        final_calls: 0,
        held_out: None,
        final_train_size: 0,
    };

    let config = TrainerConfig {
        poll_interval_ms: 10,
        hyperparameters: params(),
        ..TrainerConfig::default()
    };
    let outcome = OnlineTrainer::new(config)
        .on_round(move |_| {
            let _ = done_tx.send(());
        })
        .run(source, trainer)
        .unwrap();

    let report = outcome.report;
    assert_eq!(report.rounds.len(), 3);
    assert_eq!(report.runs_collected, 3);
    for (round, expected) in report.rounds.iter().zip([0.6, 0.75, 0.95]) {
        assert!((round.mean_accuracy - expected).abs() < 1e-9);
    }
    assert!(report.final_accuracy.is_some());

    let trainer = outcome.trainer;
    assert_eq!(trainer.folds_seen, vec![2, 4, 5]);
    assert_eq!(trainer.final_calls, 1);
    assert_eq!(trainer.final_train_size, 3 * 12 * WINDOWS_PER_REP);
    assert_eq!(trainer.held_out, Some(expected_held_out));

    let model = trainer.inner.into_final_model().unwrap();
    assert_eq!(model.class_names(), &["fist", "open", "pinch"]);
    assert!(model.history().has_validation());
}
