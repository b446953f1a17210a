//! Clasificador de referencia: regresión logística multinomial sobre
//! características estandarizadas, entrenada con Adam por mini-lotes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{validate_fit_input, Classifier, LabelEncoder, TrainingHistory};
use crate::config::Hyperparameters;
use crate::error::{Result, TrainerError};
use crate::types::{FeatureVector, GroupKey};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-8;
const MIN_SCALE: f32 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    seed: u64,
    encoder: LabelEncoder,
    /// Pesos [clase][característica]
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    /// Estandarización ajustada sobre el conjunto de entrenamiento
    mean: Vec<f32>,
    scale: Vec<f32>,
    history: TrainingHistory,
}

/// Momentos de Adam para pesos y sesgo
struct AdamState {
    m_w: Vec<Vec<f32>>,
    v_w: Vec<Vec<f32>>,
    m_b: Vec<f32>,
    v_b: Vec<f32>,
    steps: i32,
}

impl AdamState {
    fn new(classes: usize, dim: usize) -> Self {
        Self {
            m_w: vec![vec![0.0; dim]; classes],
            v_w: vec![vec![0.0; dim]; classes],
            m_b: vec![0.0; classes],
            v_b: vec![0.0; classes],
            steps: 0,
        }
    }

    fn step(
        &mut self,
        weights: &mut [Vec<f32>],
        bias: &mut [f32],
        grad_w: &[Vec<f32>],
        grad_b: &[f32],
        lr: f32,
    ) {
        self.steps += 1;
        let bc1 = 1.0 - BETA1.powi(self.steps);
        let bc2 = 1.0 - BETA2.powi(self.steps);

        let update = |p: &mut f32, m: &mut f32, v: &mut f32, g: f32| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= lr * m_hat / (v_hat.sqrt() + EPSILON);
        };

        for c in 0..weights.len() {
            for d in 0..weights[c].len() {
                update(&mut weights[c][d], &mut self.m_w[c][d], &mut self.v_w[c][d], grad_w[c][d]);
            }
            update(&mut bias[c], &mut self.m_b[c], &mut self.v_b[c], grad_b[c]);
        }
    }
}

impl SoftmaxClassifier {
    pub fn new() -> Self {
        Self::with_seed(42)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            encoder: LabelEncoder::default(),
            weights: Vec::new(),
            bias: Vec::new(),
            mean: Vec::new(),
            scale: Vec::new(),
            history: TrainingHistory::default(),
        }
    }

    pub fn weights(&self) -> &[Vec<f32>] {
        &self.weights
    }

    pub fn is_fitted(&self) -> bool {
        !self.encoder.is_empty() && !self.weights.is_empty()
    }

    fn standardize(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    /// Probabilidades de cada clase para una fila ya estandarizada
    fn probabilities(weights: &[Vec<f32>], bias: &[f32], x: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = weights
            .iter()
            .zip(bias)
            .map(|(w, b)| w.iter().zip(x).map(|(wi, xi)| wi * xi).sum::<f32>() + b)
            .collect();
        softmax(&logits)
    }

    /// (pérdida media de entropía cruzada, precisión en porcentaje)
    fn loss_and_accuracy(
        weights: &[Vec<f32>],
        bias: &[f32],
        rows: &[Vec<f32>],
        targets: &[usize],
    ) -> (f32, f32) {
        if rows.is_empty() {
            return (0.0, 0.0);
        }
        let mut loss = 0.0;
        let mut correct = 0usize;
        for (x, &y) in rows.iter().zip(targets) {
            let probs = Self::probabilities(weights, bias, x);
            loss -= probs[y].max(1e-12).ln();
            if argmax(&probs) == y {
                correct += 1;
            }
        }
        (
            loss / rows.len() as f32,
            correct as f32 / rows.len() as f32 * 100.0,
        )
    }
}

impl Default for SoftmaxClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for SoftmaxClassifier {
    fn fit(
        &mut self,
        train_features: &[FeatureVector],
        train_labels: &[GroupKey],
        val_features: Option<&[FeatureVector]>,
        val_labels: Option<&[GroupKey]>,
        params: &Hyperparameters,
    ) -> Result<()> {
        let dim = validate_fit_input(train_features, train_labels, val_features, val_labels)?;
        if params.batch_size == 0 || params.epochs == 0 {
            return Err(TrainerError::invalid("fit: epochs and batch_size must be positive"));
        }

        // La tabla cubre entrenamiento y validación para que ningún índice quede huérfano
        let mut encoder = LabelEncoder::default();
        encoder.fit(
            train_labels
                .iter()
                .chain(val_labels.unwrap_or(&[]))
                .map(GroupKey::gesture),
        );
        let encode = |labels: &[GroupKey]| -> Vec<usize> {
            labels
                .iter()
                .filter_map(|l| encoder.encode(l.gesture()))
                .collect()
        };
        let train_targets = encode(train_labels);
        let val_targets = val_labels.map(encode).unwrap_or_default();

        // Estandarización por característica
        let n = train_features.len() as f32;
        let mut mean = vec![0.0f32; dim];
        for row in train_features {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let mut scale = vec![0.0f32; dim];
        for row in train_features {
            for ((s, x), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in scale.iter_mut() {
            *s = s.sqrt().max(MIN_SCALE);
        }
        self.mean = mean;
        self.scale = scale;

        let train_rows: Vec<Vec<f32>> = train_features.iter().map(|r| self.standardize(r)).collect();
        let val_rows: Vec<Vec<f32>> = val_features
            .unwrap_or(&[])
            .iter()
            .map(|r| self.standardize(r))
            .collect();

        let classes = encoder.len();
        let mut weights = vec![vec![0.0f32; dim]; classes];
        let mut bias = vec![0.0f32; classes];
        let mut adam = AdamState::new(classes, dim);
        let mut history = TrainingHistory::default();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..train_rows.len()).collect();

        // drop_last solo si existe al menos un lote completo
        let drop_last = train_rows.len() >= params.batch_size;

        for epoch in 0..params.epochs {
            let decay = if params.lr_step > 0 { epoch / params.lr_step } else { 0 };
            let lr = params.learning_rate * params.lr_gamma.powi(decay as i32);

            order.shuffle(&mut rng);
            for batch in order.chunks(params.batch_size) {
                if drop_last && batch.len() < params.batch_size {
                    continue;
                }

                let mut grad_w = vec![vec![0.0f32; dim]; classes];
                let mut grad_b = vec![0.0f32; classes];
                for &idx in batch {
                    let x = &train_rows[idx];
                    let mut g = Self::probabilities(&weights, &bias, x);
                    g[train_targets[idx]] -= 1.0;
                    for c in 0..classes {
                        for d in 0..dim {
                            grad_w[c][d] += g[c] * x[d];
                        }
                        grad_b[c] += g[c];
                    }
                }

                let inv = 1.0 / batch.len() as f32;
                for c in 0..classes {
                    for d in 0..dim {
                        grad_w[c][d] = grad_w[c][d] * inv + params.l2_weight * weights[c][d];
                    }
                    grad_b[c] *= inv;
                }
                adam.step(&mut weights, &mut bias, &grad_w, &grad_b, lr);
            }

            let (loss, acc) = Self::loss_and_accuracy(&weights, &bias, &train_rows, &train_targets);
            history.train_loss.push(loss);
            history.train_accuracy.push(acc);
            if !val_rows.is_empty() {
                let (loss, acc) = Self::loss_and_accuracy(&weights, &bias, &val_rows, &val_targets);
                history.val_loss.push(loss);
                history.val_accuracy.push(acc);
            }
            debug!(epoch, loss, acc, lr, "época completada");
        }

        info!(
            "Entrenamiento terminado: {} épocas, {} clases, pérdida final {:.4}",
            params.epochs,
            classes,
            history.train_loss.last().copied().unwrap_or_default()
        );

        self.encoder = encoder;
        self.weights = weights;
        self.bias = bias;
        self.history = history;
        Ok(())
    }

    fn classify(&self, features: &[FeatureVector]) -> Result<Vec<String>> {
        if !self.is_fitted() {
            return Err(TrainerError::NotFitted);
        }
        features
            .iter()
            .map(|row| {
                if row.len() != self.mean.len() {
                    return Err(TrainerError::invalid(format!(
                        "classify: expected {} features, got {}",
                        self.mean.len(),
                        row.len()
                    )));
                }
                let probs = Self::probabilities(&self.weights, &self.bias, &self.standardize(row));
                self.encoder
                    .decode(argmax(&probs))
                    .map(str::to_string)
                    .ok_or(TrainerError::NotFitted)
            })
            .collect()
    }

    fn history(&self) -> &TrainingHistory {
        &self.history
    }

    fn class_names(&self) -> &[String] {
        self.encoder.classes()
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tres gestos bien separados, `reps` repeticiones de `windows` ventanas cada una
    fn clustered(reps: usize, windows: usize) -> (Vec<FeatureVector>, Vec<GroupKey>) {
        let centers = [("fist", [3.0, 0.0]), ("open", [0.0, 3.0]), ("pinch", [-3.0, -3.0])];
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (name, center) in centers {
            for rep in 1..=reps {
                for w in 0..windows {
                    let jitter = (w as f32 - 1.0) * 0.1 + rep as f32 * 0.01;
                    features.push(vec![center[0] + jitter, center[1] - jitter]);
                    labels.push(GroupKey::new(format!("001_1_1_{}_{}", name, rep)));
                }
            }
        }
        (features, labels)
    }

    fn quick_params() -> Hyperparameters {
        Hyperparameters {
            epochs: 60,
            batch_size: 8,
            learning_rate: 0.05,
            ..Hyperparameters::default()
        }
    }

    #[test]
    fn test_fit_learns_separable_gestures() {
        let (features, labels) = clustered(4, 3);
        let mut model = SoftmaxClassifier::new();
        model.fit(&features, &labels, None, None, &quick_params()).unwrap();

        assert_eq!(model.class_names(), &["fist", "open", "pinch"]);
        assert_eq!(model.evaluate(&features, &labels).unwrap(), 1.0);
        assert_eq!(model.classify_one(&vec![3.1, 0.1]).unwrap(), "fist");
    }

    #[test]
    fn test_history_records_every_epoch() {
        let (features, labels) = clustered(3, 2);
        let params = quick_params();
        let mut model = SoftmaxClassifier::new();
        model
            .fit(&features, &labels, Some(&features), Some(&labels), &params)
            .unwrap();

        let history = model.history();
        assert_eq!(history.epochs(), params.epochs);
        assert_eq!(history.val_loss.len(), params.epochs);
        assert!(history.train_loss.last().unwrap() < history.train_loss.first().unwrap());
    }

    #[test]
    fn test_invalid_fit_leaves_model_untouched() {
        let (features, labels) = clustered(2, 1);
        let mut model = SoftmaxClassifier::new();
        let err = model
            .fit(&features, &labels, None, Some(&labels), &quick_params())
            .unwrap_err();
        assert!(matches!(err, TrainerError::InvalidInput(_)));
        assert!(!model.is_fitted());
        assert!(matches!(model.classify(&features), Err(TrainerError::NotFitted)));
    }

    #[test]
    fn test_copy_is_independent() {
        let (features, labels) = clustered(3, 2);
        let mut base = SoftmaxClassifier::new();
        base.fit(&features, &labels, None, None, &quick_params()).unwrap();

        let mut copy = base.copy();
        let subset: Vec<usize> = (0..features.len()).filter(|i| i % 2 == 0).collect();
        let sub_f: Vec<_> = subset.iter().map(|&i| features[i].clone()).collect();
        let sub_l: Vec<_> = subset.iter().map(|&i| labels[i].clone()).collect();
        copy.fit(&sub_f, &sub_l, None, None, &quick_params()).unwrap();

        assert_ne!(base.weights(), copy.weights());
    }

    #[test]
    fn test_classify_rejects_wrong_dimension() {
        let (features, labels) = clustered(2, 2);
        let mut model = SoftmaxClassifier::new();
        model.fit(&features, &labels, None, None, &quick_params()).unwrap();
        assert!(matches!(
            model.classify(&[vec![1.0, 2.0, 3.0]]),
            Err(TrainerError::InvalidInput(_))
        ));
    }
}
