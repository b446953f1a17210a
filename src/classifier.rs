//! Contrato del clasificador entrenable.
//!
//! El controlador y la validación cruzada solo conocen este trait; la arquitectura
//! concreta (ver [`crate::softmax`]) queda detrás de él.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Hyperparameters;
use crate::error::{Result, TrainerError};
use crate::types::{FeatureVector, GroupKey};

/// Historial por época (precisión en porcentaje)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f32>,
    pub train_accuracy: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_accuracy: Vec<f32>,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    pub fn has_validation(&self) -> bool {
        !self.val_loss.is_empty()
    }
}

/// Tabla nombre de gesto ↔ índice. Se reajusta en cada `fit`; los índices
/// nunca salen de la instancia que la ajustó.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let mut classes: Vec<String> = names.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        self.classes = classes;
    }

    pub fn encode(&self, name: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(name)).ok()
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

pub trait Classifier: Clone + Send + Sync {
    /// Entrena en el sitio. Las etiquetas se reducen a la identidad del gesto.
    fn fit(
        &mut self,
        train_features: &[FeatureVector],
        train_labels: &[GroupKey],
        val_features: Option<&[FeatureVector]>,
        val_labels: Option<&[GroupKey]>,
        params: &Hyperparameters,
    ) -> Result<()>;

    /// Inferencia pura; devuelve nombres de gesto ya decodificados
    fn classify(&self, features: &[FeatureVector]) -> Result<Vec<String>>;

    fn history(&self) -> &TrainingHistory;

    fn class_names(&self) -> &[String];

    fn classify_one(&self, features: &FeatureVector) -> Result<String> {
        self.classify(std::slice::from_ref(features))?
            .pop()
            .ok_or(TrainerError::NotFitted)
    }

    /// Precisión a nivel de repetición: voto por ventana y luego voto por clave completa
    fn evaluate(&self, features: &[FeatureVector], labels: &[GroupKey]) -> Result<f64> {
        if features.len() != labels.len() {
            return Err(TrainerError::invalid(format!(
                "evaluate: {} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(TrainerError::invalid("evaluate: empty evaluation set"));
        }
        let predictions = self.classify(features)?;
        Ok(consensus_accuracy(&predictions, labels))
    }

    /// Copia profunda e independiente
    fn copy(&self) -> Self {
        self.clone()
    }
}

/// Predicción de consenso por clave de agrupación (empates: nombre menor)
pub fn group_consensus<'a>(
    predictions: &'a [String],
    labels: &'a [GroupKey],
) -> BTreeMap<&'a GroupKey, &'a str> {
    let mut votes: BTreeMap<&GroupKey, BTreeMap<&str, usize>> = BTreeMap::new();
    for (pred, label) in predictions.iter().zip(labels) {
        *votes.entry(label).or_default().entry(pred.as_str()).or_insert(0) += 1;
    }

    votes
        .into_iter()
        .filter_map(|(key, counts)| {
            let mut best: Option<(&str, usize)> = None;
            for (name, count) in counts {
                if best.map_or(true, |(_, c)| count > c) {
                    best = Some((name, count));
                }
            }
            best.map(|(name, _)| (key, name))
        })
        .collect()
}

/// Fracción de repeticiones cuyo consenso coincide con su gesto real
pub fn consensus_accuracy(predictions: &[String], labels: &[GroupKey]) -> f64 {
    let consensus = group_consensus(predictions, labels);
    if consensus.is_empty() {
        return 0.0;
    }
    let correct = consensus
        .iter()
        .filter(|(key, pred)| key.gesture() == **pred)
        .count();
    correct as f64 / consensus.len() as f64
}

/// Valida una llamada a `fit` antes de tocar ningún estado.
/// Devuelve la dimensión de las características.
pub fn validate_fit_input(
    train_features: &[FeatureVector],
    train_labels: &[GroupKey],
    val_features: Option<&[FeatureVector]>,
    val_labels: Option<&[GroupKey]>,
) -> Result<usize> {
    if train_features.is_empty() {
        return Err(TrainerError::invalid("fit: empty training set"));
    }
    if train_features.len() != train_labels.len() {
        return Err(TrainerError::invalid(format!(
            "fit: {} training rows but {} labels",
            train_features.len(),
            train_labels.len()
        )));
    }
    let dim = train_features[0].len();
    if dim == 0 {
        return Err(TrainerError::invalid("fit: zero-length feature vectors"));
    }

    match (val_features, val_labels) {
        (Some(_), None) => {
            return Err(TrainerError::invalid(
                "fit: validation data given without validation labels",
            ))
        }
        (None, Some(_)) => {
            return Err(TrainerError::invalid(
                "fit: validation labels given without validation data",
            ))
        }
        (Some(vf), Some(vl)) if vf.len() != vl.len() => {
            return Err(TrainerError::invalid(format!(
                "fit: {} validation rows but {} labels",
                vf.len(),
                vl.len()
            )))
        }
        _ => {}
    }

    let all_rows = train_features.iter().chain(val_features.unwrap_or(&[]));
    if let Some(bad) = all_rows.clone().position(|row| row.len() != dim) {
        return Err(TrainerError::invalid(format!(
            "fit: row {} has {} features, expected {}",
            bad,
            all_rows.clone().nth(bad).map_or(0, Vec::len),
            dim
        )));
    }

    Ok(dim)
}
