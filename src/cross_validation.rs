use rayon::prelude::*;
use tracing::info;

use crate::classifier::Classifier;
use crate::config::Hyperparameters;
use crate::controller::{CvSummary, ModelTrainer};
use crate::error::{Result, TrainerError};
use crate::folds::{split_by_gesture, train_test_split_by_gesture, InsufficientRepetitions, TrainTestSplit};
use crate::types::LabeledSet;

/// Resultado de un fold: copia entrenada y su precisión sobre el fold reservado
#[derive(Debug, Clone)]
pub struct FoldResult<C> {
    pub fold: usize,
    pub model: C,
    pub accuracy: f64,
    pub train_size: usize,
    pub val_size: usize,
}

#[derive(Debug, Clone)]
pub struct CrossValidation<C> {
    pub folds: Vec<FoldResult<C>>,
    pub warning: Option<InsufficientRepetitions>,
}

impl<C> CrossValidation<C> {
    pub fn accuracies(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.accuracy).collect()
    }

    pub fn mean_accuracy(&self) -> f64 {
        if self.folds.is_empty() {
            return 0.0;
        }
        self.folds.iter().map(|f| f.accuracy).sum::<f64>() / self.folds.len() as f64
    }

    pub fn models(&self) -> impl Iterator<Item = &C> {
        self.folds.iter().map(|f| &f.model)
    }
}

/// Entrena `folds` copias independientes de `base`, cada una sin su fold,
/// y las evalúa (consenso por repetición) sobre el fold reservado.
/// Los folds no comparten estado y se ejecutan en paralelo.
pub fn cv_fit<C: Classifier>(
    base: &C,
    data: &LabeledSet,
    folds: usize,
    params: &Hyperparameters,
    seed: u64,
) -> Result<CrossValidation<C>> {
    let assignment = split_by_gesture(&data.labels, folds, seed)?;

    let mut results = (0..folds)
        .into_par_iter()
        .map(|fold| {
            let train = data.select(|i| matches!(assignment.sample_folds[i], Some(f) if f != fold));
            let val = data.select(|i| assignment.sample_folds[i] == Some(fold));
            if val.is_empty() {
                return Err(TrainerError::invalid(format!("fold {} is empty", fold)));
            }

            let mut model = base.copy();
            model.fit(
                &train.features,
                &train.labels,
                Some(&val.features),
                Some(&val.labels),
                params,
            )?;
            let accuracy = model.evaluate(&val.features, &val.labels)?;

            Ok(FoldResult {
                fold,
                model,
                accuracy,
                train_size: train.len(),
                val_size: val.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    results.sort_by_key(|r| r.fold);

    Ok(CrossValidation {
        folds: results,
        warning: assignment.warning,
    })
}

/// Ajuste único con una partición entrenamiento/test por repetición
#[derive(Debug, Clone)]
pub struct Holdout<C> {
    pub model: C,
    pub split: TrainTestSplit,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
}

/// Ruta no adaptativa: reserva `test_fraction` de las repeticiones de cada gesto,
/// entrena una copia de `base` validando contra ellas y evalúa ambos lados.
pub fn holdout_fit<C: Classifier>(
    base: &C,
    data: &LabeledSet,
    test_fraction: f64,
    params: &Hyperparameters,
    seed: u64,
) -> Result<Holdout<C>> {
    let split = train_test_split_by_gesture(&data.labels, test_fraction, seed)?;
    let train = data.select(|i| !split.test_groups.contains(&data.labels[i]));
    let test = data.select(|i| split.test_groups.contains(&data.labels[i]));

    let mut model = base.copy();
    model.fit(
        &train.features,
        &train.labels,
        Some(&test.features),
        Some(&test.labels),
        params,
    )?;
    let train_accuracy = model.evaluate(&train.features, &train.labels)?;
    let test_accuracy = model.evaluate(&test.features, &test.labels)?;
    info!(
        "Ajuste offline: {} / {} muestras, precisión {:.2}% (train) {:.2}% (test)",
        train.len(),
        test.len(),
        train_accuracy * 100.0,
        test_accuracy * 100.0
    );

    Ok(Holdout {
        model,
        split,
        train_accuracy,
        test_accuracy,
    })
}

/// Entrenador usado por el controlador online: validación cruzada en cada ronda
/// y un ajuste final sobre todo el dataset contra el conjunto reservado.
pub struct CrossValidationTrainer<C> {
    base: C,
    params: Hyperparameters,
    seed: u64,
    last_round: Option<CrossValidation<C>>,
    final_model: Option<C>,
}

impl<C: Classifier> CrossValidationTrainer<C> {
    pub fn new(base: C, params: Hyperparameters, seed: u64) -> Self {
        Self {
            base,
            params,
            seed,
            last_round: None,
            final_model: None,
        }
    }

    pub fn last_round(&self) -> Option<&CrossValidation<C>> {
        self.last_round.as_ref()
    }

    pub fn final_model(&self) -> Option<&C> {
        self.final_model.as_ref()
    }

    pub fn into_final_model(self) -> Option<C> {
        self.final_model
    }
}

impl<C: Classifier> ModelTrainer for CrossValidationTrainer<C> {
    fn cross_validate(&mut self, data: &LabeledSet, folds: usize) -> Result<CvSummary> {
        let round = cv_fit(&self.base, data, folds, &self.params, self.seed)?;
        let summary = CvSummary {
            accuracies: round.accuracies(),
            discarded: round
                .warning
                .as_ref()
                .map(|w| w.gestures.clone())
                .unwrap_or_default(),
        };
        self.last_round = Some(round);
        Ok(summary)
    }

    fn final_fit(&mut self, data: &LabeledSet, held_out: &LabeledSet) -> Result<f64> {
        let mut model = self.base.copy();
        model.fit(
            &data.features,
            &data.labels,
            Some(&held_out.features),
            Some(&held_out.labels),
            &self.params,
        )?;
        let accuracy = model.evaluate(&held_out.features, &held_out.labels)?;
        info!(
            "Modelo final: {} muestras de entrenamiento, precisión en test {:.2}%",
            data.len(),
            accuracy * 100.0
        );
        self.final_model = Some(model);
        Ok(accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softmax::SoftmaxClassifier;
    use crate::types::GroupKey;

    /// Tres gestos × `reps` repeticiones × 3 ventanas, clusters separados
    fn dataset(reps: usize) -> LabeledSet {
        let centers = [("fist", [2.0, 0.0, 0.0]), ("open", [0.0, 2.0, 0.0]), ("pinch", [0.0, 0.0, 2.0])];
        let mut set = LabeledSet::new();
        for (name, c) in centers {
            for rep in 1..=reps {
                for w in 0..3 {
                    let j = 0.05 * (rep as f32 - w as f32);
                    set.push(
                        vec![c[0] + j, c[1] - j, c[2] + 0.5 * j],
                        GroupKey::new(format!("001_1_1_{}_{}", name, rep)),
                    );
                }
            }
        }
        set
    }

    fn params() -> Hyperparameters {
        Hyperparameters {
            epochs: 40,
            batch_size: 16,
            learning_rate: 0.05,
            ..Hyperparameters::default()
        }
    }

    #[test]
    fn test_k_models_and_k_accuracies() {
        let data = dataset(6);
        let cv = cv_fit(&SoftmaxClassifier::new(), &data, 3, &params(), 42).unwrap();

        assert_eq!(cv.folds.len(), 3);
        assert_eq!(cv.accuracies().len(), 3);
        assert!(cv.accuracies().iter().all(|a| (0.0..=1.0).contains(a)));
        assert!(cv.mean_accuracy() > 0.9);
        for (i, fold) in cv.folds.iter().enumerate() {
            assert_eq!(fold.fold, i);
            assert_eq!(fold.train_size + fold.val_size, data.len());
        }
    }

    #[test]
    fn test_fold_models_are_independent() {
        let data = dataset(6);
        let base = SoftmaxClassifier::new();
        let cv = cv_fit(&base, &data, 3, &params(), 42).unwrap();

        let models: Vec<_> = cv.models().collect();
        assert_ne!(models[0].weights(), models[1].weights());
        assert_ne!(models[1].weights(), models[2].weights());
        // la base no se entrena
        assert!(!base.is_fitted());
    }

    #[test]
    fn test_discarded_gesture_reported() {
        let mut data = dataset(4);
        data.push(vec![5.0, 5.0, 5.0], GroupKey::from("001_1_1_wave_1"));
        let cv = cv_fit(&SoftmaxClassifier::new(), &data, 4, &params(), 42).unwrap();
        let warning = cv.warning.expect("wave tiene una sola repetición");
        assert_eq!(warning.gestures, vec!["wave".to_string()]);
        assert!(cv.folds.iter().all(|f| f.model.class_names().len() == 3));
    }

    #[test]
    fn test_holdout_fit_evaluates_both_sides() {
        let data = dataset(10);
        let holdout = holdout_fit(&SoftmaxClassifier::new(), &data, 0.2, &params(), 42).unwrap();

        // 2 repeticiones × 3 gestos × 3 ventanas reservadas
        assert_eq!(holdout.split.test.len(), 18);
        assert_eq!(holdout.split.train.len(), data.len() - 18);
        assert!(holdout.train_accuracy > 0.9);
        assert!(holdout.test_accuracy > 0.9);
        assert_eq!(holdout.model.class_names(), &["fist", "open", "pinch"]);
        assert!(holdout.model.history().has_validation());
    }

    #[test]
    fn test_trainer_final_fit_keeps_model() {
        let data = dataset(4);
        let held_out = dataset(1);
        let mut trainer = CrossValidationTrainer::new(SoftmaxClassifier::new(), params(), 42);

        let summary = trainer.cross_validate(&data, 2).unwrap();
        assert_eq!(summary.accuracies.len(), 2);
        assert!(trainer.last_round().is_some());

        let accuracy = trainer.final_fit(&data, &held_out).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        let model = trainer.into_final_model().unwrap();
        assert!(model.history().has_validation());
    }
}
