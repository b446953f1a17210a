//! Partición en K folds agrupada por repetición y estratificada por gesto.
//!
//! Cada clave completa (una repetición) cae entera en un único fold, de modo que
//! ventanas de la misma repetición nunca aparecen a la vez en entrenamiento y
//! validación. Los gestos con menos de K repeticiones se descartan y se informa.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

use crate::error::{Result, TrainerError};
use crate::types::GroupKey;

/// Aviso no fatal: gestos sin repeticiones suficientes para K folds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientRepetitions {
    pub folds: usize,
    pub gestures: Vec<String>,
}

impl fmt::Display for InsufficientRepetitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} gesture(s) with fewer than {} repetitions discarded: {:?}",
            self.gestures.len(),
            self.folds,
            self.gestures
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldAssignment {
    pub folds: usize,
    /// Fold de cada muestra, en el orden de entrada; `None` si su gesto se descartó
    pub sample_folds: Vec<Option<usize>>,
    pub group_folds: BTreeMap<GroupKey, usize>,
    pub warning: Option<InsufficientRepetitions>,
}

impl FoldAssignment {
    pub fn discarded(&self) -> &[String] {
        self.warning
            .as_ref()
            .map(|w| w.gestures.as_slice())
            .unwrap_or(&[])
    }

    /// Número de repeticiones (claves) en cada fold
    pub fn groups_per_fold(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.folds];
        for &fold in self.group_folds.values() {
            sizes[fold] += 1;
        }
        sizes
    }
}

/// Asigna cada clave de agrupación a un fold en `0..folds`.
///
/// Dentro de cada gesto las claves se barajan con `seed` y se reparten en
/// rotación; el punto de inicio avanza de un gesto al siguiente para que el
/// tamaño total de los folds quede equilibrado.
pub fn split_by_gesture(labels: &[GroupKey], folds: usize, seed: u64) -> Result<FoldAssignment> {
    if folds < 2 {
        return Err(TrainerError::invalid(format!(
            "fold count must be at least 2, got {}",
            folds
        )));
    }

    // Claves únicas agrupadas por gesto (BTreeMap/BTreeSet → orden determinista)
    let mut by_gesture: BTreeMap<&str, Vec<&GroupKey>> = BTreeMap::new();
    for key in labels.iter().collect::<BTreeSet<_>>() {
        by_gesture.entry(key.gesture()).or_default().push(key);
    }

    let discarded: Vec<String> = by_gesture
        .iter()
        .filter(|(_, keys)| keys.len() < folds)
        .map(|(name, _)| name.to_string())
        .collect();
    by_gesture.retain(|_, keys| keys.len() >= folds);

    let warning = if discarded.is_empty() {
        None
    } else {
        let w = InsufficientRepetitions {
            folds,
            gestures: discarded,
        };
        warn!("{}; excluidos de esta ronda", w);
        Some(w)
    };

    if by_gesture.is_empty() {
        return Err(TrainerError::NoUsableGroups {
            folds,
            discarded: warning.map(|w| w.gestures).unwrap_or_default(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut group_folds = BTreeMap::new();
    let mut offset = 0usize;
    for keys in by_gesture.values_mut() {
        keys.shuffle(&mut rng);
        for (i, key) in keys.iter().enumerate() {
            group_folds.insert((*key).clone(), (offset + i) % folds);
        }
        offset = (offset + keys.len()) % folds;
    }

    let sample_folds = labels.iter().map(|l| group_folds.get(l).copied()).collect();

    Ok(FoldAssignment {
        folds,
        sample_folds,
        group_folds,
        warning,
    })
}

/// Partición entrenamiento/test del ajuste offline, índices en orden de entrada
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub test_groups: BTreeSet<GroupKey>,
    /// Gestos con una sola repetición; solo aparecen en entrenamiento
    pub train_only: Vec<String>,
}

/// Reserva para test una fracción de las repeticiones de cada gesto.
///
/// Cada gesto con `n >= 2` repeticiones aporta `round(n * test_fraction)`
/// de ellas, acotado a `1..=n-1`, así que todo gesto queda a ambos lados y
/// ninguna repetición se parte.
pub fn train_test_split_by_gesture(
    labels: &[GroupKey],
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TrainerError::invalid(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut by_gesture: BTreeMap<&str, Vec<&GroupKey>> = BTreeMap::new();
    for key in labels.iter().collect::<BTreeSet<_>>() {
        by_gesture.entry(key.gesture()).or_default().push(key);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut test_groups = BTreeSet::new();
    let mut train_only = Vec::new();
    for (gesture, keys) in by_gesture.iter_mut() {
        if keys.len() < 2 {
            train_only.push(gesture.to_string());
            continue;
        }
        keys.shuffle(&mut rng);
        let n_test = ((keys.len() as f64 * test_fraction).round() as usize).clamp(1, keys.len() - 1);
        test_groups.extend(keys[..n_test].iter().map(|k| (*k).clone()));
    }

    if !train_only.is_empty() {
        warn!("Gestos con una sola repetición, solo en entrenamiento: {:?}", train_only);
    }
    if test_groups.is_empty() {
        return Err(TrainerError::invalid(
            "no gesture has the two repetitions needed for a train/test split",
        ));
    }

    let (test, train): (Vec<usize>, Vec<usize>) =
        (0..labels.len()).partition(|&i| test_groups.contains(&labels[i]));

    Ok(TrainTestSplit {
        train,
        test,
        test_groups,
        train_only,
    })
}
