use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Vector de características de longitud fija, uno por ventana
pub type FeatureVector = Vec<f32>;

/// Una muestra cruda del dispositivo: un valor por canal EMG
pub type RawSample = Vec<f32>;

/// Ventana cruda: [muestras x canales]
pub type RawWindow = Vec<RawSample>;

/// Elimina los prefijos/sufijos numéricos (dígitos y '_') de una etiqueta completa.
///
/// `001_1_1_fist_3` → `fist`, `fist_7` → `fist`, `fist` → `fist`.
pub fn strip_gesture(label: &str) -> &str {
    label.trim_matches(|c: char| c == '_' || c.is_ascii_digit())
}

/// Etiqueta completa de una repetición (clave de agrupación)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identidad del gesto, sin números de sujeto/sesión/repetición
    pub fn gesture(&self) -> &str {
        strip_gesture(&self.0)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupKey {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for GroupKey {
    fn from(label: String) -> Self {
        Self(label)
    }
}

/// Forma estructurada de una etiqueta de repetición
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepetitionLabel {
    pub subject: u32,
    pub position: u32,
    pub session: u32,
    pub trial: u32,
    pub gesture: String,
    pub repetition: u32,
}

impl RepetitionLabel {
    /// Formato: `{sujeto:03}_{posición}_{sesión}_{prueba}_{gesto}_{repetición}`
    pub fn key(&self) -> GroupKey {
        GroupKey(format!(
            "{:03}_{}_{}_{}_{}_{}",
            self.subject, self.position, self.session, self.trial, self.gesture, self.repetition
        ))
    }
}

/// Conjunto columnar de muestras etiquetadas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledSet {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<GroupKey>,
}

impl LabeledSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: FeatureVector, label: GroupKey) {
        self.features.push(features);
        self.labels.push(label);
    }

    pub fn extend(&mut self, other: &LabeledSet) {
        self.features.extend(other.features.iter().cloned());
        self.labels.extend(other.labels.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Copia las filas cuyos índices cumplen el predicado
    pub fn select(&self, mut keep: impl FnMut(usize) -> bool) -> LabeledSet {
        let mut out = LabeledSet::new();
        for (idx, (features, label)) in self.features.iter().zip(&self.labels).enumerate() {
            if keep(idx) {
                out.push(features.clone(), label.clone());
            }
        }
        out
    }

    /// Claves de agrupación únicas, en orden
    pub fn group_keys(&self) -> BTreeSet<&GroupKey> {
        self.labels.iter().collect()
    }

    /// Nombres de gesto únicos, en orden
    pub fn gesture_classes(&self) -> BTreeSet<&str> {
        self.labels.iter().map(GroupKey::gesture).collect()
    }
}

/// Lote añadido por una ejecución de adquisición
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub run: usize,
    pub samples: LabeledSet,
}

/// Dataset acumulado. Solo admite añadir lotes; los lotes ya añadidos no se tocan,
/// así que clonar el dataset es barato y una copia nunca ve lotes posteriores.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    batches: Vec<Arc<Batch>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, run: usize, samples: LabeledSet) {
        self.batches.push(Arc::new(Batch { run, samples }));
    }

    pub fn batches(&self) -> &[Arc<Batch>] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.iter().map(|b| b.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aplana todos los lotes en un único conjunto (en orden de llegada)
    pub fn to_labeled_set(&self) -> LabeledSet {
        let mut out = LabeledSet::new();
        for batch in &self.batches {
            out.extend(&batch.samples);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_gesture_suffixes() {
        assert_eq!(strip_gesture("fist_7"), "fist");
        assert_eq!(strip_gesture("001_1_1_fist_10"), "fist");
        assert_eq!(strip_gesture("fist"), "fist");
        assert_eq!(strip_gesture(strip_gesture("fist_7")), "fist");
    }

    #[test]
    fn test_strip_keeps_inner_separators() {
        assert_eq!(strip_gesture("002_1_1_0_thumbs_up_4"), "thumbs_up");
        assert_eq!(strip_gesture("003_1_1_0_zoom-in_1"), "zoom-in");
    }

    #[test]
    fn test_repetition_label_key() {
        let label = RepetitionLabel {
            subject: 1,
            position: 1,
            session: 2,
            trial: 0,
            gesture: "fist".to_string(),
            repetition: 3,
        };
        let key = label.key();
        assert_eq!(key.as_str(), "001_1_2_0_fist_3");
        assert_eq!(key.gesture(), "fist");
    }

    #[test]
    fn test_dataset_snapshot_unaffected_by_append() {
        let mut dataset = Dataset::new();
        let mut batch = LabeledSet::new();
        batch.push(vec![1.0], GroupKey::from("fist_1"));
        dataset.append(1, batch.clone());

        let snapshot = dataset.clone();
        dataset.append(2, batch);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.batches()[1].run, 2);
        assert!(Arc::ptr_eq(&snapshot.batches()[0], &dataset.batches()[0]));
    }

    #[test]
    fn test_select_and_classes() {
        let mut set = LabeledSet::new();
        set.push(vec![0.0], GroupKey::from("001_fist_1"));
        set.push(vec![1.0], GroupKey::from("001_open_1"));
        set.push(vec![2.0], GroupKey::from("001_fist_2"));

        let fists = set.select(|idx| set.labels[idx].gesture() == "fist");
        assert_eq!(fists.len(), 2);
        assert_eq!(fists.features[1], vec![2.0]);
        assert_eq!(set.gesture_classes().into_iter().collect::<Vec<_>>(), vec!["fist", "open"]);
        assert_eq!(set.group_keys().len(), 3);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_strip_gesture_idempotent(label in "[a-z0-9_]{0,24}|\\PC{0,24}") {
            let once = strip_gesture(&label);
            prop_assert_eq!(strip_gesture(once), once);
        }

        #[test]
        fn test_key_recovers_gesture(
            gesture in "[a-zA-Z]([a-zA-Z0-9_-]{0,12}[a-zA-Z])?",
            subject in 0u32..1000,
            position in any::<u32>(),
            session in any::<u32>(),
            trial in any::<u32>(),
            repetition in any::<u32>(),
        ) {
            let label = RepetitionLabel {
                subject,
                position,
                session,
                trial,
                gesture: gesture.clone(),
                repetition,
            };
            let key = label.key();
            prop_assert_eq!(key.gesture(), gesture.as_str());
        }

        #[test]
        fn test_same_label_same_gesture(label in "[a-z0-9_]{1,24}", copies in 2usize..6) {
            let mut set = LabeledSet::new();
            for i in 0..copies {
                set.push(vec![i as f32], GroupKey::new(label.clone()));
            }
            prop_assert_eq!(set.gesture_classes().len(), 1);
        }
    }
}
