use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use csv::ReaderBuilder;
use tracing::info;

use crate::config::{AcquisitionConfig, PreprocessingConfig};
use crate::controller::RepetitionSource;
use crate::feature_extractor::{EmgFeatureExtractor, WindowFeatures};
use crate::types::{GroupKey, LabeledSet, RawSample};
use crate::window_buffer::sliding_windows;

/// Longitud máxima de una repetición tras rellenar huecos (~17 min a 1 kHz)
pub const MAX_REPETITION_SAMPLES: usize = 1_000_000;

/// Una repetición grabada: su clave completa y las muestras crudas en orden
#[derive(Debug, Clone, PartialEq)]
pub struct Repetition {
    pub key: GroupKey,
    pub samples: Vec<RawSample>,
}

/// Bloque grabado, repeticiones en orden de aparición
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    pub channels: usize,
    pub repetitions: Vec<Repetition>,
}

impl Recording {
    /// Todas las muestras crudas, repetición tras repetición
    pub fn samples(&self) -> impl Iterator<Item = &RawSample> {
        self.repetitions.iter().flat_map(|r| r.samples.iter())
    }

    pub fn len(&self) -> usize {
        self.repetitions.iter().map(|r| r.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.repetitions.is_empty()
    }
}

/// Carga un bloque grabado en el formato `label,sample,ch0,ch1,...`.
/// `sample` es el índice de la muestra dentro de su repetición.
pub fn load_recording(path: impl AsRef<Path>) -> Result<Recording> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut order: Vec<GroupKey> = Vec::new();
    let mut rows: BTreeMap<GroupKey, BTreeMap<usize, RawSample>> = BTreeMap::new();
    let mut channels = None;

    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        if record.len() < 3 {
            bail!("La fila {} necesita label, sample y al menos un canal", row_idx + 1);
        }

        let width = record.len() - 2;
        match channels {
            None => channels = Some(width),
            Some(c) => ensure!(
                c == width,
                "La fila {} tiene {} canales, se esperaban {}",
                row_idx + 1,
                width,
                c
            ),
        }

        let key = GroupKey::new(record[0].trim());
        let sample: usize = record[1]
            .trim()
            .parse()
            .with_context(|| format!("sample inválido en fila {}", row_idx + 1))?;
        let values = record
            .iter()
            .skip(2)
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<RawSample, _>>()
            .with_context(|| format!("valor de canal inválido en fila {}", row_idx + 1))?;

        if !rows.contains_key(&key) {
            order.push(key.clone());
        }
        rows.entry(key).or_default().insert(sample, values);
    }

    let Some(channels) = channels else {
        bail!("El CSV {:?} no contiene datos", path);
    };

    let mut repetitions = Vec::with_capacity(order.len());
    for key in order {
        let Some(indexed) = rows.remove(&key) else {
            continue;
        };
        let samples = fill_gaps(indexed)
            .with_context(|| format!("Repetición {} inválida en {:?}", key, path))?;
        repetitions.push(Repetition { key, samples });
    }

    Ok(Recording {
        channels,
        repetitions,
    })
}

/// Ordena por índice y rellena huecos repitiendo la última muestra válida
fn fill_gaps(indexed: BTreeMap<usize, RawSample>) -> Result<Vec<RawSample>> {
    let first = indexed.keys().next().copied().unwrap_or(0);
    let last = indexed.keys().next_back().copied().unwrap_or(0);

    let span = last
        .checked_sub(first)
        .and_then(|d| d.checked_add(1))
        .with_context(|| format!("Rango de sample desbordado ({}..={})", first, last))?;
    ensure!(
        span <= MAX_REPETITION_SAMPLES,
        "La repetición abarca {} muestras (sample {}..={}), máximo {}",
        span,
        first,
        last,
        MAX_REPETITION_SAMPLES
    );

    let mut samples = Vec::with_capacity(span);
    let mut previous: Option<&RawSample> = None;
    for idx in first..=last {
        if let Some(sample) = indexed.get(&idx) {
            previous = Some(sample);
        }
        if let Some(sample) = previous {
            samples.push(sample.clone());
        }
    }
    Ok(samples)
}

/// Ventanea cada repetición y extrae un vector de características por ventana
pub fn recording_to_samples<E: WindowFeatures>(
    recording: &Recording,
    preprocessing: &PreprocessingConfig,
    extractor: &mut E,
) -> Result<LabeledSet> {
    let mut set = LabeledSet::new();
    for repetition in &recording.repetitions {
        for window in sliding_windows(
            &repetition.samples,
            preprocessing.window_size,
            preprocessing.window_step,
        ) {
            let features = extractor
                .extract(&window)
                .with_context(|| format!("Extracción fallida en {}", repetition.key))?;
            set.push(features, repetition.key.clone());
        }
    }
    Ok(set)
}

/// Fuente de adquisición que reproduce bloques ya grabados, uno por llamada
pub struct CsvBlockSource {
    files: VecDeque<PathBuf>,
    preprocessing: PreprocessingConfig,
    extractor: EmgFeatureExtractor,
}

impl CsvBlockSource {
    pub fn new(files: impl IntoIterator<Item = PathBuf>, preprocessing: PreprocessingConfig) -> Self {
        let extractor = EmgFeatureExtractor::new(&preprocessing);
        Self {
            files: files.into_iter().collect(),
            preprocessing,
            extractor,
        }
    }

    /// Todos los `*.csv` del directorio, en orden alfabético
    pub fn from_dir(dir: impl AsRef<Path>, preprocessing: PreprocessingConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("No se pudo leer {:?}", dir))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                files.push(path);
            }
        }
        ensure!(!files.is_empty(), "No hay bloques .csv en {:?}", dir);
        files.sort();
        Ok(Self::new(files, preprocessing))
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl RepetitionSource for CsvBlockSource {
    fn record_block(&mut self, _config: &AcquisitionConfig) -> Result<LabeledSet> {
        let Some(path) = self.files.pop_front() else {
            bail!("No quedan bloques grabados");
        };
        let recording = load_recording(&path)?;
        let samples = recording_to_samples(&recording, &self.preprocessing, &mut self.extractor)?;
        info!(
            "📂 Bloque {:?}: {} repeticiones, {} ventanas",
            path.file_name().unwrap_or_default(),
            recording.repetitions.len(),
            samples.len()
        );
        Ok(samples)
    }
}
