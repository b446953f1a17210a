use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TrainerError};

/// Parámetros del colaborador de adquisición (experimento + dispositivo)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub host: String,
    pub port: u16,
    /// Si el streaming se interrumpe este tiempo, se aborta el bloque
    pub timeout_secs: u64,
    /// Repeticiones de cada gesto por bloque
    pub repetitions: u32,
    /// Segundos que se muestra cada imagen de estímulo
    pub image_secs: f32,
    pub instruction_secs: f32,
    pub relax_secs: f32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 20001,
            timeout_secs: 30,
            repetitions: 2,
            image_secs: 3.0,
            instruction_secs: 2.0,
            relax_secs: 0.5,
        }
    }
}

/// Regla de crecimiento del número de folds: `min(max, growth * runs)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldSchedule {
    pub growth: usize,
    pub max_folds: usize,
    pub seed: u64,
}

impl FoldSchedule {
    pub fn folds_for(&self, run_count: usize) -> usize {
        self.max_folds.min(self.growth.saturating_mul(run_count))
    }
}

impl Default for FoldSchedule {
    fn default() -> Self {
        Self {
            growth: 2,
            max_folds: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub l2_weight: f32,
    /// StepLR: cada cuántas épocas se multiplica el lr por `lr_gamma`
    pub lr_step: usize,
    pub lr_gamma: f32,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            epochs: 200,
            batch_size: 64,
            learning_rate: 0.001,
            l2_weight: 0.0001,
            lr_step: 100,
            lr_gamma: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub vote_over: usize,
    pub max_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl PredictorConfig {
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            vote_over: 10,
            max_timeout_ms: 15_000,
            poll_interval_ms: 100,
        }
    }
}

/// Configuración de preprocesado; viaja con el modelo exportado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub sample_rate: f32,
    pub low_freq: f32,
    pub high_freq: f32,
    /// Muestras por ventana
    pub window_size: usize,
    /// Desplazamiento entre ventanas consecutivas
    pub window_step: usize,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 250.0,
            low_freq: 35.0,
            high_freq: 124.0,
            window_size: 50,
            window_step: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub acquisition: AcquisitionConfig,
    /// Espera del rol de entrenamiento cuando no hay datos nuevos
    pub poll_interval_ms: u64,
    /// Precisión media a partir de la cual se deja de adquirir
    pub stop_threshold: f64,
    pub folds: FoldSchedule,
    pub hyperparameters: Hyperparameters,
    pub predictor: PredictorConfig,
    pub preprocessing: PreprocessingConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            poll_interval_ms: 10_000,
            stop_threshold: 0.9,
            folds: FoldSchedule::default(),
            hyperparameters: Hyperparameters::default(),
            predictor: PredictorConfig::default(),
            preprocessing: PreprocessingConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Carga la configuración desde JSON; los campos ausentes toman el valor por defecto
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TrainerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stop_threshold > 0.0 && self.stop_threshold <= 1.0) {
            return Err(TrainerError::invalid(format!(
                "stop_threshold must be in (0, 1], got {}",
                self.stop_threshold
            )));
        }
        if self.folds.max_folds < 2 || self.folds.growth == 0 {
            return Err(TrainerError::invalid(
                "fold schedule needs max_folds >= 2 and growth >= 1",
            ));
        }
        let hp = &self.hyperparameters;
        if hp.epochs == 0 || hp.batch_size == 0 || hp.learning_rate <= 0.0 || hp.l2_weight < 0.0 {
            return Err(TrainerError::invalid(
                "epochs, batch_size and learning_rate must be positive, l2_weight non-negative",
            ));
        }
        if self.predictor.vote_over == 0 {
            return Err(TrainerError::invalid("vote_over must be at least 1"));
        }
        let pre = &self.preprocessing;
        if pre.window_size == 0 || pre.window_step == 0 {
            return Err(TrainerError::invalid("window_size and window_step must be positive"));
        }
        if !(pre.low_freq >= 0.0 && pre.low_freq < pre.high_freq && pre.high_freq <= pre.sample_rate / 2.0) {
            return Err(TrainerError::invalid(format!(
                "frequency band [{}, {}] Hz must lie below Nyquist ({} Hz)",
                pre.low_freq,
                pre.high_freq,
                pre.sample_rate / 2.0
            )));
        }
        Ok(())
    }
}
