//! Controlador de entrenamiento online.
//!
//! Dos hilos comparten un único estado protegido por un mutex:
//! - adquisición: graba bloques de repeticiones y los añade al dataset mientras la
//!   precisión no alcance el umbral; el primer bloque grabado después se reserva
//!   como test final y se activa `terminate`.
//! - entrenamiento: cada vez que hay datos nuevos hace validación cruzada sobre
//!   todo el dataset; con `terminate` hace un único ajuste final y termina.
//!
//! Las secciones críticas solo copian o asignan; el entrenamiento corre fuera del
//! lock sobre una copia barata del dataset.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AcquisitionConfig, FoldSchedule, TrainerConfig};
use crate::error::{Result, TrainerError};
use crate::types::{Dataset, LabeledSet};

/// Colaborador de adquisición: experimento + dispositivo + extracción
pub trait RepetitionSource: Send {
    /// Bloquea hasta completar un bloque de repeticiones y devuelve sus muestras
    fn record_block(&mut self, config: &AcquisitionConfig) -> anyhow::Result<LabeledSet>;
}

/// Resumen de una ronda de validación cruzada
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CvSummary {
    pub accuracies: Vec<f64>,
    pub discarded: Vec<String>,
}

impl CvSummary {
    pub fn mean(&self) -> f64 {
        if self.accuracies.is_empty() {
            return 0.0;
        }
        self.accuracies.iter().sum::<f64>() / self.accuracies.len() as f64
    }
}

/// Lo que el rol de entrenamiento necesita de un modelo
pub trait ModelTrainer: Send {
    fn cross_validate(&mut self, data: &LabeledSet, folds: usize) -> Result<CvSummary>;

    /// Ajuste final sobre todo el dataset, validando y evaluando con `held_out`
    fn final_fit(&mut self, data: &LabeledSet, held_out: &LabeledSet) -> Result<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvRound {
    pub run_count: usize,
    pub folds: usize,
    pub samples: usize,
    pub accuracies: Vec<f64>,
    pub mean_accuracy: f64,
    pub discarded: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionReport {
    pub rounds: Vec<CvRound>,
    pub runs_collected: usize,
    pub final_accuracy: Option<f64>,
    pub held_out_size: usize,
}

pub struct SessionOutcome<T> {
    pub report: SessionReport,
    pub trainer: T,
}

type RoundCallback = Box<dyn Fn(&CvRound) + Send + Sync>;

#[derive(Default)]
struct SharedState {
    dataset: Dataset,
    run_count: usize,
    accuracy: f64,
    has_new_data: bool,
    terminate: bool,
    /// Uno de los roles terminó con error; el otro sale en su próximo punto de control
    halted: bool,
    held_out: Option<LabeledSet>,
}

/// Marca `halted` si el rol sale sin haber terminado normalmente (error o pánico)
struct HaltGuard<'a> {
    state: &'a Mutex<SharedState>,
    completed: bool,
}

impl Drop for HaltGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.state.lock().halted = true;
        }
    }
}

/// Lectura atómica de los flags del rol de entrenamiento
struct TrainingTick {
    has_new_data: bool,
    terminate: bool,
    halted: bool,
    run_count: usize,
    dataset: Dataset,
    held_out: Option<LabeledSet>,
}

pub struct OnlineTrainer {
    config: TrainerConfig,
    on_round: Option<Arc<RoundCallback>>,
}

impl OnlineTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            on_round: None,
        }
    }

    /// Se invoca desde el hilo de entrenamiento tras publicar cada precisión
    pub fn on_round<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CvRound) + Send + Sync + 'static,
    {
        self.on_round = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Lanza ambos roles y espera a que terminen
    pub fn run<S, T>(&self, source: S, trainer: T) -> Result<SessionOutcome<T>>
    where
        S: RepetitionSource + 'static,
        T: ModelTrainer + 'static,
    {
        self.config.validate()?;
        let state = Arc::new(Mutex::new(SharedState::default()));

        let acquisition = {
            let state = Arc::clone(&state);
            let config = self.config.acquisition.clone();
            let threshold = self.config.stop_threshold;
            thread::Builder::new()
                .name("adquisicion".to_string())
                .spawn(move || acquisition_loop(source, &config, threshold, &state))?
        };

        let training = {
            let state = Arc::clone(&state);
            let schedule = self.config.folds.clone();
            let poll = self.config.poll_interval();
            let on_round = self.on_round.clone();
            thread::Builder::new()
                .name("entrenamiento".to_string())
                .spawn(move || training_loop(trainer, &schedule, poll, &state, on_round))?
        };

        // ambos hilos se recogen antes de propagar cualquier error
        let acquisition = acquisition.join();
        let training = training.join();
        let acquisition = acquisition.map_err(|_| TrainerError::WorkerPanicked("acquisition"))?;
        let training = training.map_err(|_| TrainerError::WorkerPanicked("training"))?;

        let runs_collected = acquisition?;
        let (trainer, rounds, final_accuracy) = training?;
        let held_out_size = state.lock().held_out.as_ref().map_or(0, LabeledSet::len);

        Ok(SessionOutcome {
            report: SessionReport {
                rounds,
                runs_collected,
                final_accuracy,
                held_out_size,
            },
            trainer,
        })
    }
}

fn acquisition_loop<S: RepetitionSource>(
    mut source: S,
    config: &AcquisitionConfig,
    threshold: f64,
    state: &Mutex<SharedState>,
) -> Result<usize> {
    let mut guard = HaltGuard {
        state,
        completed: false,
    };

    loop {
        info!("🎬 Grabando bloque de repeticiones ({} por gesto)", config.repetitions);
        let block = source
            .record_block(config)
            .map_err(TrainerError::Acquisition)?;

        let mut s = state.lock();
        if s.halted {
            warn!("El entrenamiento se detuvo; fin de la adquisición");
            guard.completed = true;
            return Ok(s.run_count);
        }

        if block.is_empty() {
            drop(s);
            warn!("Bloque sin muestras; se descarta");
            continue;
        }

        if s.accuracy < threshold {
            s.run_count += 1;
            let run = s.run_count;
            let samples = block.len();
            s.dataset.append(run, block);
            s.has_new_data = true;
            info!(
                "Run {} añadido ({} muestras, {} acumuladas)",
                run,
                samples,
                s.dataset.len()
            );
        } else {
            info!(
                "La precisión del modelo ({:.2}%) alcanzó el umbral de {:.0}%; terminando la adquisición",
                s.accuracy * 100.0,
                threshold * 100.0
            );
            s.held_out = Some(block);
            s.terminate = true;
            guard.completed = true;
            return Ok(s.run_count);
        }
    }
}

fn training_loop<T: ModelTrainer>(
    mut trainer: T,
    schedule: &FoldSchedule,
    poll: Duration,
    state: &Mutex<SharedState>,
    on_round: Option<Arc<RoundCallback>>,
) -> Result<(T, Vec<CvRound>, Option<f64>)> {
    let mut guard = HaltGuard {
        state,
        completed: false,
    };
    let mut rounds = Vec::new();

    loop {
        let tick = {
            let mut s = state.lock();
            let has_new_data = std::mem::take(&mut s.has_new_data);
            TrainingTick {
                has_new_data,
                terminate: s.terminate,
                halted: s.halted,
                run_count: s.run_count,
                dataset: s.dataset.clone(),
                held_out: if s.terminate { s.held_out.clone() } else { None },
            }
        };

        if tick.has_new_data {
            let data = tick.dataset.to_labeled_set();
            let folds = schedule.folds_for(tick.run_count);
            info!(
                "Comenzando entrenamiento: {} muestras, run {}, {} folds",
                data.len(),
                tick.run_count,
                folds
            );

            let summary = match trainer.cross_validate(&data, folds) {
                Ok(summary) => summary,
                Err(TrainerError::NoUsableGroups { folds, discarded }) => {
                    warn!(
                        "Ningún gesto tiene {} repeticiones todavía ({:?}); se espera más datos",
                        folds, discarded
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mean_accuracy = summary.mean();
            state.lock().accuracy = mean_accuracy;
            info!("📈 Precisión media del modelo: {:.2}%", mean_accuracy * 100.0);

            let round = CvRound {
                run_count: tick.run_count,
                folds,
                samples: data.len(),
                accuracies: summary.accuracies,
                mean_accuracy,
                discarded: summary.discarded,
            };
            if let Some(callback) = &on_round {
                callback(&round);
            }
            rounds.push(round);
        } else if tick.terminate {
            let held_out = tick.held_out.ok_or_else(|| {
                TrainerError::invalid("terminate set without a held-out block")
            })?;
            let data = tick.dataset.to_labeled_set();
            info!(
                "Ajuste final: {} muestras de entrenamiento, {} de test",
                data.len(),
                held_out.len()
            );
            let accuracy = trainer.final_fit(&data, &held_out)?;
            guard.completed = true;
            return Ok((trainer, rounds, Some(accuracy)));
        } else if tick.halted {
            warn!("La adquisición se detuvo sin alcanzar el umbral; no hay ajuste final");
            guard.completed = true;
            return Ok((trainer, rounds, None));
        } else {
            thread::sleep(poll);
        }
    }
}
