use std::collections::VecDeque;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::config::PredictorConfig;
use crate::error::{Result, TrainerError};
use crate::types::FeatureVector;

/// Fuente de vectores de características en vivo.
/// `is_connected` y `has_data` no deben bloquear.
pub trait FeatureSource {
    fn is_connected(&self) -> bool;

    /// Ha entregado (o tiene pendiente) al menos una muestra
    fn has_data(&self) -> bool;

    /// Bloquea hasta el siguiente vector de características
    fn next_features(&mut self) -> Result<FeatureVector>;
}

/// Resultado de una votación
#[derive(Debug, Clone, PartialEq)]
pub enum Vote {
    /// El buffer aún no tiene `vote_over` predicciones
    Loading,
    Decided { gesture: String, confidence: f64 },
}

impl Vote {
    pub fn confidence(&self) -> f64 {
        match self {
            Vote::Loading => 1.0,
            Vote::Decided { confidence, .. } => *confidence,
        }
    }

    pub fn gesture(&self) -> Option<&str> {
        match self {
            Vote::Loading => None,
            Vote::Decided { gesture, .. } => Some(gesture),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Vote::Loading)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vote::Loading => write!(f, "loading"),
            Vote::Decided { gesture, confidence } => {
                write!(f, "{} ({:.0}%)", gesture, confidence * 100.0)
            }
        }
    }
}

/// Espera a que la fuente esté conectada y haya entregado datos.
///
/// Nunca duerme más allá de `max_timeout`. Si se agota el plazo devuelve
/// `ConnectionTimeout` si la fuente nunca llegó a conectarse, y `DataTimeout`
/// si se conectó pero no llegaron datos.
pub fn wait_until_live<S: FeatureSource + ?Sized>(
    source: &S,
    max_timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let start = Instant::now();
    let mut ever_connected = false;

    loop {
        let connected = source.is_connected();
        ever_connected |= connected;
        if connected && source.has_data() {
            info!("✅ Fuente conectada tras {:?}", start.elapsed());
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= max_timeout {
            return Err(if ever_connected {
                TrainerError::DataTimeout {
                    timeout: max_timeout,
                }
            } else {
                TrainerError::ConnectionTimeout {
                    timeout: max_timeout,
                }
            });
        }

        debug!(connected, "Esperando a la fuente de datos...");
        thread::sleep(poll_interval.min(max_timeout - elapsed));
    }
}

/// Clasificador entrenado + supervisión de la conexión + voto por mayoría
pub struct RealTimePredictor<S, C> {
    source: S,
    classifier: C,
    vote_over: usize,
    buffer: VecDeque<String>,
}

impl<S: FeatureSource, C: Classifier> RealTimePredictor<S, C> {
    /// Verifica la conexión antes de devolver el predictor
    pub fn connect(source: S, classifier: C, config: &PredictorConfig) -> Result<Self> {
        if config.vote_over == 0 {
            return Err(TrainerError::invalid("vote_over must be at least 1"));
        }
        if classifier.class_names().is_empty() {
            return Err(TrainerError::NotFitted);
        }

        wait_until_live(&source, config.max_timeout(), config.poll_interval())?;

        Ok(Self {
            source,
            classifier,
            vote_over: config.vote_over,
            buffer: VecDeque::with_capacity(config.vote_over + 1),
        })
    }

    /// Clasifica la siguiente ventana y devuelve la decisión suavizada
    pub fn vote(&mut self) -> Result<Vote> {
        let features = self.source.next_features()?;
        let prediction = self.classifier.classify_one(&features)?;

        self.buffer.push_back(prediction);
        if self.buffer.len() > self.vote_over {
            self.buffer.pop_front();
        }

        if self.buffer.len() < self.vote_over {
            return Ok(Vote::Loading);
        }

        let (gesture, count) = majority(&self.buffer);
        Ok(Vote::Decided {
            gesture,
            confidence: count as f64 / self.vote_over as f64,
        })
    }

    pub fn vote_over(&self) -> usize {
        self.vote_over
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Etiqueta más frecuente; en empate gana la que entró antes al buffer
fn majority(buffer: &VecDeque<String>) -> (String, usize) {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for label in buffer {
        match counts.iter_mut().find(|(l, _)| *l == label.as_str()) {
            Some((_, c)) => *c += 1,
            None => counts.push((label.as_str(), 1)),
        }
    }

    let mut best = ("", 0usize);
    for (label, count) in counts {
        if count > best.1 {
            best = (label, count);
        }
    }
    (best.0.to_string(), best.1)
}
