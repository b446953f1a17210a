//! Fuente de streaming de referencia.
//!
//! El productor (dispositivo, replay de un CSV...) envía muestras crudas por un
//! canal `crossbeam_channel` a través de [`StreamHandle`] y marca el estado de la
//! conexión con un flag atómico. [`ChannelStream`] es el extremo consumidor y
//! [`WindowedStream`] lo convierte en una [`FeatureSource`] para el predictor.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TrainerError};
use crate::feature_extractor::WindowFeatures;
use crate::predictor::FeatureSource;
use crate::types::{FeatureVector, RawSample};
use crate::window_buffer::WindowBuffer;

/// Extremo productor
#[derive(Clone)]
pub struct StreamHandle {
    tx: Sender<RawSample>,
    connected: Arc<AtomicBool>,
}

impl StreamHandle {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn send(&self, sample: RawSample) -> Result<()> {
        self.tx.send(sample).map_err(|_| TrainerError::StreamClosed)
    }
}

/// Extremo consumidor
pub struct ChannelStream {
    rx: Receiver<RawSample>,
    connected: Arc<AtomicBool>,
    delivered: bool,
    read_timeout: Option<Duration>,
}

/// Crea un stream desconectado y su productor
pub fn channel() -> (StreamHandle, ChannelStream) {
    let (tx, rx) = unbounded();
    let connected = Arc::new(AtomicBool::new(false));
    (
        StreamHandle {
            tx,
            connected: Arc::clone(&connected),
        },
        ChannelStream {
            rx,
            connected,
            delivered: false,
            read_timeout: None,
        },
    )
}

impl ChannelStream {
    /// Si la espera de una muestra supera `timeout`, `next_sample` devuelve `DataTimeout`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn has_data(&self) -> bool {
        self.delivered || !self.rx.is_empty()
    }

    /// Muestras recibidas y aún no leídas
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn next_sample(&mut self) -> Result<RawSample> {
        let sample = match self.read_timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => TrainerError::DataTimeout { timeout },
                RecvTimeoutError::Disconnected => TrainerError::StreamClosed,
            })?,
            None => self.rx.recv().map_err(|_| TrainerError::StreamClosed)?,
        };
        self.delivered = true;
        Ok(sample)
    }
}

/// Stream crudo → ventanas deslizantes → vectores de características
pub struct WindowedStream<E> {
    stream: ChannelStream,
    buffer: WindowBuffer,
    extractor: E,
}

impl<E: WindowFeatures> WindowedStream<E> {
    pub fn new(stream: ChannelStream, extractor: E, window_size: usize, step: usize) -> Self {
        Self {
            stream,
            buffer: WindowBuffer::new(window_size, step),
            extractor,
        }
    }
}

impl<E: WindowFeatures> FeatureSource for WindowedStream<E> {
    fn is_connected(&self) -> bool {
        self.stream.is_connected()
    }

    fn has_data(&self) -> bool {
        self.stream.has_data()
    }

    fn next_features(&mut self) -> Result<FeatureVector> {
        loop {
            let sample = self.stream.next_sample()?;
            if let Some(window) = self.buffer.push(sample) {
                debug!(pending = self.stream.pending(), "Ventana completa");
                return self.extractor.extract(&window);
            }
        }
    }
}
