use std::collections::VecDeque;

use crate::types::{RawSample, RawWindow};

/// Buffer circular de muestras crudas para formar ventanas deslizantes
pub struct WindowBuffer {
    buffer: VecDeque<RawSample>,
    window_size: usize,
    step: usize,
    /// Muestras que faltan para la próxima ventana
    until_next: usize,
}

impl WindowBuffer {
    /// `step` muestras nuevas entre ventanas consecutivas; la primera sale al llenarse
    pub fn new(window_size: usize, step: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            buffer: VecDeque::with_capacity(window_size + 1),
            window_size,
            step: step.max(1),
            until_next: window_size,
        }
    }

    /// Añade una muestra; devuelve la ventana completa si toca emitir una
    pub fn push(&mut self, sample: RawSample) -> Option<RawWindow> {
        self.buffer.push_back(sample);
        if self.buffer.len() > self.window_size {
            self.buffer.pop_front();
        }

        self.until_next = self.until_next.saturating_sub(1);
        if self.until_next == 0 && self.is_ready() {
            self.until_next = self.step;
            return self.window();
        }
        None
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.len() >= self.window_size
    }

    /// Las `window_size` muestras más recientes, en orden temporal
    pub fn window(&self) -> Option<RawWindow> {
        if !self.is_ready() {
            return None;
        }
        Some(self.buffer.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Corta una repetición en ventanas de `window_size` con paso `step`.
/// Si es más corta que una ventana se rellena repitiendo la última muestra.
pub fn sliding_windows(samples: &[RawSample], window_size: usize, step: usize) -> Vec<RawWindow> {
    let Some(last) = samples.last() else {
        return Vec::new();
    };
    let window_size = window_size.max(1);
    let step = step.max(1);

    if samples.len() < window_size {
        let mut padded = samples.to_vec();
        padded.resize(window_size, last.clone());
        return vec![padded];
    }

    (0..=samples.len() - window_size)
        .step_by(step)
        .map(|start| samples[start..start + window_size].to_vec())
        .collect()
}
