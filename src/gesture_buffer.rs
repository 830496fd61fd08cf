use std::time::Instant;

use crate::error::ClassifierError;
use crate::gesture_classifier::GestureTemplate;
use crate::types::{MotionSample, Orientation};

/// Máximo de muestras por captura (≈ 30 s a 20 Hz)
const CAPTURE_SIZE: usize = 600;

/// Buffer de captura de un gesto, acotado por `start` / `stop`.
pub struct GestureRecorder {
    name: Option<String>,
    buffer: Vec<MotionSample>,
    max_buffer_size: usize,
    started_at: Option<Instant>,
}

impl GestureRecorder {
    pub fn new() -> Self {
        Self::with_capacity(CAPTURE_SIZE)
    }

    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            name: None,
            buffer: Vec::new(),
            max_buffer_size,
            started_at: None,
        }
    }

    /// Empieza a grabar un gesto con el nombre dado, descartando lo anterior.
    pub fn start(&mut self, name: &str, now: Instant) {
        self.name = Some(name.to_string());
        self.buffer.clear();
        self.started_at = Some(now);
    }

    pub fn is_recording(&self) -> bool {
        self.name.is_some()
    }

    /// Añade una muestra si hay grabación en curso; al llenarse se ignoran las nuevas.
    pub fn push(&mut self, sample: MotionSample) -> bool {
        if !self.is_recording() || self.buffer.len() >= self.max_buffer_size {
            return false;
        }
        self.buffer.push(sample);
        true
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_buffer_size
    }

    /// Termina la grabación y agrega las muestras en una plantilla.
    pub fn stop(&mut self) -> Result<GestureTemplate, ClassifierError> {
        // `started_at` y las muestras se conservan hasta el próximo `start`
        // para poder exportar la captura.
        let name = self.name.take().ok_or(ClassifierError::EmptyCapture)?;
        let samples: Vec<Orientation> = self.buffer.iter().map(|s| s.orientation()).collect();
        GestureTemplate::from_samples(&name, &samples)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Exporta la captura en formato CSV (mismo formato que carga `csv_loader`)
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("t_ms,raw_x,raw_y,raw_z\n");
        let origin = self.started_at.or_else(|| self.buffer.first().map(|s| s.timestamp));

        for sample in &self.buffer {
            let t_ms = origin
                .map(|o| sample.timestamp.saturating_duration_since(o).as_millis())
                .unwrap_or(0);
            csv.push_str(&format!(
                "{},{},{},{}\n",
                t_ms, sample.raw_x, sample.raw_y, sample.raw_z
            ));
        }

        csv
    }
}

impl Default for GestureRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ignores_samples_when_not_recording() {
        let mut rec = GestureRecorder::new();
        assert!(!rec.push(MotionSample::from_raw(0, 0, 512, Instant::now())));
        assert!(rec.is_empty());
        assert_eq!(rec.stop(), Err(ClassifierError::EmptyCapture));
    }

    #[test]
    fn capture_is_bounded() {
        let t0 = Instant::now();
        let mut rec = GestureRecorder::with_capacity(10);
        rec.start("corto", t0);
        for i in 0..25 {
            rec.push(MotionSample::from_raw(i, 0, 512, t0));
        }
        assert_eq!(rec.len(), 10);
        assert!(rec.is_full());
    }

    #[test]
    fn stop_builds_template() {
        let t0 = Instant::now();
        let mut rec = GestureRecorder::new();
        rec.start("plano", t0);
        for i in 0..5 {
            rec.push(MotionSample::from_raw(0, 0, 512, t0 + Duration::from_millis(i * 50)));
        }
        let template = rec.stop().unwrap();
        assert_eq!(template.name, "plano");
        assert!(template.centroid.pitch.abs() < 1e-6);
        assert!(!rec.is_recording());
    }

    #[test]
    fn stop_without_samples_fails() {
        let mut rec = GestureRecorder::new();
        rec.start("vacío", Instant::now());
        assert_eq!(rec.stop(), Err(ClassifierError::EmptyCapture));
    }

    #[test]
    fn csv_export_uses_relative_time() {
        let t0 = Instant::now();
        let mut rec = GestureRecorder::new();
        rec.start("g", t0);
        rec.push(MotionSample::from_raw(1, 2, 3, t0 + Duration::from_millis(40)));
        let csv = rec.to_csv();
        assert_eq!(csv, "t_ms,raw_x,raw_y,raw_z\n40,1,2,3\n");
    }

    #[test]
    fn csv_export_after_stop_keeps_capture_origin() {
        let t0 = Instant::now();
        let mut rec = GestureRecorder::new();
        rec.start("g", t0);
        rec.push(MotionSample::from_raw(1, 2, 3, t0 + Duration::from_millis(40)));
        rec.push(MotionSample::from_raw(4, 5, 6, t0 + Duration::from_millis(90)));
        rec.stop().unwrap();
        assert_eq!(rec.to_csv(), "t_ms,raw_x,raw_y,raw_z\n40,1,2,3\n90,4,5,6\n");
    }
}
