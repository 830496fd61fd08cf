//! Cadena de consumo de muestras de movimiento: puntero, clicks, gestos en
//! vivo y grabación. La comparten el daemon y la reproducción de capturas.

use std::time::Instant;

use tracing::{debug, info};

use crate::click_detector::{ClickDetectors, DetectorConfig};
use crate::error::ClassifierError;
use crate::gesture_buffer::GestureRecorder;
use crate::gesture_classifier::{ClassifierConfig, GestureClassifier, GestureMatch, GestureTemplate, LiveRecognizer};
use crate::mouse_filter::{ConditionerConfig, PointerConditioner, PointerUpdate};
use crate::types::{MotionSample, RingEvent};

/// Lo que produce una muestra al pasar por la cadena.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub pointer: Option<PointerUpdate>,
    /// `Click` y `GestureMatched` en el orden en que ocurrieron
    pub events: Vec<RingEvent>,
    /// Mejor candidato por encima del umbral de visualización
    pub display: Option<GestureMatch>,
    /// La grabación en curso acaba de llenarse
    pub capture_full: bool,
}

pub struct MotionPipeline {
    pointer: Option<PointerConditioner>,
    detectors: ClickDetectors,
    recognizer: LiveRecognizer,
    recorder: GestureRecorder,
}

impl MotionPipeline {
    /// `pointer_enabled` activa el control de cursor y los clicks; el
    /// reconocimiento de gestos está siempre activo.
    pub fn new(
        pointer: ConditionerConfig,
        detectors: &DetectorConfig,
        classifier: ClassifierConfig,
        pointer_enabled: bool,
    ) -> Self {
        Self {
            pointer: pointer_enabled.then(|| PointerConditioner::new(pointer)),
            detectors: ClickDetectors::new(detectors),
            recognizer: LiveRecognizer::new(classifier),
            recorder: GestureRecorder::new(),
        }
    }

    pub fn pointer_enabled(&self) -> bool {
        self.pointer.is_some()
    }

    pub fn start_recording(&mut self, name: &str, now: Instant) {
        info!(gesture = name, "grabación iniciada");
        self.recorder.start(name, now);
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recorder(&self) -> &GestureRecorder {
        &self.recorder
    }

    /// Cierra la grabación y devuelve la plantilla resultante. El estado en
    /// vivo de antes de grabar ya no vale, así que se reinicia.
    pub fn finish_recording(&mut self) -> Result<GestureTemplate, ClassifierError> {
        let samples = self.recorder.len();
        let stopped = self.recorder.stop();
        self.reset();
        let template = stopped?;
        info!(gesture = %template.name, samples, "grabación terminada");
        Ok(template)
    }

    pub fn process(&mut self, classifier: &GestureClassifier, sample: &MotionSample) -> StepOutput {
        let mut out = StepOutput::default();

        if self.recorder.is_recording() {
            self.recorder.push(*sample);
            out.capture_full = self.recorder.is_full();
            // durante la grabación no se disparan acciones
            return out;
        }

        if let Some(conditioner) = self.pointer.as_mut() {
            let update = conditioner.update(sample);
            if let Some(click) = self.detectors.on_sample(sample) {
                out.events.push(RingEvent::Click(click));
            }
            if let Some(click) = self.detectors.on_pointer(update.x, update.y) {
                out.events.push(RingEvent::Click(click));
            }
            out.pointer = Some(update);
        }

        let live = self.recognizer.on_sample(classifier, sample);
        if let Some(m) = &live.display {
            debug!(gesture = %m.name, confidence = m.confidence, "candidato");
        }
        if let Some(m) = live.triggered {
            out.events.push(RingEvent::GestureMatched {
                name: m.name,
                confidence: m.confidence,
            });
        }
        out.display = live.display;
        out
    }

    /// Puntero al centro, detectores y anti-rebote vacíos.
    pub fn reset(&mut self) {
        if let Some(conditioner) = self.pointer.as_mut() {
            conditioner.reset();
        }
        self.detectors.reset();
        self.recognizer.reset();
    }
}
