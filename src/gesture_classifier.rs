use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ClassifierError, StorageError};
use crate::mouse_filter::OrientationSmoother;
use crate::storage::TemplateStore;
use crate::types::{MotionSample, Orientation};

/// Distancia a partir de la cual la confianza es 0 (fija para todas las plantillas)
pub const MAX_DISTANCE: f32 = FRAC_PI_2;

/// Acción asociada a un gesto; cada variante lleva solo lo que necesita.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GestureAction {
    Message { text: String },
    Image { path: String },
    Sound { path: String },
    Url { href: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f32,
    pub max: f32,
}

impl AxisRange {
    fn of(values: impl Iterator<Item = f32>) -> Self {
        values.fold(
            AxisRange {
                min: f32::INFINITY,
                max: f32::NEG_INFINITY,
            },
            |r, v| AxisRange {
                min: r.min.min(v),
                max: r.max.max(v),
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationRange {
    pub pitch: AxisRange,
    pub roll: AxisRange,
    pub yaw: AxisRange,
}

/// Plantilla de gesto: centroide y rango de la captura.
///
/// Inmutable tras crearse salvo `bound_action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureTemplate {
    pub name: String,
    pub centroid: Orientation,
    pub range: OrientationRange,
    #[serde(default)]
    pub bound_action: Option<GestureAction>,
    /// Milisegundos desde UNIX_EPOCH
    pub created_at: u64,
}

impl GestureTemplate {
    /// Media aritmética por eje (sin media circular: los rangos grabados son pequeños).
    pub fn from_samples(name: &str, samples: &[Orientation]) -> Result<Self, ClassifierError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClassifierError::InvalidName(name.to_string()));
        }
        if samples.is_empty() {
            return Err(ClassifierError::EmptyCapture);
        }

        let n = samples.len() as f32;
        let centroid = Orientation::new(
            samples.iter().map(|s| s.pitch).sum::<f32>() / n,
            samples.iter().map(|s| s.roll).sum::<f32>() / n,
            samples.iter().map(|s| s.yaw).sum::<f32>() / n,
        );
        let range = OrientationRange {
            pitch: AxisRange::of(samples.iter().map(|s| s.pitch)),
            roll: AxisRange::of(samples.iter().map(|s| s.roll)),
            yaw: AxisRange::of(samples.iter().map(|s| s.yaw)),
        };

        Ok(Self {
            name: name.to_string(),
            centroid,
            range,
            bound_action: None,
            created_at: now_millis(),
        })
    }

    /// Validación estructural usada al cargar el blob persistido.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("plantilla sin nombre".to_string());
        }
        let c = &self.centroid;
        if ![c.pitch, c.roll, c.yaw].iter().all(|v| v.is_finite()) {
            return Err(format!("centroide no finito en {:?}", self.name));
        }
        for axis in [&self.range.pitch, &self.range.roll, &self.range.yaw] {
            if !(axis.min.is_finite() && axis.max.is_finite()) || axis.min > axis.max {
                return Err(format!("rango inválido en {:?}", self.name));
            }
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Confianza en porcentaje para una distancia en el espacio de orientación.
pub fn confidence_for(distance: f32) -> f32 {
    ((1.0 - distance / MAX_DISTANCE) * 100.0).max(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GestureMatch {
    pub name: String,
    pub confidence: f32,
    pub action: Option<GestureAction>,
}

/// Clasificador geométrico por centroide más cercano.
///
/// Con plantillas casi equidistantes siempre devuelve la más cercana, sin
/// desempate ni candidatos secundarios.
#[derive(Debug, Default, Clone)]
pub struct GestureClassifier {
    templates: Vec<GestureTemplate>,
}

impl GestureClassifier {
    pub fn new(templates: Vec<GestureTemplate>) -> Self {
        Self { templates }
    }

    /// Carga desde el almacén. Si el blob está corrupto se devuelve el error
    /// junto a un clasificador vacío para que el llamador pueda seguir.
    pub fn from_store(store: &dyn TemplateStore) -> (Self, Option<StorageError>) {
        match store.load_templates() {
            Ok(templates) => {
                info!(count = templates.len(), "plantillas de gestos cargadas");
                (Self::new(templates), None)
            }
            Err(e) => {
                warn!(error = %e, "no se pudieron cargar las plantillas, se sigue sin gestos");
                (Self::default(), Some(e))
            }
        }
    }

    pub fn save(&self, store: &dyn TemplateStore) -> Result<(), StorageError> {
        store.save_templates(&self.templates)
    }

    pub fn templates(&self) -> &[GestureTemplate] {
        &self.templates
    }

    pub fn get(&self, name: &str) -> Option<&GestureTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn add(&mut self, template: GestureTemplate) -> Result<(), ClassifierError> {
        if self.get(&template.name).is_some() {
            return Err(ClassifierError::DuplicateName(template.name));
        }
        self.templates.push(template);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<GestureTemplate, ClassifierError> {
        let idx = self
            .templates
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ClassifierError::UnknownTemplate(name.to_string()))?;
        Ok(self.templates.remove(idx))
    }

    /// Única edición permitida sobre una plantilla existente.
    pub fn set_action(
        &mut self,
        name: &str,
        action: Option<GestureAction>,
    ) -> Result<(), ClassifierError> {
        let template = self
            .templates
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| ClassifierError::UnknownTemplate(name.to_string()))?;
        template.bound_action = action;
        Ok(())
    }

    /// Plantilla más cercana y su confianza, sin aplicar umbral.
    pub fn nearest(&self, sample: &Orientation) -> Option<(&GestureTemplate, f32)> {
        self.templates
            .iter()
            .map(|t| (t, sample.distance(&t.centroid)))
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(t, d)| (t, confidence_for(d)))
    }

    /// Solo reporta coincidencia si la confianza supera el umbral (en %).
    pub fn classify(&self, sample: &Orientation, threshold: f32) -> Option<GestureMatch> {
        let (template, confidence) = self.nearest(sample)?;
        if confidence <= 0.0 || confidence <= threshold {
            return None;
        }
        Some(GestureMatch {
            name: template.name.clone(),
            confidence,
            action: template.bound_action.clone(),
        })
    }
}

/// Anti-rebote de disparo: tras ejecutar la acción de una plantilla, se
/// suprime durante `cooldown` aunque la pose se mantenga.
pub struct TriggerGate {
    cooldown: Duration,
    last_fired: HashMap<String, Instant>,
}

impl TriggerGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: HashMap::new(),
        }
    }

    pub fn try_fire(&mut self, name: &str, now: Instant) -> bool {
        if let Some(last) = self.last_fired.get(name) {
            if now.saturating_duration_since(*last) < self.cooldown {
                return false;
            }
        }
        self.last_fired.insert(name.to_string(), now);
        true
    }

    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Umbral para mostrar el gesto reconocido en vivo (%)
    pub display_threshold: f32,
    /// Umbral para ejecutar la acción asociada (%)
    pub trigger_threshold: f32,
    pub cooldown_ms: u64,
    /// α del suavizado previo; `None` clasifica la muestra tal cual
    pub smoothing_alpha: Option<f32>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            display_threshold: 30.0,
            trigger_threshold: 80.0,
            cooldown_ms: 1500,
            smoothing_alpha: Some(0.4),
        }
    }
}

/// Resultado de clasificar una muestra en vivo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveOutcome {
    pub display: Option<GestureMatch>,
    pub triggered: Option<GestureMatch>,
}

/// Reconocimiento en vivo: suavizado opcional, dos umbrales y anti-rebote.
pub struct LiveRecognizer {
    config: ClassifierConfig,
    smoother: OrientationSmoother,
    gate: TriggerGate,
}

impl LiveRecognizer {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            smoother: OrientationSmoother::default(),
            gate: TriggerGate::new(Duration::from_millis(config.cooldown_ms)),
        }
    }

    pub fn on_sample(&mut self, classifier: &GestureClassifier, sample: &MotionSample) -> LiveOutcome {
        let orientation = match self.config.smoothing_alpha {
            Some(alpha) => self.smoother.update(alpha, sample.orientation()),
            None => sample.orientation(),
        };

        let display = classifier.classify(&orientation, self.config.display_threshold);
        let triggered = display
            .as_ref()
            .filter(|m| m.confidence > self.config.trigger_threshold)
            .filter(|m| self.gate.try_fire(&m.name, sample.timestamp))
            .cloned();

        LiveOutcome { display, triggered }
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.gate.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str, pitch: f32, roll: f32, yaw: f32) -> GestureTemplate {
        GestureTemplate::from_samples(name, &[Orientation::new(pitch, roll, yaw)]).unwrap()
    }

    #[test]
    fn capture_computes_mean_and_range() {
        let samples = [
            Orientation::new(0.1, -0.2, 1.0),
            Orientation::new(0.3, 0.0, 1.2),
            Orientation::new(0.2, -0.1, 1.1),
        ];
        let t = GestureTemplate::from_samples("saludo", &samples).unwrap();
        assert!((t.centroid.pitch - 0.2).abs() < 1e-6);
        assert!((t.centroid.roll + 0.1).abs() < 1e-6);
        assert!((t.centroid.yaw - 1.1).abs() < 1e-6);
        assert_eq!(t.range.pitch, AxisRange { min: 0.1, max: 0.3 });
        assert_eq!(t.range.yaw, AxisRange { min: 1.0, max: 1.2 });
        assert!(t.bound_action.is_none());
    }

    #[test]
    fn capture_rejects_empty_or_unnamed() {
        assert_eq!(
            GestureTemplate::from_samples("x", &[]),
            Err(ClassifierError::EmptyCapture)
        );
        assert!(matches!(
            GestureTemplate::from_samples("  ", &[Orientation::default()]),
            Err(ClassifierError::InvalidName(_))
        ));
    }

    #[test]
    fn exact_centroid_is_full_confidence() {
        let classifier = GestureClassifier::new(vec![template("arriba", 0.5, 0.2, 0.1)]);
        let m = classifier
            .classify(&Orientation::new(0.5, 0.2, 0.1), 99.9)
            .unwrap();
        assert_eq!(m.name, "arriba");
        assert!((m.confidence - 100.0).abs() < 1e-4);
    }

    #[test]
    fn far_sample_never_matches() {
        let classifier = GestureClassifier::new(vec![template("a", 0.0, 0.0, 0.0)]);
        let far = Orientation::new(MAX_DISTANCE, 0.0, 0.0);
        assert!(classifier.classify(&far, 0.0).is_none());
        assert!(classifier.classify(&far, -50.0).is_none());
        let farther = Orientation::new(1.5, 1.5, 0.0);
        assert!(classifier.classify(&farther, 0.0).is_none());
    }

    #[test]
    fn picks_nearest_template() {
        let classifier = GestureClassifier::new(vec![
            template("izquierda", 0.0, -0.8, 0.0),
            template("derecha", 0.0, 0.8, 0.0),
        ]);
        let m = classifier.classify(&Orientation::new(0.0, 0.6, 0.0), 30.0).unwrap();
        assert_eq!(m.name, "derecha");
    }

    #[test]
    fn thresholds_separate_display_from_trigger() {
        let classifier = GestureClassifier::new(vec![template("a", 0.0, 0.0, 0.0)]);
        // distancia 0.5 rad → confianza ≈ 68 %
        let sample = Orientation::new(0.3, 0.4, 0.0);
        assert!(classifier.classify(&sample, 30.0).is_some());
        assert!(classifier.classify(&sample, 80.0).is_none());
    }

    #[test]
    fn duplicate_names_rejected_and_action_editable() {
        let mut classifier = GestureClassifier::default();
        classifier.add(template("a", 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(
            classifier.add(template("a", 1.0, 0.0, 0.0)),
            Err(ClassifierError::DuplicateName("a".into()))
        );
        let action = GestureAction::Url {
            href: "https://example.org".into(),
        };
        classifier.set_action("a", Some(action.clone())).unwrap();
        assert_eq!(classifier.get("a").unwrap().bound_action, Some(action));
        assert!(classifier.set_action("b", None).is_err());
        classifier.remove("a").unwrap();
        assert!(classifier.templates().is_empty());
    }

    #[test]
    fn trigger_gate_suppresses_refiring() {
        let t0 = Instant::now();
        let mut gate = TriggerGate::new(Duration::from_millis(1500));
        assert!(gate.try_fire("a", t0));
        assert!(!gate.try_fire("a", t0 + Duration::from_millis(1000)));
        assert!(gate.try_fire("b", t0 + Duration::from_millis(1000)));
        assert!(gate.try_fire("a", t0 + Duration::from_millis(1500)));
    }

    #[test]
    fn held_pose_triggers_once_per_cooldown() {
        let t0 = Instant::now();
        // Muestra con gravedad en +z: pitch = roll = 0, yaw = π/2
        let pose = MotionSample::from_raw(0, 0, 512, t0).orientation();
        let mut t = GestureTemplate::from_samples("plano", &[pose]).unwrap();
        t.bound_action = Some(GestureAction::Message { text: "hola".into() });
        let classifier = GestureClassifier::new(vec![t]);
        let mut live = LiveRecognizer::new(ClassifierConfig::default());

        let mut triggers = 0;
        for i in 0..20 {
            let s = MotionSample::from_raw(0, 0, 512, t0 + Duration::from_millis(i * 100));
            let out = live.on_sample(&classifier, &s);
            assert!(out.display.is_some());
            if let Some(m) = out.triggered {
                assert_eq!(m.action, Some(GestureAction::Message { text: "hola".into() }));
                triggers += 1;
            }
        }
        // 0 ms y 1500 ms
        assert_eq!(triggers, 2);
    }

    #[test]
    fn action_serializes_as_tagged_union() {
        let json = serde_json::to_string(&GestureAction::Sound { path: "bip.wav".into() }).unwrap();
        assert_eq!(json, r#"{"kind":"sound","path":"bip.wav"}"#);
    }
}
