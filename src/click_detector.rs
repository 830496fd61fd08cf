//! Detectores discretos de movimiento para los clicks del modo puntero.
//!
//! Son independientes del emparejamiento por plantillas:
//! - flick: pico de aceleración → click izquierdo
//! - hold: mano quieta un tiempo → click derecho
//! - círculo: el cursor describe una vuelta → scroll

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ClickEvent, MotionSample, ScrollDirection};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Magnitud (g) a partir de la cual un movimiento es un flick
    pub flick_threshold_g: f32,
    pub flick_min_interval_ms: u64,
    /// Magnitud de movimiento por debajo de la cual la mano se considera quieta
    pub hold_threshold: f32,
    pub hold_duration_ms: u64,
    pub circle_window: usize,
    pub circle_threshold_deg: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            flick_threshold_g: 2.0,
            flick_min_interval_ms: 500,
            hold_threshold: 0.3,
            hold_duration_ms: 1500,
            circle_window: 20,
            circle_threshold_deg: 300.0,
        }
    }
}

pub struct FlickDetector {
    threshold: f32,
    min_interval: Duration,
    last_fire: Option<Instant>,
}

impl FlickDetector {
    pub fn new(threshold: f32, min_interval: Duration) -> Self {
        Self {
            threshold,
            min_interval,
            last_fire: None,
        }
    }

    /// Devuelve `true` si la magnitud supera el umbral y no se disparó hace poco.
    pub fn update(&mut self, magnitude: f32, now: Instant) -> bool {
        if magnitude <= self.threshold {
            return false;
        }
        if let Some(last) = self.last_fire {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_fire = Some(now);
        true
    }
}

pub struct HoldDetector {
    threshold: f32,
    hold_for: Duration,
    stable_since: Option<Instant>,
    fired: bool,
}

impl HoldDetector {
    pub fn new(threshold: f32, hold_for: Duration) -> Self {
        Self {
            threshold,
            hold_for,
            stable_since: None,
            fired: false,
        }
    }

    /// Dispara una sola vez por periodo de estabilidad; romper la
    /// estabilidad reinicia el temporizador al instante.
    pub fn update(&mut self, magnitude: f32, now: Instant) -> bool {
        if magnitude >= self.threshold {
            self.stable_since = None;
            self.fired = false;
            return false;
        }

        let since = *self.stable_since.get_or_insert(now);
        if !self.fired && now.saturating_duration_since(since) >= self.hold_for {
            self.fired = true;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.stable_since = None;
        self.fired = false;
    }
}

/// Desplazamiento mínimo del cursor para registrar un punto del círculo
const MIN_STEP_PX: f32 = 2.0;

/// Detecta una rotación acumulada del cursor sobre una ventana deslizante.
pub struct CircleDetector {
    points: VecDeque<(f32, f32)>,
    capacity: usize,
    threshold_rad: f32,
}

impl CircleDetector {
    pub fn new(capacity: usize, threshold_deg: f32) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity: capacity.max(3),
            threshold_rad: threshold_deg.to_radians(),
        }
    }

    /// Ángulo de giro acumulado (con signo, radianes) sobre los tripletes consecutivos.
    pub fn cumulative_turn(&self) -> f32 {
        let mut total = 0.0f32;
        for i in 2..self.points.len() {
            let (ax, ay) = self.points[i - 2];
            let (bx, by) = self.points[i - 1];
            let (cx, cy) = self.points[i];
            let (v1x, v1y) = (bx - ax, by - ay);
            let (v2x, v2y) = (cx - bx, cy - by);
            if (v1x == 0.0 && v1y == 0.0) || (v2x == 0.0 && v2y == 0.0) {
                continue;
            }
            let cross = v1x * v2y - v1y * v2x;
            let dot = v1x * v2x + v1y * v2y;
            total += cross.atan2(dot);
        }
        total
    }

    /// En coordenadas de pantalla (y hacia abajo) un giro positivo es horario.
    ///
    /// Los puntos a menos de `MIN_STEP_PX` del último guardado se ignoran: el
    /// temblor de un píxel de ida y vuelta gira ±π por triplete.
    pub fn push(&mut self, x: f32, y: f32) -> Option<ScrollDirection> {
        if let Some(&(lx, ly)) = self.points.back() {
            let (dx, dy) = (x - lx, y - ly);
            if dx * dx + dy * dy < MIN_STEP_PX * MIN_STEP_PX {
                return None;
            }
        }
        self.points.push_back((x, y));
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }

        let turn = self.cumulative_turn();
        if turn.abs() <= self.threshold_rad {
            return None;
        }

        self.points.clear();
        Some(if turn > 0.0 {
            ScrollDirection::Clockwise
        } else {
            ScrollDirection::CounterClockwise
        })
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Agrupa los tres detectores con la semántica de click del puntero.
pub struct ClickDetectors {
    flick: FlickDetector,
    hold: HoldDetector,
    circle: CircleDetector,
    prev_g: Option<(f32, f32, f32)>,
}

impl ClickDetectors {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            flick: FlickDetector::new(
                config.flick_threshold_g,
                Duration::from_millis(config.flick_min_interval_ms),
            ),
            hold: HoldDetector::new(
                config.hold_threshold,
                Duration::from_millis(config.hold_duration_ms),
            ),
            circle: CircleDetector::new(config.circle_window, config.circle_threshold_deg),
            prev_g: None,
        }
    }

    /// Flick sobre la magnitud instantánea; hold sobre la variación entre
    /// muestras consecutivas (la gravedad en reposo no cuenta como movimiento).
    pub fn on_sample(&mut self, sample: &MotionSample) -> Option<ClickEvent> {
        let now = sample.timestamp;
        let g = (sample.g_x, sample.g_y, sample.g_z);
        let movement = match self.prev_g.replace(g) {
            Some((px, py, pz)) => {
                let (dx, dy, dz) = (g.0 - px, g.1 - py, g.2 - pz);
                (dx * dx + dy * dy + dz * dz).sqrt()
            }
            None => f32::MAX,
        };

        if self.flick.update(sample.magnitude(), now) {
            debug!(magnitude = sample.magnitude(), "flick detectado");
            self.hold.reset();
            return Some(ClickEvent::Left);
        }
        if self.hold.update(movement, now) {
            debug!("hold detectado");
            return Some(ClickEvent::Right);
        }
        None
    }

    pub fn on_pointer(&mut self, x: f32, y: f32) -> Option<ClickEvent> {
        self.circle.push(x, y).map(ClickEvent::Scroll)
    }

    pub fn reset(&mut self) {
        self.hold.reset();
        self.circle.clear();
        self.prev_g = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn flick_is_rate_limited() {
        let t0 = Instant::now();
        let mut flick = FlickDetector::new(2.0, ms(500));
        assert!(!flick.update(1.9, t0));
        assert!(flick.update(2.5, t0));
        assert!(!flick.update(2.5, t0 + ms(200)));
        assert!(!flick.update(3.0, t0 + ms(499)));
        assert!(flick.update(2.1, t0 + ms(500)));
    }

    fn run_hold(total_ms: u64) -> usize {
        let t0 = Instant::now();
        let mut hold = HoldDetector::new(0.3, ms(1500));
        let mut fired = 0;
        let mut t = 0;
        while t <= total_ms {
            if hold.update(0.1, t0 + ms(t)) {
                fired += 1;
            }
            t += 50;
        }
        fired
    }

    #[test]
    fn hold_of_1400ms_never_fires() {
        assert_eq!(run_hold(1400), 0);
    }

    #[test]
    fn hold_of_1600ms_fires_exactly_once() {
        assert_eq!(run_hold(1600), 1);
    }

    #[test]
    fn hold_timer_resets_when_stability_breaks() {
        let t0 = Instant::now();
        let mut hold = HoldDetector::new(0.3, ms(1500));
        assert!(!hold.update(0.1, t0));
        assert!(!hold.update(0.1, t0 + ms(1000)));
        assert!(!hold.update(0.5, t0 + ms(1100)));
        assert!(!hold.update(0.1, t0 + ms(1200)));
        assert!(!hold.update(0.1, t0 + ms(2600)));
        assert!(hold.update(0.1, t0 + ms(2700)));
    }

    fn circle_points(n: usize, clockwise: bool) -> Vec<(f32, f32)> {
        (0..n)
            .map(|i| {
                let step = std::f32::consts::TAU / 20.0;
                let theta = if clockwise { i as f32 * step } else { -(i as f32) * step };
                (500.0 + 100.0 * theta.cos(), 500.0 + 100.0 * theta.sin())
            })
            .collect()
    }

    #[test]
    fn full_circle_scrolls_once_and_clears_window() {
        let mut circle = CircleDetector::new(20, 300.0);
        let mut detections = Vec::new();
        for (x, y) in circle_points(19, true) {
            if let Some(dir) = circle.push(x, y) {
                detections.push(dir);
            }
        }
        assert_eq!(detections, vec![ScrollDirection::Clockwise]);
        assert!(circle.is_empty());
    }

    #[test]
    fn reverse_circle_scrolls_the_other_way() {
        let mut circle = CircleDetector::new(20, 300.0);
        let dir = circle_points(19, false)
            .into_iter()
            .find_map(|(x, y)| circle.push(x, y));
        assert_eq!(dir, Some(ScrollDirection::CounterClockwise));
    }

    #[test]
    fn pixel_jitter_with_slow_drift_never_scrolls() {
        let mut circle = CircleDetector::new(20, 300.0);
        for i in 0..200 {
            let x = 500.0 + (i % 2) as f32;
            let y = 500.0 + 0.1 * i as f32;
            assert!(circle.push(x, y).is_none(), "tick {i}");
        }
    }

    #[test]
    fn straight_line_is_not_a_circle() {
        let mut circle = CircleDetector::new(20, 300.0);
        for i in 0..40 {
            assert!(circle.push(i as f32 * 10.0, 100.0).is_none());
        }
        assert_eq!(circle.len(), 20);
    }

    #[test]
    fn still_hand_produces_right_click() {
        let t0 = Instant::now();
        let mut detectors = ClickDetectors::new(&DetectorConfig::default());
        let mut events = Vec::new();
        for i in 0..40 {
            let s = MotionSample::from_raw(0, 0, 512, t0 + ms(i * 50));
            if let Some(e) = detectors.on_sample(&s) {
                events.push(e);
            }
        }
        assert_eq!(events, vec![ClickEvent::Right]);
    }

    #[test]
    fn strong_shake_produces_left_click() {
        let t0 = Instant::now();
        let mut detectors = ClickDetectors::new(&DetectorConfig::default());
        let s = MotionSample::from_raw(1500, 0, 512, t0);
        assert_eq!(detectors.on_sample(&s), Some(ClickEvent::Left));
    }
}
