//! Acondicionamiento de señal para controlar el puntero con la inclinación del anillo.
//!
//! Por muestra y en orden fijo: zona muerta → media móvil exponencial →
//! sensibilidad adaptativa por zonas → momentum. La salida se recorta a los
//! límites de la pantalla en cada tick. No hay estado global: el resultado
//! depende solo del estado previo, la muestra y la configuración.

use serde::{Deserialize, Serialize};

use crate::types::{MotionSample, Orientation};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    pub screen_width: f32,
    pub screen_height: f32,
    /// Por debajo de este valor (en g) la componente se considera temblor
    pub dead_zone_g: f32,
    /// α de la EMA: bajo = más suave, alto = más reactivo
    pub alpha: f32,
    pub sensitivity: f32,
    /// Inclinación (grados) que lleva el cursor al borde
    pub max_tilt_deg: f32,
    pub momentum_decay: f32,
    /// Fracción del momentum que se suma al objetivo
    pub momentum_blend: f32,
    pub inner_zone: f32,
    pub outer_zone: f32,
    pub inner_gain: f32,
    pub middle_gain: f32,
    pub outer_gain: f32,
    pub axis_sign_x: f32,
    pub axis_sign_y: f32,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920.0,
            screen_height: 1080.0,
            dead_zone_g: 0.05,
            alpha: 0.3,
            sensitivity: 1.0,
            max_tilt_deg: 45.0,
            momentum_decay: 0.85,
            momentum_blend: 0.3,
            inner_zone: 0.5,
            outer_zone: 0.8,
            inner_gain: 1.2,
            middle_gain: 1.0,
            outer_gain: 0.6,
            axis_sign_x: 1.0,
            axis_sign_y: 1.0,
        }
    }
}

impl ConditionerConfig {
    /// Multiplicador según el radio de inclinación normalizado (0 = centro, 1 = borde).
    pub fn zone_gain(&self, radius: f32) -> f32 {
        if radius < self.inner_zone {
            self.inner_gain
        } else if radius < self.outer_zone {
            self.middle_gain
        } else {
            self.outer_gain
        }
    }
}

/// Media móvil exponencial de un canal.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Ema {
    value: Option<f32>,
}

impl Ema {
    pub fn update(&mut self, alpha: f32, sample: f32) -> f32 {
        let next = match self.value {
            Some(prev) => alpha * sample + (1.0 - alpha) * prev,
            None => sample,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> f32 {
        self.value.unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Suavizado de la orientación completa (usado también al clasificar en vivo).
#[derive(Clone, Copy, Debug, Default)]
pub struct OrientationSmoother {
    pitch: Ema,
    roll: Ema,
    yaw: Ema,
}

impl OrientationSmoother {
    pub fn update(&mut self, alpha: f32, o: Orientation) -> Orientation {
        Orientation::new(
            self.pitch.update(alpha, o.pitch),
            self.roll.update(alpha, o.roll),
            self.yaw.update(alpha, o.yaw),
        )
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EmaState {
    pub pitch_deg: Ema,
    pub roll_deg: Ema,
}

/// Estado del puntero, propiedad exclusiva de la función de control de cursor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConditionedPointerState {
    pub position_x: f32,
    pub position_y: f32,
    pub ema: EmaState,
    pub momentum_x: f32,
    pub momentum_y: f32,
}

/// Resultado de un tick: posición absoluta y desplazamiento respecto al anterior.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerUpdate {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

pub struct PointerConditioner {
    state: ConditionedPointerState,
    config: ConditionerConfig,
}

impl PointerConditioner {
    pub fn new(config: ConditionerConfig) -> Self {
        Self {
            state: Self::centered(&config),
            config,
        }
    }

    fn centered(config: &ConditionerConfig) -> ConditionedPointerState {
        ConditionedPointerState {
            position_x: config.screen_width / 2.0,
            position_y: config.screen_height / 2.0,
            ema: EmaState::default(),
            momentum_x: 0.0,
            momentum_y: 0.0,
        }
    }

    /// Vuelve al centro de la pantalla; se llama al activar el control de cursor.
    pub fn reset(&mut self) {
        self.state = Self::centered(&self.config);
    }

    pub fn state(&self) -> &ConditionedPointerState {
        &self.state
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.config
    }

    pub fn update(&mut self, sample: &MotionSample) -> PointerUpdate {
        let cfg = self.config;

        // 1. zona muerta
        let gx = dead_zone(sample.g_x, cfg.dead_zone_g);
        let gy = dead_zone(sample.g_y, cfg.dead_zone_g);
        let tilt = Orientation::from_gravity(gx, gy, sample.g_z);

        // 2. EMA por canal
        let ema = &mut self.state.ema;
        let pitch_deg = ema.pitch_deg.update(cfg.alpha, tilt.pitch.to_degrees());
        let roll_deg = ema.roll_deg.update(cfg.alpha, tilt.roll.to_degrees());

        // 3. objetivo con sensibilidad por zonas
        let half_w = cfg.screen_width / 2.0;
        let half_h = cfg.screen_height / 2.0;
        let nx = (roll_deg / cfg.max_tilt_deg).clamp(-1.0, 1.0) * cfg.axis_sign_x;
        let ny = (pitch_deg / cfg.max_tilt_deg).clamp(-1.0, 1.0) * cfg.axis_sign_y;
        let gain = cfg.zone_gain((nx * nx + ny * ny).sqrt());
        let target_x = half_w + nx * half_w * cfg.sensitivity * gain;
        let target_y = half_h + ny * half_h * cfg.sensitivity * gain;

        // 4. momentum
        let vx = target_x - self.state.position_x;
        let vy = target_y - self.state.position_y;
        self.state.momentum_x = self.state.momentum_x * cfg.momentum_decay + vx * (1.0 - cfg.momentum_decay);
        self.state.momentum_y = self.state.momentum_y * cfg.momentum_decay + vy * (1.0 - cfg.momentum_decay);

        let x = (target_x + self.state.momentum_x * cfg.momentum_blend).clamp(0.0, cfg.screen_width);
        let y = (target_y + self.state.momentum_y * cfg.momentum_blend).clamp(0.0, cfg.screen_height);

        let update = PointerUpdate {
            x,
            y,
            dx: x - self.state.position_x,
            dy: y - self.state.position_y,
        };
        self.state.position_x = x;
        self.state.position_y = y;
        update
    }
}

fn dead_zone(value: f32, threshold: f32) -> f32 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sample(gx: f32, gy: f32, gz: f32) -> MotionSample {
        let to_raw = |g: f32| (g / 4.0 * 2048.0).round() as i16;
        MotionSample::from_raw(to_raw(gx), to_raw(gy), to_raw(gz), Instant::now())
    }

    #[test]
    fn tremor_below_dead_zone_keeps_cursor_centered() {
        let mut filter = PointerConditioner::new(ConditionerConfig::default());
        for i in 0..50 {
            let jitter = if i % 2 == 0 { 0.03 } else { -0.03 };
            filter.update(&sample(jitter, -jitter, 1.0));
        }
        let s = filter.state();
        assert!((s.position_x - 960.0).abs() < 1e-3);
        assert!((s.position_y - 540.0).abs() < 1e-3);
    }

    #[test]
    fn ema_first_sample_passes_through() {
        let mut ema = Ema::default();
        assert_eq!(ema.update(0.3, 10.0), 10.0);
        let next = ema.update(0.3, 0.0);
        assert!((next - 7.0).abs() < 1e-6);
    }

    #[test]
    fn ema_state_smooths_tilt_angles() {
        let mut filter = PointerConditioner::new(ConditionerConfig::default());
        filter.update(&sample(0.0, 0.0, 1.0));
        filter.update(&sample(0.0, 1.0, 0.0));
        let ema = filter.state().ema;
        // roll pasa de 0° a 90°: 0.3 * 90 = 27°
        assert!((ema.roll_deg.value() - 27.0).abs() < 0.5);
        assert!(ema.pitch_deg.value().abs() < 1e-3);
    }

    #[test]
    fn zone_gains() {
        let cfg = ConditionerConfig::default();
        assert_eq!(cfg.zone_gain(0.2), 1.2);
        assert_eq!(cfg.zone_gain(0.6), 1.0);
        assert_eq!(cfg.zone_gain(0.9), 0.6);
    }

    #[test]
    fn sustained_tilt_moves_right_and_stays_on_screen() {
        let mut filter = PointerConditioner::new(ConditionerConfig::default());
        let mut last = None;
        for _ in 0..200 {
            last = Some(filter.update(&sample(0.0, 1.0, 0.2)));
        }
        let last = last.unwrap();
        assert!(last.x > 960.0);
        assert!(last.x <= 1920.0);
        assert!((0.0..=1080.0).contains(&last.y));
    }

    #[test]
    fn full_tilt_is_clamped_to_bounds() {
        let cfg = ConditionerConfig {
            sensitivity: 5.0,
            ..ConditionerConfig::default()
        };
        let mut filter = PointerConditioner::new(cfg);
        for _ in 0..100 {
            let u = filter.update(&sample(-1.0, -1.0, 0.0));
            assert!((0.0..=1920.0).contains(&u.x));
            assert!((0.0..=1080.0).contains(&u.y));
        }
        assert_eq!(filter.state().position_x, 0.0);
        assert_eq!(filter.state().position_y, 0.0);
    }

    #[test]
    fn axis_sign_inverts_direction() {
        let mut normal = PointerConditioner::new(ConditionerConfig::default());
        let mut inverted = PointerConditioner::new(ConditionerConfig {
            axis_sign_x: -1.0,
            ..ConditionerConfig::default()
        });
        let a = normal.update(&sample(0.0, 0.4, 0.9));
        let b = inverted.update(&sample(0.0, 0.4, 0.9));
        assert!(a.dx > 0.0);
        assert!((a.dx + b.dx).abs() < 1e-3);
    }

    #[test]
    fn momentum_overshoots_on_release() {
        let cfg = ConditionerConfig {
            alpha: 1.0,
            ..ConditionerConfig::default()
        };
        let mut filter = PointerConditioner::new(cfg);
        for _ in 0..5 {
            filter.update(&sample(0.0, 0.5, 0.85));
        }
        assert!(filter.state().momentum_x > 0.0);
        // Al volver a la posición neutra el cursor se pasa del centro por inercia
        let u = filter.update(&sample(0.0, 0.0, 1.0));
        assert!(filter.state().momentum_x < 0.0);
        assert!(u.x < 960.0);
    }

    #[test]
    fn reset_returns_to_center() {
        let mut filter = PointerConditioner::new(ConditionerConfig::default());
        for _ in 0..20 {
            filter.update(&sample(0.5, 0.5, 0.7));
        }
        filter.reset();
        let s = filter.state();
        assert_eq!((s.position_x, s.position_y), (960.0, 540.0));
        assert_eq!((s.momentum_x, s.momentum_y), (0.0, 0.0));
    }
}
