use std::time::{Duration, Instant};

use crate::protocol::ReadingKind;

/// Escala del acelerómetro: ±4 g sobre 12 bits con signo
pub const ACCEL_RANGE_G: f32 = 4.0;
pub const RAW_HALF_SCALE: f32 = 2048.0;

/// Número de franjas de 15 minutos en un día
pub const TIME_INDEX_COUNT: u8 = 96;

/// Ángulos de inclinación en radianes.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Orientation {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

impl Orientation {
    pub fn new(pitch: f32, roll: f32, yaw: f32) -> Self {
        Self { pitch, roll, yaw }
    }

    /// Inclinación a partir del vector de gravedad (no integra giroscopio).
    pub fn from_gravity(gx: f32, gy: f32, gz: f32) -> Self {
        Self {
            pitch: gx.atan2((gy * gy + gz * gz).sqrt()),
            roll: gy.atan2((gx * gx + gz * gz).sqrt()),
            yaw: gz.atan2((gx * gx + gy * gy).sqrt()),
        }
    }

    /// Distancia euclídea en el espacio (pitch, roll, yaw).
    pub fn distance(&self, other: &Orientation) -> f32 {
        let dp = self.pitch - other.pitch;
        let dr = self.roll - other.roll;
        let dy = self.yaw - other.yaw;
        (dp * dp + dr * dr + dy * dy).sqrt()
    }
}

/// Una muestra del acelerómetro ya convertida a unidades físicas.
///
/// Solo se construye con [`MotionSample::from_raw`], así que los ángulos
/// siempre corresponden a las componentes de gravedad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub raw_x: i16,
    pub raw_y: i16,
    pub raw_z: i16,
    pub g_x: f32,
    pub g_y: f32,
    pub g_z: f32,
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub timestamp: Instant,
}

impl MotionSample {
    pub fn from_raw(raw_x: i16, raw_y: i16, raw_z: i16, timestamp: Instant) -> Self {
        let g_x = raw_to_g(raw_x);
        let g_y = raw_to_g(raw_y);
        let g_z = raw_to_g(raw_z);
        let o = Orientation::from_gravity(g_x, g_y, g_z);

        Self {
            raw_x,
            raw_y,
            raw_z,
            g_x,
            g_y,
            g_z,
            pitch: o.pitch,
            roll: o.roll,
            yaw: o.yaw,
            timestamp,
        }
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::new(self.pitch, self.roll, self.yaw)
    }

    /// Magnitud instantánea de la aceleración en g
    pub fn magnitude(&self) -> f32 {
        (self.g_x * self.g_x + self.g_y * self.g_y + self.g_z * self.g_z).sqrt()
    }
}

fn raw_to_g(raw: i16) -> f32 {
    raw as f32 / RAW_HALF_SCALE * ACCEL_RANGE_G
}

/// Franja de pasos de 15 minutos reportada por el anillo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StepInterval {
    pub time_index: u8,
    pub steps: u16,
    pub calories: u32,
    pub distance_meters: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Clockwise,
    CounterClockwise,
}

/// Clicks discretos derivados del movimiento (flick, hold, círculo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickEvent {
    Left,
    Right,
    Scroll(ScrollDirection),
}

/// Eventos de dominio hacia la capa de UI / consumidores.
#[derive(Debug, Clone, PartialEq)]
pub enum RingEvent {
    Battery { level: u8, charging: bool },
    HeartRate { bpm: u8 },
    SpO2 { percent: u8 },
    StepsUpdated {
        total: u32,
        intervals: Vec<StepInterval>,
        complete: bool,
    },
    Motion(MotionSample),
    /// Aviso de vitalidad: la sesión sigue activa pero no llegan datos
    LivenessWarning { kind: ReadingKind, silent_for: Duration },
    GestureMatched { name: String, confidence: f32 },
    Click(ClickEvent),
}

/// Lo que el transporte entrega al controlador, en orden de llegada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Vec<u8>),
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn flat_ring_points_gravity_down_z() {
        let o = Orientation::from_gravity(0.0, 0.0, 1.0);
        assert!(o.pitch.abs() < 1e-6);
        assert!(o.roll.abs() < 1e-6);
        assert!((o.yaw - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn raw_scaling_to_g() {
        let s = MotionSample::from_raw(512, -1024, 2047, Instant::now());
        assert!((s.g_x - 1.0).abs() < 1e-6);
        assert!((s.g_y + 2.0).abs() < 1e-6);
        assert!((s.g_z - 3.998).abs() < 1e-3);
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Orientation::new(0.0, 0.0, 0.0);
        let b = Orientation::new(0.3, 0.4, 0.0);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }
}
