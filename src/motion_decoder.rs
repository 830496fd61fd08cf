//! Decodificación de tramas de modo crudo con muestras del acelerómetro.
//!
//! Los bytes 2..=7 empaquetan tres valores de 12 bits: el byte alto aporta
//! los 8 bits superiores y el nibble bajo del siguiente byte los 4 inferiores.
//! El orden en la trama es Y, Z, X.
//!
//! Los ángulos son inclinaciones del vector de gravedad, válidos solo en
//! reposo o movimiento lento; con aceleración lineal fuerte se degradan.

use std::time::Instant;

use crate::protocol::{CMD_RAW, RAW_SUBTYPE_MOTION};
use crate::types::MotionSample;

pub const MIN_MOTION_LEN: usize = 8;

/// Convierte un campo de 12 bits sin signo al rango [-2048, 2047].
pub fn to_signed_12(value: u16) -> i16 {
    let value = (value & 0x0FFF) as i16;
    if value > 2047 {
        value - 4096
    } else {
        value
    }
}

fn unpack_12(high: u8, low: u8) -> u16 {
    ((high as u16) << 4) | (low & 0x0F) as u16
}

/// Decodifica una trama de movimiento.
///
/// Devuelve `None` ("no es un dato de movimiento") si la trama es más corta
/// de 8 bytes o si los discriminadores no corresponden, para que el llamador
/// la enrute a otro lado. Es una función pura: mismos bytes, misma muestra.
pub fn decode(bytes: &[u8], timestamp: Instant) -> Option<MotionSample> {
    if bytes.len() < MIN_MOTION_LEN || bytes[0] != CMD_RAW || bytes[1] != RAW_SUBTYPE_MOTION {
        return None;
    }

    let raw_y = to_signed_12(unpack_12(bytes[2], bytes[3]));
    let raw_z = to_signed_12(unpack_12(bytes[4], bytes[5]));
    let raw_x = to_signed_12(unpack_12(bytes[6], bytes[7]));

    Some(MotionSample::from_raw(raw_x, raw_y, raw_z, timestamp))
}

/// Empaqueta tres valores con signo en el formato de la trama (útil para
/// reproducir capturas y en tests).
pub fn encode_motion_payload(raw_x: i16, raw_y: i16, raw_z: i16) -> [u8; 8] {
    let pack = |v: i16| -> (u8, u8) {
        let u = (v as u16) & 0x0FFF;
        ((u >> 4) as u8, (u & 0x0F) as u8)
    };
    let (y_hi, y_lo) = pack(raw_y);
    let (z_hi, z_lo) = pack(raw_z);
    let (x_hi, x_lo) = pack(raw_x);
    [CMD_RAW, RAW_SUBTYPE_MOTION, y_hi, y_lo, z_hi, z_lo, x_hi, x_lo]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_boundary() {
        assert_eq!(to_signed_12(2047), 2047);
        assert_eq!(to_signed_12(2048), -2048);
        assert_eq!(to_signed_12(4095), -1);
        assert_eq!(to_signed_12(0), 0);
    }

    #[test]
    fn nibble_unpacking_ignores_high_nibble_of_low_byte() {
        // 0x7F, 0xFF → 0x7FF = 2047 ; el nibble alto 0xF0 se descarta
        let bytes = [CMD_RAW, RAW_SUBTYPE_MOTION, 0x7F, 0xFF, 0x80, 0x00, 0x00, 0xF1];
        let s = decode(&bytes, Instant::now()).unwrap();
        assert_eq!(s.raw_y, 2047);
        assert_eq!(s.raw_z, -2048);
        assert_eq!(s.raw_x, 1);
    }

    #[test]
    fn decode_is_pure() {
        let t = Instant::now();
        let bytes = encode_motion_payload(-300, 120, 512);
        let a = decode(&bytes, t).unwrap();
        let b = decode(&bytes, t).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.raw_x, a.raw_y, a.raw_z), (-300, 120, 512));
    }

    #[test]
    fn gravity_on_z_gives_level_pitch_and_roll() {
        let bytes = encode_motion_payload(0, 0, 512);
        let s = decode(&bytes, Instant::now()).unwrap();
        assert!((s.g_z - 1.0).abs() < 1e-6);
        assert!(s.pitch.abs() < 1e-6);
        assert!(s.roll.abs() < 1e-6);
    }

    #[test]
    fn rejects_short_or_foreign_frames() {
        let now = Instant::now();
        assert!(decode(&[CMD_RAW, RAW_SUBTYPE_MOTION, 0, 0, 0, 0, 0], now).is_none());
        assert!(decode(&[0x69, RAW_SUBTYPE_MOTION, 0, 0, 0, 0, 0, 0], now).is_none());
        assert!(decode(&[CMD_RAW, 0x02, 0, 0, 0, 0, 0, 0], now).is_none());
    }
}
