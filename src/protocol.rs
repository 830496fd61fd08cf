//! Codec de tramas del anillo.
//!
//! Toda comunicación con el dispositivo usa tramas fijas de 16 bytes:
//!
//! ```text
//! ┌─────────┬──────────────────────────────┬──────────┐
//! │ Comando │ Payload (relleno con ceros)  │ Checksum │
//! │ byte 0  │ bytes 1..=14                 │ byte 15  │
//! └─────────┴──────────────────────────────┴──────────┘
//! ```
//!
//! El checksum es la suma de los bytes 0..=14 módulo 256. El anillo no
//! reporta errores de checksum: una trama mal sumada simplemente se ignora.

use crate::error::FrameError;

pub const FRAME_LEN: usize = 16;
pub const MAX_PAYLOAD: usize = 14;

pub const CMD_BATTERY: u8 = 0x03;
pub const CMD_REBOOT: u8 = 0x08;
pub const CMD_STEPS: u8 = 0x43;
pub const CMD_REALTIME_START: u8 = 0x69;
pub const CMD_REALTIME_STOP: u8 = 0x6A;
pub const CMD_RAW: u8 = 0xA1;

/// Sufijo fijo de la consulta de pasos (después del offset de día)
const STEPS_QUERY_SUFFIX: [u8; 4] = [0x0F, 0x00, 0x5F, 0x01];

const REALTIME_ACTION_START: u8 = 0x01;

const RAW_ENABLE_PAYLOAD: [u8; 3] = [0x04, 0x00, 0x00];
const RAW_DISABLE_PAYLOAD: [u8; 3] = [0x02, 0x00, 0x00];

/// Sub-tipos de las tramas de datos crudos (byte 1 tras `CMD_RAW`)
pub const RAW_SUBTYPE_SPO2: u8 = 0x01;
pub const RAW_SUBTYPE_PPG: u8 = 0x02;
pub const RAW_SUBTYPE_MOTION: u8 = 0x03;

/// Marcadores del byte 1 en las respuestas de pasos
pub const STEPS_NO_DATA: u8 = 0xFF;
pub const STEPS_METADATA: u8 = 0xF0;

/// Una trama completa lista para enviar.
pub type Frame = [u8; FRAME_LEN];

/// Tipo de lectura de una sesión de monitoreo en tiempo real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingKind {
    HeartRate,
    SpO2,
}

impl ReadingKind {
    pub const ALL: [ReadingKind; 2] = [ReadingKind::HeartRate, ReadingKind::SpO2];

    pub fn code(self) -> u8 {
        match self {
            ReadingKind::HeartRate => 0x01,
            ReadingKind::SpO2 => 0x03,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(ReadingKind::HeartRate),
            0x03 => Some(ReadingKind::SpO2),
            _ => None,
        }
    }

    /// Rango de valores plausibles; fuera de él el sensor sigue adquiriendo.
    pub fn valid_range(self) -> std::ops::RangeInclusive<u8> {
        match self {
            ReadingKind::HeartRate => 30..=220,
            ReadingKind::SpO2 => 50..=100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadingKind::HeartRate => "heart-rate",
            ReadingKind::SpO2 => "spo2",
        }
    }
}

/// Suma aditiva de los bytes con desbordamiento módulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Construye una trama: comando, payload relleno con ceros y checksum.
pub fn build_frame(command: impl Into<u32>, payload: &[u8]) -> Result<Frame, FrameError> {
    let command = command.into();
    let command = u8::try_from(command).map_err(|_| FrameError::InvalidCommand(command))?;

    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let mut frame = [0u8; FRAME_LEN];
    frame[0] = command;
    frame[1..1 + payload.len()].copy_from_slice(payload);
    frame[FRAME_LEN - 1] = checksum(&frame[..FRAME_LEN - 1]);
    Ok(frame)
}

/// `true` solo si la longitud es exactamente 16 y el checksum coincide.
pub fn validate_frame(bytes: &[u8]) -> bool {
    check_frame(bytes).is_ok()
}

/// Igual que [`validate_frame`] pero indicando el motivo del rechazo.
pub fn check_frame(bytes: &[u8]) -> Result<&Frame, FrameError> {
    let frame: &Frame = bytes
        .try_into()
        .map_err(|_| FrameError::MalformedFrame { len: bytes.len() })?;

    let expected = checksum(&frame[..FRAME_LEN - 1]);
    let got = frame[FRAME_LEN - 1];
    if expected != got {
        return Err(FrameError::BadChecksum { expected, got });
    }
    Ok(frame)
}

pub fn battery_request() -> Frame {
    fixed_frame(CMD_BATTERY, &[])
}

pub fn reboot_request() -> Frame {
    fixed_frame(CMD_REBOOT, &[0x01])
}

pub fn steps_request(day_offset: u8) -> Frame {
    let mut payload = [0u8; 5];
    payload[0] = day_offset;
    payload[1..].copy_from_slice(&STEPS_QUERY_SUFFIX);
    fixed_frame(CMD_STEPS, &payload)
}

pub fn realtime_start(kind: ReadingKind) -> Frame {
    fixed_frame(CMD_REALTIME_START, &[kind.code(), REALTIME_ACTION_START])
}

pub fn realtime_stop(kind: ReadingKind) -> Frame {
    fixed_frame(CMD_REALTIME_STOP, &[kind.code(), 0x00, 0x00])
}

pub fn raw_mode(enable: bool) -> Frame {
    if enable {
        fixed_frame(CMD_RAW, &RAW_ENABLE_PAYLOAD)
    } else {
        fixed_frame(CMD_RAW, &RAW_DISABLE_PAYLOAD)
    }
}

// Los payloads fijos nunca superan MAX_PAYLOAD, así que no pueden fallar.
fn fixed_frame(command: u8, payload: &[u8]) -> Frame {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = command;
    frame[1..1 + payload.len()].copy_from_slice(payload);
    frame[FRAME_LEN - 1] = checksum(&frame[..FRAME_LEN - 1]);
    frame
}

/// Convierte un byte BCD (0x24 → 24).
pub fn bcd_to_decimal(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0x0F)
}
