//! Tipos de error del núcleo del anillo.

use thiserror::Error;

/// Errores al construir o validar tramas de 16 bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Comando fuera de rango de byte: {0}")]
    InvalidCommand(u32),

    #[error("Payload demasiado grande: {len} bytes (máximo {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Trama mal formada: {len} bytes (se esperaban 16)")]
    MalformedFrame { len: usize },

    #[error("Checksum inválido: esperado {expected:#04x}, recibido {got:#04x}")]
    BadChecksum { expected: u8, got: u8 },

    #[error("Comando desconocido: {0:#04x}")]
    UnknownCommand(u8),
}

/// Errores del colaborador de transporte (BLE u otro).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transporte desconectado")]
    Disconnected,

    #[error("Fallo de escritura: {0}")]
    Write(String),

    #[error("D-Bus error: {0}")]
    DBus(#[from] dbus::Error),
}

/// Errores devueltos al emitir comandos desde el controlador de sesión.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No hay transporte conectado")]
    NotConnected,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errores del almacén de plantillas de gestos.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Blob de plantillas corrupto: {0}")]
    Corrupted(String),
}

/// Errores del clasificador y de la biblioteca de gestos.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("La captura no contiene muestras")]
    EmptyCapture,

    #[error("Nombre de gesto inválido: {0:?}")]
    InvalidName(String),

    #[error("Ya existe un gesto llamado {0:?}")]
    DuplicateName(String),

    #[error("No existe el gesto {0:?}")]
    UnknownTemplate(String),
}
