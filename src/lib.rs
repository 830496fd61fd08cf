//! Núcleo del anillo sensor: protocolo de tramas, sesiones de monitoreo,
//! decodificación de movimiento, puntero estabilizado y reconocimiento de gestos.

pub mod actions;
pub mod ble;
pub mod click_detector;
pub mod config;
pub mod csv_loader;
pub mod error;
pub mod gesture_buffer;
pub mod gesture_classifier;
pub mod hid;
pub mod motion_decoder;
pub mod mouse_filter;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{ClassifierError, FrameError, SessionError, StorageError, TransportError};
pub use session::{Command, SessionController, Transport};
pub use types::{MotionSample, Orientation, RingEvent, TransportEvent};
