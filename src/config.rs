use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::click_detector::DetectorConfig;
use crate::gesture_classifier::ClassifierConfig;
use crate::mouse_filter::ConditionerConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    pub adapter_path: String,
    /// Sufijo bajo la ruta del dispositivo de la característica de escritura
    pub write_char: String,
    /// Sufijo de la característica que envía notificaciones
    pub notify_char: String,
    pub timeout_secs: u64,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter_path: "/org/bluez/hci0".to_string(),
            write_char: "service0010/char0011".to_string(),
            notify_char: "service0010/char0013".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub ble: BleConfig,
    pub session: SessionConfig,
    pub pointer: ConditionerConfig,
    pub detectors: DetectorConfig,
    pub classifier: ClassifierConfig,
    pub templates_path: Option<PathBuf>,
}

impl RingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer la configuración {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Configuración inválida en {:?}", path))
    }

    pub fn templates_path(&self) -> PathBuf {
        self.templates_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("gestures.json"))
    }
}
