//! Transporte BLE sobre BlueZ (D-Bus).
//!
//! Solo expone lo que el núcleo necesita: escribir una trama, entregar las
//! notificaciones por el canal de entrada y avisar de la desconexión. Los
//! reintentos de conexión quedan fuera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use dbus::arg::{PropMap, RefArg, Variant};
use dbus::blocking::stdintf::org_freedesktop_dbus::PropertiesPropertiesChanged as PC;
use dbus::blocking::Connection;
use dbus::message::SignalArgs;
use tracing::{debug, info, warn};

use crate::config::BleConfig;
use crate::error::TransportError;
use crate::session::Transport;
use crate::types::TransportEvent;

fn device_path(cfg: &BleConfig, target_mac: &str) -> String {
    format!("{}/dev_{}", cfg.adapter_path, target_mac.replace(':', "_"))
}

/// Lado de escritura: una conexión D-Bus propia del hilo del controlador.
pub struct BluezTransport {
    conn: Connection,
    write_path: String,
    timeout: Duration,
}

impl BluezTransport {
    /// Enciende el adaptador y conecta con el anillo (un reintento, como mucho).
    pub fn connect(target_mac: &str, cfg: &BleConfig) -> Result<Self, TransportError> {
        let conn = Connection::new_system()?;
        let timeout = Duration::from_secs(cfg.timeout_secs);
        debug!("conectado a D-Bus del sistema");

        let adapter_proxy = conn.with_proxy("org.bluez", &cfg.adapter_path, timeout);
        let _: () = adapter_proxy.method_call(
            "org.freedesktop.DBus.Properties",
            "Set",
            ("org.bluez.Adapter1", "Powered", Variant(true)),
        )?;
        info!("adaptador Bluetooth encendido");

        let device_path = device_path(cfg, target_mac);
        let device_proxy = conn.with_proxy("org.bluez", &device_path, timeout);

        if let Err(e) = device_proxy.method_call::<(), _, _, _>("org.bluez.Device1", "Connect", ()) {
            warn!(mac = target_mac, error = %e, "no se pudo conectar, reintentando en 3 s");
            std::thread::sleep(Duration::from_secs(3));
            device_proxy.method_call::<(), _, _, _>("org.bluez.Device1", "Connect", ())?;
        }
        info!(mac = target_mac, "anillo conectado");

        Ok(Self {
            write_path: format!("{}/{}", device_path, cfg.write_char),
            conn,
            timeout,
        })
    }
}

impl Transport for BluezTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let proxy = self.conn.with_proxy("org.bluez", &self.write_path, self.timeout);
        proxy
            .method_call::<(), _, _, _>(
                "org.bluez.GattCharacteristic1",
                "WriteValue",
                (frame.to_vec(), PropMap::new()),
            )
            .map_err(|e| {
                if e.name() == Some("org.bluez.Error.NotConnected") {
                    TransportError::Disconnected
                } else {
                    TransportError::DBus(e)
                }
            })
    }
}

/// Activa las notificaciones y entrega cada trama por `tx` hasta que el
/// dispositivo se desconecta. Bloquea el hilo que la llama.
pub fn start_ble_receiver(
    target_mac: &str,
    cfg: &BleConfig,
    tx: Sender<TransportEvent>,
) -> Result<(), TransportError> {
    let conn = Connection::new_system()?;
    let timeout = Duration::from_secs(cfg.timeout_secs);
    let device_path = device_path(cfg, target_mac);
    let char_path = format!("{}/{}", device_path, cfg.notify_char);

    let char_proxy = conn.with_proxy("org.bluez", &char_path, timeout);
    char_proxy.method_call::<(), _, _, _>("org.bluez.GattCharacteristic1", "StartNotify", ())?;
    info!(path = %char_path, "notificaciones BLE iniciadas");

    let disconnected = Arc::new(AtomicBool::new(false));
    let disconnected_cb = Arc::clone(&disconnected);

    conn.add_match(PC::match_rule(None, None), move |pc: PC, _, msg| {
        let path = msg.path().map(|p| p.to_string());

        if path.as_deref() == Some(char_path.as_str()) {
            if let Some(value) = pc
                .changed_properties
                .get("Value")
                .and_then(|v| v.0.as_iter())
                .map(|iter| iter.filter_map(|item| item.as_u64().map(|b| b as u8)).collect::<Vec<u8>>())
            {
                let _ = tx.send(TransportEvent::Frame(value));
            }
        } else if path.as_deref() == Some(device_path.as_str()) {
            let connected = pc.changed_properties.get("Connected").and_then(|v| v.0.as_u64());
            if connected == Some(0) && !disconnected_cb.swap(true, Ordering::SeqCst) {
                let _ = tx.send(TransportEvent::Disconnected);
            }
        }
        true
    })?;

    while !disconnected.load(Ordering::SeqCst) {
        conn.process(Duration::from_secs(1))?;
    }
    info!("receptor BLE terminado");
    Ok(())
}
