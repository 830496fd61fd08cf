//! Controlador de sesión: estado del protocolo con el anillo.
//!
//! Recibe tramas en orden de llegada, mantiene las sesiones de monitoreo en
//! tiempo real (pulso, SpO2) y la acumulación de pasos del día, y publica
//! eventos de dominio por un canal. No es reentrante: todo se ejecuta desde
//! un único bucle de eventos ([`SessionController::run`]).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FrameError, SessionError, TransportError};
use crate::motion_decoder;
use crate::protocol::{self, Frame, ReadingKind};
use crate::types::{RingEvent, StepInterval, TransportEvent, TIME_INDEX_COUNT};

/// Primitiva de envío del colaborador de transporte.
///
/// `&mut self` garantiza una sola escritura en curso: el siguiente comando
/// no se emite hasta que el anterior termina o falla.
pub trait Transport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub heart_rate_timeout_ms: u64,
    pub spo2_timeout_ms: u64,
    pub supervision_period_ms: u64,
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heart_rate_timeout_ms: 10_000,
            spo2_timeout_ms: 15_000,
            supervision_period_ms: 1_000,
            channel_capacity: 100,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self, kind: ReadingKind) -> Duration {
        match kind {
            ReadingKind::HeartRate => Duration::from_millis(self.heart_rate_timeout_ms),
            ReadingKind::SpO2 => Duration::from_millis(self.spo2_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoringSession {
    pub state: SessionState,
    pub last_frame_time: Option<Instant>,
    started_at: Option<Instant>,
    /// Ya se avisó de este hueco de silencio; se rearma con la próxima trama
    warned: bool,
}

impl MonitoringSession {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            last_frame_time: None,
            started_at: None,
            warned: false,
        }
    }
}

/// Comandos que la capa superior pide ejecutar dentro del bucle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartMonitoring(ReadingKind),
    StopMonitoring(ReadingKind),
    RequestDailySteps(u8),
    RequestBattery,
    Reboot,
    RawMode(bool),
}

enum StepsFrame {
    NoData,
    Metadata { new_calorie_protocol: bool },
    Interval {
        interval: StepInterval,
        packet_index: u8,
        packet_count: u8,
    },
}

pub struct SessionController<T: Transport> {
    transport: Option<T>,
    heart_rate: MonitoringSession,
    spo2: MonitoringSession,
    steps: BTreeMap<u8, StepInterval>,
    new_calorie_protocol: bool,
    raw_mode: bool,
    config: SessionConfig,
    events: Sender<RingEvent>,
}

impl<T: Transport> SessionController<T> {
    pub fn new(config: SessionConfig, events: Sender<RingEvent>) -> Self {
        Self {
            transport: None,
            heart_rate: MonitoringSession::idle(),
            spo2: MonitoringSession::idle(),
            steps: BTreeMap::new(),
            new_calorie_protocol: false,
            raw_mode: false,
            config,
            events,
        }
    }

    pub fn attach(&mut self, transport: T) {
        self.transport = Some(transport);
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn session(&self, kind: ReadingKind) -> &MonitoringSession {
        match kind {
            ReadingKind::HeartRate => &self.heart_rate,
            ReadingKind::SpO2 => &self.spo2,
        }
    }

    fn session_mut(&mut self, kind: ReadingKind) -> &mut MonitoringSession {
        match kind {
            ReadingKind::HeartRate => &mut self.heart_rate,
            ReadingKind::SpO2 => &mut self.spo2,
        }
    }

    pub fn raw_mode_enabled(&self) -> bool {
        self.raw_mode
    }

    /// Total diario recalculado sobre las franjas distintas que hay ahora.
    pub fn daily_total(&self) -> u32 {
        self.steps.values().map(|i| i.steps as u32).sum()
    }

    pub fn step_intervals(&self) -> Vec<StepInterval> {
        self.steps.values().copied().collect()
    }

    fn emit(&self, event: RingEvent) {
        let _ = self.events.send(event);
    }

    fn send_command(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
        transport.send(frame).map_err(|e| {
            warn!(command = frame[0], error = %e, "fallo al enviar comando");
            SessionError::from(e)
        })
    }

    pub fn execute(&mut self, command: Command, now: Instant) -> Result<(), SessionError> {
        match command {
            Command::StartMonitoring(kind) => self.start_monitoring(kind, now),
            Command::StopMonitoring(kind) => self.stop_monitoring(kind),
            Command::RequestDailySteps(day) => self.request_daily_steps(day),
            Command::RequestBattery => self.request_battery(),
            Command::Reboot => self.reboot(),
            Command::RawMode(true) => self.start_raw_mode(),
            Command::RawMode(false) => self.stop_raw_mode(),
        }
    }

    pub fn start_monitoring(&mut self, kind: ReadingKind, now: Instant) -> Result<(), SessionError> {
        if self.session(kind).state != SessionState::Idle {
            debug!(kind = kind.as_str(), "sesión ya en curso");
            return Ok(());
        }
        self.send_command(&protocol::realtime_start(kind))?;

        let session = self.session_mut(kind);
        session.state = SessionState::Starting;
        session.started_at = Some(now);
        session.last_frame_time = None;
        session.warned = false;
        info!(kind = kind.as_str(), "monitoreo iniciado");
        Ok(())
    }

    /// El anillo no confirma el stop, así que se vuelve a `Idle` en cuanto se envía.
    pub fn stop_monitoring(&mut self, kind: ReadingKind) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if self.session(kind).state == SessionState::Idle {
            return Ok(());
        }

        let previous = self.session(kind).state;
        self.session_mut(kind).state = SessionState::Stopping;
        if let Err(e) = self.send_command(&protocol::realtime_stop(kind)) {
            self.session_mut(kind).state = previous;
            return Err(e);
        }

        *self.session_mut(kind) = MonitoringSession::idle();
        info!(kind = kind.as_str(), "monitoreo detenido");
        Ok(())
    }

    /// Pide los pasos de `day_offset` días atrás; empieza una acumulación nueva.
    pub fn request_daily_steps(&mut self, day_offset: u8) -> Result<(), SessionError> {
        self.send_command(&protocol::steps_request(day_offset))?;
        self.steps.clear();
        self.new_calorie_protocol = false;
        Ok(())
    }

    pub fn request_battery(&mut self) -> Result<(), SessionError> {
        self.send_command(&protocol::battery_request())
    }

    pub fn reboot(&mut self) -> Result<(), SessionError> {
        self.send_command(&protocol::reboot_request())
    }

    pub fn start_raw_mode(&mut self) -> Result<(), SessionError> {
        self.send_command(&protocol::raw_mode(true))?;
        self.raw_mode = true;
        Ok(())
    }

    pub fn stop_raw_mode(&mut self) -> Result<(), SessionError> {
        self.send_command(&protocol::raw_mode(false))?;
        self.raw_mode = false;
        Ok(())
    }

    /// Procesa una notificación. Las tramas inválidas o desconocidas se
    /// descartan con un log; nunca se convierten en errores de sesión.
    pub fn handle_frame(&mut self, bytes: &[u8], now: Instant) {
        let frame = match protocol::check_frame(bytes) {
            Ok(frame) => *frame,
            Err(e) => {
                debug!(error = %e, "trama descartada");
                return;
            }
        };

        match frame[0] {
            protocol::CMD_BATTERY => self.emit(RingEvent::Battery {
                level: frame[1].min(100),
                charging: frame[2] != 0,
            }),
            protocol::CMD_REALTIME_START => self.handle_realtime(&frame, now),
            protocol::CMD_REALTIME_STOP => debug!("confirmación de stop"),
            protocol::CMD_STEPS => self.handle_steps(&frame),
            protocol::CMD_RAW => self.handle_raw(&frame, now),
            other => {
                let e = FrameError::UnknownCommand(other);
                warn!(error = %e, "trama descartada");
            }
        }
    }

    fn handle_realtime(&mut self, frame: &Frame, now: Instant) {
        let Some(kind) = ReadingKind::from_code(frame[1]) else {
            debug!(code = frame[1], "lectura en tiempo real de tipo desconocido");
            return;
        };

        let session = self.session_mut(kind);
        match session.state {
            SessionState::Starting | SessionState::Active => {
                session.state = SessionState::Active;
                session.last_frame_time = Some(now);
                session.warned = false;
            }
            SessionState::Idle | SessionState::Stopping => {
                debug!(kind = kind.as_str(), "dato de una sesión no iniciada, ignorado");
                return;
            }
        }

        let error_code = frame[2];
        if error_code != 0 {
            warn!(kind = kind.as_str(), error_code, "el anillo reportó error de lectura");
            return;
        }

        // 0 o fuera de rango: el sensor sigue adquiriendo
        let value = frame[3];
        if !kind.valid_range().contains(&value) {
            return;
        }

        match kind {
            ReadingKind::HeartRate => self.emit(RingEvent::HeartRate { bpm: value }),
            ReadingKind::SpO2 => self.emit(RingEvent::SpO2 { percent: value }),
        }
    }

    fn parse_steps(&self, frame: &Frame) -> Option<StepsFrame> {
        match frame[1] {
            protocol::STEPS_NO_DATA => return Some(StepsFrame::NoData),
            protocol::STEPS_METADATA => {
                return Some(StepsFrame::Metadata {
                    new_calorie_protocol: frame[3] == 0x01,
                })
            }
            _ => {}
        }

        let time_index = frame[4];
        if time_index >= TIME_INDEX_COUNT {
            warn!(time_index, "franja de pasos fuera de rango, trama descartada");
            return None;
        }

        let mut calories = u16::from_le_bytes([frame[7], frame[8]]) as u32;
        if self.new_calorie_protocol {
            calories *= 10;
        }

        debug!(
            year = 2000 + protocol::bcd_to_decimal(frame[1]) as u16,
            month = protocol::bcd_to_decimal(frame[2]),
            day = protocol::bcd_to_decimal(frame[3]),
            time_index,
            "franja de pasos"
        );

        Some(StepsFrame::Interval {
            interval: StepInterval {
                time_index,
                steps: u16::from_le_bytes([frame[9], frame[10]]),
                calories,
                distance_meters: u16::from_le_bytes([frame[11], frame[12]]),
            },
            packet_index: frame[5],
            packet_count: frame[6],
        })
    }

    fn handle_steps(&mut self, frame: &Frame) {
        match self.parse_steps(frame) {
            None => {}
            Some(StepsFrame::NoData) => {
                self.steps.clear();
                self.emit(RingEvent::StepsUpdated {
                    total: 0,
                    intervals: Vec::new(),
                    complete: true,
                });
            }
            Some(StepsFrame::Metadata {
                new_calorie_protocol,
            }) => {
                self.new_calorie_protocol = new_calorie_protocol;
            }
            Some(StepsFrame::Interval {
                interval,
                packet_index,
                packet_count,
            }) => {
                // Sobrescribe: la misma franja repetida no se suma
                self.steps.insert(interval.time_index, interval);
                self.emit(RingEvent::StepsUpdated {
                    total: self.daily_total(),
                    intervals: self.step_intervals(),
                    complete: packet_count > 0 && packet_index.saturating_add(1) >= packet_count,
                });
            }
        }
    }

    /// Las tramas crudas se decodifican aunque el modo esté apagado: pueden
    /// llegar tarde tras un stop y la capa consumidora decide si las usa.
    fn handle_raw(&mut self, frame: &Frame, now: Instant) {
        match motion_decoder::decode(frame, now) {
            Some(sample) => self.emit(RingEvent::Motion(sample)),
            None => {
                let subtype = match frame[1] {
                    protocol::RAW_SUBTYPE_SPO2 => "spo2",
                    protocol::RAW_SUBTYPE_PPG => "ppg",
                    _ => "desconocido",
                };
                debug!(subtype, code = frame[1], "trama cruda que no es de movimiento, descartada");
            }
        }
    }

    /// Supervisión de vitalidad. Solo avisa: no cambia el estado de la sesión.
    pub fn check_liveness(&mut self, now: Instant) -> Vec<ReadingKind> {
        let mut warned = Vec::new();
        for kind in ReadingKind::ALL {
            let timeout = self.config.timeout(kind);
            let session = self.session_mut(kind);
            if !matches!(session.state, SessionState::Starting | SessionState::Active) || session.warned {
                continue;
            }
            let Some(reference) = session.last_frame_time.or(session.started_at) else {
                continue;
            };
            let silent_for = now.saturating_duration_since(reference);
            if silent_for > timeout {
                session.warned = true;
                warn!(kind = kind.as_str(), silent_ms = silent_for.as_millis() as u64, "sin datos del anillo");
                self.emit(RingEvent::LivenessWarning { kind, silent_for });
                warned.push(kind);
            }
        }
        warned
    }

    /// Señal de desconexión: todo vuelve a `Idle` y se limpian los pasos.
    pub fn handle_disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!("anillo desconectado");
        }
        self.heart_rate = MonitoringSession::idle();
        self.spo2 = MonitoringSession::idle();
        self.steps.clear();
        self.new_calorie_protocol = false;
        self.raw_mode = false;
    }

    /// Bucle de eventos de un solo consumidor: tramas, comandos y el tick de
    /// supervisión se procesan estrictamente en orden. Termina cuando se
    /// cierra el canal de entrada.
    pub fn run(&mut self, inbound: Receiver<TransportEvent>, commands: Receiver<Command>) {
        let ticker = tick(Duration::from_millis(self.config.supervision_period_ms));
        let mut commands_open = true;

        loop {
            select! {
                recv(inbound) -> msg => match msg {
                    Ok(TransportEvent::Frame(bytes)) => self.handle_frame(&bytes, Instant::now()),
                    Ok(TransportEvent::Disconnected) => self.handle_disconnect(),
                    Err(_) => break,
                },
                recv(if commands_open { commands.clone() } else { crossbeam_channel::never() }) -> cmd => match cmd {
                    Ok(cmd) => {
                        if let Err(e) = self.execute(cmd, Instant::now()) {
                            warn!(?cmd, error = %e, "comando rechazado");
                        }
                    }
                    Err(_) => commands_open = false,
                },
                recv(ticker) -> _ => {
                    self.check_liveness(Instant::now());
                }
            }
        }
    }
}
