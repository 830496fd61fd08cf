/*
Daemon del anillo sensor sobre BLE.

Conecta con el anillo por BlueZ, arranca las sesiones pedidas y consume los
eventos: métricas en el log, puntero por /dev/uinput y gestos que lanzan su
acción asociada.

Uso:
    anillo <MAC> [--config anillo.json] [--pointer] [--hr] [--spo2]
                 [--steps N] [--record NOMBRE]

Para el puntero hace falta acceso a /dev/uinput:
    sg input -c './target/release/anillo AA:BB:CC:DD:EE:FF --pointer'

Nivel de log con RUST_LOG (por defecto `info`).
*/

use std::env;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, unbounded};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use anillo::actions::run_action;
use anillo::ble::{start_ble_receiver, BluezTransport};
use anillo::config::RingConfig;
use anillo::gesture_classifier::GestureClassifier;
use anillo::hid::HidOutput;
use anillo::pipeline::MotionPipeline;
use anillo::protocol::ReadingKind;
use anillo::session::{Command, SessionController};
use anillo::storage::JsonFileStore;
use anillo::types::{RingEvent, TransportEvent};

const USAGE: &str =
    "Uso: anillo <MAC> [--config ruta] [--pointer] [--hr] [--spo2] [--steps N] [--record NOMBRE]";

struct DaemonOptions {
    mac: String,
    config: Option<PathBuf>,
    pointer: bool,
    heart_rate: bool,
    spo2: bool,
    steps: Option<u8>,
    record: Option<String>,
}

fn parse_args() -> Result<DaemonOptions> {
    let mut args = env::args().skip(1);
    let mut opts = DaemonOptions {
        mac: String::new(),
        config: None,
        pointer: false,
        heart_rate: false,
        spo2: false,
        steps: None,
        record: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or_else(|| anyhow!("--config necesita una ruta"))?;
                opts.config = Some(PathBuf::from(path));
            }
            "--pointer" => opts.pointer = true,
            "--hr" => opts.heart_rate = true,
            "--spo2" => opts.spo2 = true,
            "--steps" => {
                let day = args.next().ok_or_else(|| anyhow!("--steps necesita un día"))?;
                opts.steps = Some(day.parse().with_context(|| format!("día inválido: {}", day))?);
            }
            "--record" => {
                opts.record = Some(args.next().ok_or_else(|| anyhow!("--record necesita un nombre"))?);
            }
            "-h" | "--help" => bail!(USAGE),
            _ if arg.starts_with("--") => bail!("Opción desconocida {}\n{}", arg, USAGE),
            _ => {
                if !opts.mac.is_empty() {
                    bail!(USAGE);
                }
                opts.mac = arg;
            }
        }
    }

    if opts.mac.is_empty() {
        bail!(USAGE);
    }
    Ok(opts)
}

fn initial_commands(opts: &DaemonOptions, needs_motion: bool) -> Vec<Command> {
    let mut commands = vec![Command::RequestBattery];
    if opts.heart_rate {
        commands.push(Command::StartMonitoring(ReadingKind::HeartRate));
    }
    if opts.spo2 {
        commands.push(Command::StartMonitoring(ReadingKind::SpO2));
    }
    if let Some(day) = opts.steps {
        commands.push(Command::RequestDailySteps(day));
    }
    if needs_motion {
        commands.push(Command::RawMode(true));
    }
    commands
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let opts = parse_args()?;
    let cfg = match &opts.config {
        Some(path) => RingConfig::load(path)?,
        None => RingConfig::default(),
    };

    let store = JsonFileStore::new(cfg.templates_path());
    let (mut classifier, load_error) = GestureClassifier::from_store(&store);
    if let Some(e) = load_error {
        warn!(path = ?store.path(), error = %e, "biblioteca de gestos ignorada");
    }
    info!(templates = classifier.templates().len(), "biblioteca de gestos cargada");

    let needs_motion = opts.pointer || opts.record.is_some() || !classifier.templates().is_empty();

    let (inbound_tx, inbound_rx) = bounded::<TransportEvent>(cfg.session.channel_capacity);
    let (commands_tx, commands_rx) = unbounded::<Command>();
    let (events_tx, events_rx) = unbounded::<RingEvent>();

    for command in initial_commands(&opts, needs_motion) {
        commands_tx.send(command)?;
    }

    // Hilo del controlador: dueño del transporte de escritura y de todo el
    // estado de sesión. El receptor BLE arranca cuando ya hay conexión.
    let mac = opts.mac.clone();
    let ble_cfg = cfg.ble.clone();
    let session_cfg = cfg.session;
    let controller = thread::spawn(move || -> Result<()> {
        let transport = BluezTransport::connect(&mac, &ble_cfg)
            .with_context(|| format!("No se pudo conectar con {}", mac))?;
        let mut controller = SessionController::new(session_cfg, events_tx);
        controller.attach(transport);

        thread::spawn(move || {
            if let Err(e) = start_ble_receiver(&mac, &ble_cfg, inbound_tx) {
                error!(error = %e, "error en el receptor BLE");
            }
        });

        controller.run(inbound_rx, commands_rx);
        Ok(())
    });

    let mut hid = if opts.pointer {
        match HidOutput::new() {
            Ok(h) => {
                info!("HID inicializado (/dev/uinput)");
                Some(h)
            }
            Err(e) => {
                error!(error = %e, "no se pudo inicializar HID, el puntero queda desactivado");
                None
            }
        }
    } else {
        None
    };

    let mut pipeline = MotionPipeline::new(
        cfg.pointer,
        &cfg.detectors,
        cfg.classifier,
        hid.is_some(),
    );
    if let Some(name) = &opts.record {
        pipeline.start_recording(name, Instant::now());
    }

    for event in events_rx.iter() {
        match event {
            RingEvent::Motion(sample) => {
                let out = pipeline.process(&classifier, &sample);

                if out.capture_full {
                    finish_recording(&mut pipeline, &mut classifier, &store)?;
                }

                if let (Some(hid), Some(update)) = (hid.as_mut(), out.pointer) {
                    if let Err(e) = hid.move_cursor(update.dx.round() as i32, update.dy.round() as i32) {
                        warn!(error = %e, "error moviendo cursor");
                    }
                }

                for event in out.events {
                    match event {
                        RingEvent::Click(click) => {
                            info!(?click, "click");
                            if let Some(hid) = hid.as_mut() {
                                if let Err(e) = hid.send(click) {
                                    warn!(?click, error = %e, "error enviando click");
                                }
                            }
                        }
                        RingEvent::GestureMatched { name, confidence } => {
                            info!(gesture = %name, confidence, "gesto reconocido");
                            if let Some(action) = classifier.get(&name).and_then(|t| t.bound_action.as_ref()) {
                                run_action(&name, action);
                            }
                        }
                        other => debug!(?other, "evento de movimiento"),
                    }
                }
            }
            RingEvent::Battery { level, charging } => info!(level, charging, "batería"),
            RingEvent::HeartRate { bpm } => info!(bpm, "pulso"),
            RingEvent::SpO2 { percent } => info!(percent, "SpO2"),
            RingEvent::StepsUpdated { total, intervals, complete } => {
                info!(total, intervals = intervals.len(), complete, "pasos");
                if complete {
                    for interval in &intervals {
                        debug!(?interval, "intervalo de pasos");
                    }
                }
            }
            RingEvent::LivenessWarning { kind, silent_for } => {
                warn!(kind = kind.as_str(), silent_ms = silent_for.as_millis() as u64, "sesión sin datos");
            }
            other => debug!(?other, "evento"),
        }
    }

    // El canal de eventos solo se cierra cuando termina el controlador.
    if pipeline.is_recording() {
        warn!(samples = pipeline.recorder().len(), "conexión perdida durante la grabación");
        finish_recording(&mut pipeline, &mut classifier, &store)?;
    }

    match controller.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("el hilo del controlador terminó con pánico")),
    }
}

/// Guarda la captura como plantilla y exporta las muestras a `<nombre>.csv`.
fn finish_recording(
    pipeline: &mut MotionPipeline,
    classifier: &mut GestureClassifier,
    store: &JsonFileStore,
) -> Result<()> {
    let template = match pipeline.finish_recording() {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "grabación descartada");
            return Ok(());
        }
    };
    let name = template.name.clone();

    let csv_path = PathBuf::from(format!("{}.csv", name));
    fs::write(&csv_path, pipeline.recorder().to_csv())
        .with_context(|| format!("No se pudo escribir {:?}", csv_path))?;

    if let Err(e) = classifier.add(template) {
        warn!(gesture = %name, error = %e, "plantilla no añadida");
        return Ok(());
    }
    classifier
        .save(store)
        .with_context(|| format!("No se pudo guardar la biblioteca en {:?}", store.path()))?;
    info!(gesture = %name, csv = ?csv_path, "plantilla guardada");
    Ok(())
}
