use std::env;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use crossbeam_channel::unbounded;

use anillo::config::RingConfig;
use anillo::csv_loader::load_rows_from_csv;
use anillo::error::TransportError;
use anillo::gesture_classifier::GestureClassifier;
use anillo::pipeline::MotionPipeline;
use anillo::session::{SessionController, Transport};
use anillo::storage::JsonFileStore;
use anillo::types::RingEvent;

/// Sin anillo no hay a quién escribir.
struct Offline;

impl Transport for Offline {
    fn send(&mut self, _frame: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Disconnected)
    }
}

struct ReplayOptions {
    pointer: bool,
    config: Option<PathBuf>,
    dump_samples: bool,
}

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut args = env::args().skip(1);
    let mut opts = ReplayOptions {
        pointer: false,
        config: None,
        dump_samples: false,
    };
    let mut csv_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pointer" => opts.pointer = true,
            "--dump-samples" => opts.dump_samples = true,
            "--config" => {
                opts.config = Some(PathBuf::from(
                    args.next().ok_or_else(|| anyhow!("--config necesita una ruta"))?,
                ));
            }
            _ => {
                if csv_path.is_some() {
                    bail!("Uso: replay_csv [--pointer] [--dump-samples] [--config ruta] <captura.csv>");
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV"))?;
    Ok((csv_path, opts))
}

fn main() -> Result<()> {
    let (csv_path, opts) = parse_args()?;
    let cfg = match &opts.config {
        Some(path) => RingConfig::load(path)?,
        None => RingConfig::default(),
    };
    println!("🎞️  Reproduciendo captura desde {:?}", csv_path);

    let rows = load_rows_from_csv(&csv_path)?;
    let store = JsonFileStore::new(cfg.templates_path());
    let (classifier, load_error) = GestureClassifier::from_store(&store);
    if let Some(e) = load_error {
        println!("⚠️  Biblioteca ignorada ({})", e);
    }
    println!(
        "ℹ️  {} muestras, {} plantillas en {:?}",
        rows.len(),
        classifier.templates().len(),
        store.path()
    );

    // Las filas se reconstruyen como tramas y pasan por el mismo controlador
    // que en vivo, así se ejercita también el códec y el decodificador.
    let (events_tx, events_rx) = unbounded();
    let mut controller: SessionController<Offline> =
        SessionController::new(cfg.session, events_tx);
    let mut pipeline = MotionPipeline::new(cfg.pointer, &cfg.detectors, cfg.classifier, opts.pointer);

    let origin = Instant::now();
    let mut clicks = 0usize;
    let mut matches = 0usize;
    let mut last_pointer = None;

    for row in &rows {
        let frame = row.to_frame()?;
        controller.handle_frame(&frame, row.to_sample(origin).timestamp);

        for event in events_rx.try_iter() {
            let RingEvent::Motion(sample) = event else {
                continue;
            };
            if opts.dump_samples {
                println!(
                    "  {:>6} ms  g=({:>6.3}, {:>6.3}, {:>6.3})  pitch={:>7.2}°  roll={:>7.2}°",
                    row.t_ms,
                    sample.g_x,
                    sample.g_y,
                    sample.g_z,
                    sample.pitch.to_degrees(),
                    sample.roll.to_degrees()
                );
            }

            let out = pipeline.process(&classifier, &sample);
            if out.pointer.is_some() {
                last_pointer = out.pointer;
            }
            for event in out.events {
                match event {
                    RingEvent::Click(click) => {
                        clicks += 1;
                        println!("🖱️  {:>6} ms  {:?}", row.t_ms, click);
                    }
                    RingEvent::GestureMatched { name, confidence } => {
                        matches += 1;
                        println!("🥇 {:>6} ms  {} ({:.1}%)", row.t_ms, name, confidence);
                    }
                    _ => {}
                }
            }
        }
    }

    println!("\n{} clicks, {} gestos reconocidos", clicks, matches);
    if let Some(p) = last_pointer {
        println!("Posición final del cursor: ({:.0}, {:.0})", p.x, p.y);
    }
    Ok(())
}
