use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context, Result};
use csv::ReaderBuilder;

use crate::motion_decoder::encode_motion_payload;
use crate::protocol::{build_frame, Frame, CMD_RAW};
use crate::types::MotionSample;

/// Una fila grabada: tiempo relativo y los tres valores crudos de 12 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedRow {
    pub t_ms: u64,
    pub raw_x: i16,
    pub raw_y: i16,
    pub raw_z: i16,
}

impl RecordedRow {
    pub fn to_sample(&self, origin: Instant) -> MotionSample {
        MotionSample::from_raw(
            self.raw_x,
            self.raw_y,
            self.raw_z,
            origin + Duration::from_millis(self.t_ms),
        )
    }

    /// Reconstruye la trama de modo crudo que habría enviado el anillo.
    pub fn to_frame(&self) -> Result<Frame> {
        let payload = encode_motion_payload(self.raw_x, self.raw_y, self.raw_z);
        Ok(build_frame(CMD_RAW, &payload[1..])?)
    }
}

fn parse_raw(value: &str, column: &str, row: usize) -> Result<i16> {
    let v: i16 = value
        .trim()
        .parse()
        .with_context(|| format!("{} inválido en fila {}", column, row))?;
    ensure!(
        (-2048..=2047).contains(&v),
        "{}={} fuera del rango de 12 bits en fila {}",
        column,
        v,
        row
    );
    Ok(v)
}

/// Carga una captura en el formato `t_ms,raw_x,raw_y,raw_z` (el que exporta
/// `GestureRecorder::to_csv`). Los tiempos deben ser no decrecientes.
pub fn load_rows_from_csv(path: impl AsRef<Path>) -> Result<Vec<RecordedRow>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut rows = Vec::new();
    let mut last_t = 0u64;

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Fila {} inválida en {:?}", row, path))?;
        if record.len() < 4 {
            bail!("La fila {} no tiene 4 columnas", row);
        }

        let t_ms: u64 = record[0]
            .trim()
            .parse()
            .with_context(|| format!("t_ms inválido en fila {}", row))?;
        ensure!(t_ms >= last_t, "t_ms decreciente en fila {}", row);
        last_t = t_ms;

        rows.push(RecordedRow {
            t_ms,
            raw_x: parse_raw(&record[1], "raw_x", row)?,
            raw_y: parse_raw(&record[2], "raw_y", row)?,
            raw_z: parse_raw(&record[3], "raw_z", row)?,
        });
    }

    ensure!(!rows.is_empty(), "El CSV {:?} no contiene datos", path);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion_decoder::decode;
    use crate::protocol::validate_frame;
    use std::fs;

    #[test]
    fn loads_recorder_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gesto.csv");
        fs::write(&path, "t_ms,raw_x,raw_y,raw_z\n0,10,-20,512\n50,11,-21,510\n").unwrap();

        let rows = load_rows_from_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], RecordedRow { t_ms: 50, raw_x: 11, raw_y: -21, raw_z: 510 });

        let frame = rows[0].to_frame().unwrap();
        assert!(validate_frame(&frame));
        let t0 = Instant::now();
        let decoded = decode(&frame, t0).unwrap();
        assert_eq!(decoded, rows[0].to_sample(t0));
    }

    #[test]
    fn rejects_out_of_range_and_unordered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("malo.csv");
        fs::write(&path, "t_ms,raw_x,raw_y,raw_z\n0,3000,0,0\n").unwrap();
        assert!(load_rows_from_csv(&path).is_err());

        fs::write(&path, "t_ms,raw_x,raw_y,raw_z\n100,0,0,0\n50,0,0,0\n").unwrap();
        assert!(load_rows_from_csv(&path).is_err());

        fs::write(&path, "t_ms,raw_x,raw_y,raw_z\n").unwrap();
        assert!(load_rows_from_csv(&path).is_err());
    }
}
