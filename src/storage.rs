//! Persistencia de plantillas de gestos como un único blob opaco.
//!
//! El núcleo siempre lee y escribe la lista completa; no hay
//! actualizaciones parciales.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::gesture_classifier::GestureTemplate;

pub trait TemplateStore {
    fn load_templates(&self) -> Result<Vec<GestureTemplate>, StorageError>;
    fn save_templates(&self, templates: &[GestureTemplate]) -> Result<(), StorageError>;
}

/// Decodifica y valida estructuralmente un blob de plantillas.
pub fn decode_blob(blob: &str) -> Result<Vec<GestureTemplate>, StorageError> {
    let templates: Vec<GestureTemplate> =
        serde_json::from_str(blob).map_err(|e| StorageError::Corrupted(e.to_string()))?;

    let mut names = HashSet::new();
    for t in &templates {
        t.validate().map_err(StorageError::Corrupted)?;
        if !names.insert(t.name.as_str()) {
            return Err(StorageError::Corrupted(format!("nombre duplicado {:?}", t.name)));
        }
    }
    Ok(templates)
}

pub fn encode_blob(templates: &[GestureTemplate]) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(templates)?)
}

/// Almacén en un fichero JSON. Un fichero inexistente equivale a ninguna plantilla.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemplateStore for JsonFileStore {
    fn load_templates(&self) -> Result<Vec<GestureTemplate>, StorageError> {
        let blob = match fs::read_to_string(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        decode_blob(&blob)
    }

    fn save_templates(&self, templates: &[GestureTemplate]) -> Result<(), StorageError> {
        let blob = encode_blob(templates)?;
        // Escritura atómica: fichero temporal + rename
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture_classifier::{GestureAction, GestureClassifier};
    use crate::types::Orientation;

    fn sample_templates() -> Vec<GestureTemplate> {
        let mut a = GestureTemplate::from_samples("puño", &[Orientation::new(0.1, 0.2, 0.3)]).unwrap();
        a.bound_action = Some(GestureAction::Image {
            path: "/tmp/foto.png".into(),
        });
        let b = GestureTemplate::from_samples("palma", &[Orientation::new(-0.4, 0.0, 1.2)]).unwrap();
        vec![a, b]
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("gestos.json"));
        assert!(store.load_templates().unwrap().is_empty());

        let templates = sample_templates();
        store.save_templates(&templates).unwrap();
        assert_eq!(store.load_templates().unwrap(), templates);
    }

    #[test]
    fn corrupted_blob_is_reported_and_classifier_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestos.json");
        fs::write(&path, "{ esto no es json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.load_templates(), Err(StorageError::Corrupted(_))));
        let (classifier, err) = GestureClassifier::from_store(&store);
        assert!(classifier.templates().is_empty());
        assert!(matches!(err, Some(StorageError::Corrupted(_))));
    }

    #[test]
    fn structural_validation_rejects_bad_ranges_and_duplicates() {
        let mut templates = sample_templates();
        templates[0].range.pitch.min = 5.0;
        let blob = encode_blob(&templates).unwrap();
        assert!(matches!(decode_blob(&blob), Err(StorageError::Corrupted(_))));

        let mut templates = sample_templates();
        templates[1].name = templates[0].name.clone();
        let blob = encode_blob(&templates).unwrap();
        assert!(matches!(decode_blob(&blob), Err(StorageError::Corrupted(_))));
    }
}
