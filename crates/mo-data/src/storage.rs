use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::Path;

use mo_types::{Candidate, DataError, MoResult};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Write `path` atomically.
///
/// `write` fills a temp file created next to the target; the temp file is
/// flushed, synced and renamed over `path` only if `write` succeeds. On any
/// error the target is left untouched.
pub fn write_atomic<P, F>(path: P, write: F) -> MoResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> MoResult<()>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| DataError::PersistFailed {
        path: path.display().to_string(),
        message: format!("cannot create temp file: {e}"),
    })?;
    write(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| DataError::PersistFailed {
        path: path.display().to_string(),
        message: e.error.to_string(),
    })?;

    tracing::debug!("Persisted {}", path.display());
    Ok(())
}

/// Current contents of `path`, or nothing if it does not exist yet.
pub(crate) fn read_existing(path: &Path) -> MoResult<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Persisted fitted classifier: the family that built it, the parameters it
/// was trained with and the family-specific model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub family: String,
    pub parameters: Candidate,
    pub model: serde_json::Value,
}

impl ModelArtifact {
    pub fn new(family: impl Into<String>, parameters: Candidate, model: serde_json::Value) -> Self {
        Self {
            family: family.into(),
            parameters,
            model,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> MoResult<()> {
        let path = path.as_ref();
        write_atomic(path, |file| {
            serde_json::to_writer_pretty(&mut *file, self)?;
            file.write_all(b"\n")?;
            Ok(())
        })?;
        tracing::info!("Saved {} model to {}", self.family, path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> MoResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let reader = BufReader::new(File::open(path)?);
        let artifact: Self = serde_json::from_reader(reader)?;
        tracing::debug!("Loaded {} model from {}", artifact.family, path.display());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mo_types::MoError;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, |file| {
            file.write_all(b"new contents")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new contents");
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old").unwrap();

        let result = write_atomic(&path, |file| {
            file.write_all(b"partial")?;
            Err(MoError::Internal("writer failed".into()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        // no stray temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_atomic_write_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("file.json");
        write_atomic(&path, |file| {
            file.write_all(b"{}")?;
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_model_artifact_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let artifact = ModelArtifact::new(
            "knn",
            Candidate::new().with("n_neighbors", 5i64).with("distance_weighted", true),
            json!({"k": 5, "points": [[0.0, 1.0]], "labels": [1]}),
        );
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_missing_model_file() {
        let dir = TempDir::new().unwrap();
        let err = ModelArtifact::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, MoError::Data(DataError::NotFound { .. })));
    }
}
