//! Storage-Backend fuer Anhaenge
//!
//! Das `StorageBackend`-Trait abstrahiert den Zielspeicher der Uploads.

use std::path::{Component, Path, PathBuf};

use crate::error::{ChatError, ChatResult};

/// Abstraktes Speicher-Backend fuer Anhaenge
#[allow(async_fn_in_trait)]
pub trait StorageBackend: Send + Sync {
    /// Anhang unter dem angegebenen Pfad speichern
    async fn store(&self, path: &str, data: &[u8]) -> ChatResult<()>;

    async fn retrieve(&self, path: &str) -> ChatResult<Vec<u8>>;

    /// Anhang loeschen; ein fehlender Anhang ist kein Fehler
    async fn delete(&self, path: &str) -> ChatResult<()>;
}

/// Speichert Anhaenge unter `base_dir/<path>`
#[derive(Debug, Clone)]
pub struct DiskStorage {
    base_dir: PathBuf,
}

impl DiskStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Nur relative Pfade ohne `..` bleiben unter `base_dir`
    fn full_path(&self, path: &str) -> ChatResult<PathBuf> {
        let relativ = Path::new(path);
        let sauber = relativ
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !sauber || path.is_empty() {
            return Err(ChatError::ungueltig(format!("Ungueltiger Speicherpfad: {}", path)));
        }
        Ok(self.base_dir.join(relativ))
    }
}

impl StorageBackend for DiskStorage {
    async fn store(&self, path: &str, data: &[u8]) -> ChatResult<()> {
        let full = self.full_path(path)?;

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full, data)
            .await
            .map_err(|e| ChatError::UploadFehlgeschlagen(format!("{}: {}", full.display(), e)))?;
        tracing::debug!(path = %full.display(), bytes = data.len(), "Anhang gespeichert");
        Ok(())
    }

    async fn retrieve(&self, path: &str) -> ChatResult<Vec<u8>> {
        let full = self.full_path(path)?;
        Ok(tokio::fs::read(&full).await?)
    }

    async fn delete(&self, path: &str) -> ChatResult<()> {
        let full = self.full_path(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {
                tracing::debug!(path = %full.display(), "Anhang geloescht");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
