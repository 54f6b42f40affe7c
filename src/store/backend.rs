//! Store backends: ephemeral memory and persisted JSON files

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::OutputFormat;
use crate::error::{DeployError, Result};

use super::document::DeploymentDocument;

/// Which backend a session writes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    JsonFile,
}

impl BackendKind {
    pub fn is_persistent(&self) -> bool {
        matches!(self, BackendKind::JsonFile)
    }
}

/// Where a deployment document is loaded from and saved to
pub trait StoreBackend: std::fmt::Debug + Send {
    fn kind(&self) -> BackendKind;

    /// Load the saved document, or None when nothing was saved yet
    fn load(&self) -> Result<Option<DeploymentDocument>>;

    fn save(&mut self, document: &DeploymentDocument) -> Result<()>;
}

/// Keeps the last saved document in memory only
#[derive(Debug, Default)]
pub struct MemoryBackend {
    document: Option<DeploymentDocument>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> Option<&DeploymentDocument> {
        self.document.as_ref()
    }
}

impl StoreBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn load(&self) -> Result<Option<DeploymentDocument>> {
        Ok(self.document.clone())
    }

    fn save(&mut self, document: &DeploymentDocument) -> Result<()> {
        self.document = Some(document.clone());
        Ok(())
    }
}

/// Persists the document as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
    format: OutputFormat,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: OutputFormat::Pretty,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate a document from any path
    pub fn read(path: &Path) -> Result<Option<DeploymentDocument>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let document = DeploymentDocument::from_json_str(&content).map_err(|e| {
            DeployError::InvalidDocument(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(document))
    }
}

impl StoreBackend for JsonFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::JsonFile
    }

    fn load(&self) -> Result<Option<DeploymentDocument>> {
        Self::read(&self.path)
    }

    /// Save atomically (tmp + rename)
    fn save(&mut self, document: &DeploymentDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = match self.format {
            OutputFormat::Pretty => serde_json::to_vec_pretty(document)?,
            OutputFormat::Compact => serde_json::to_vec(document)?,
        };

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(format!(".{}.tmp", std::process::id()));
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), runs = document.runs.len(), "saved deployment document");
        Ok(())
    }
}
