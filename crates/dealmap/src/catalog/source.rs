use std::fs;
use std::path::{Path, PathBuf};

use super::domain::CatalogDocument;

/// Backing store the catalog is loaded from. Loads are whole-document and blocking.
pub trait CatalogSource: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> Result<CatalogDocument, CatalogLoadError>;
}

/// Error raised when a catalog document cannot be read or parsed.
#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("catalog source unavailable: {0}")]
    Unavailable(String),
}

/// Reads the catalog from a JSON export on disk.
#[derive(Debug, Clone)]
pub struct JsonFileCatalogSource {
    path: PathBuf,
}

impl JsonFileCatalogSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for JsonFileCatalogSource {
    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }

    fn load(&self) -> Result<CatalogDocument, CatalogLoadError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| CatalogLoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| CatalogLoadError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

/// Serves a fixed in-memory document; used for seeded demos and tests.
#[derive(Debug, Clone)]
pub struct StaticCatalogSource {
    document: CatalogDocument,
}

impl StaticCatalogSource {
    pub fn new(document: CatalogDocument) -> Self {
        Self { document }
    }
}

impl CatalogSource for StaticCatalogSource {
    fn describe(&self) -> String {
        match &self.document.label {
            Some(label) => format!("static document '{label}'"),
            None => "static document".to_string(),
        }
    }

    fn load(&self) -> Result<CatalogDocument, CatalogLoadError> {
        Ok(self.document.clone())
    }
}
