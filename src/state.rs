// Loaded project state
// A Session pairs the parsed model with the archive it came from
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::archive::{ArchiveError, ProjectArchive};
use crate::project::{ParseError, ProjectModel};

/// Entry holding the project description, at the archive root
pub const PROJECT_XML: &str = "project.xml";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("project.xml not found in archive")]
    MissingProjectXml,
    #[error("project.xml is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A loaded project. Immutable; reloading builds a new Session.
#[derive(Debug, Clone)]
pub struct Session {
    model: Arc<ProjectModel>,
    archive: Arc<ProjectArchive>,
}

impl Session {
    /// Open a project archive from memory and parse its project.xml
    pub fn load(bytes: impl Into<Arc<[u8]>>) -> Result<Self, LoadError> {
        let archive = ProjectArchive::open(bytes)?;
        let xml = archive.read(PROJECT_XML).ok_or(LoadError::MissingProjectXml)?;
        let text = String::from_utf8(xml)?;
        let model = ProjectModel::from_xml(&text)?;

        Ok(Self {
            model: Arc::new(model),
            archive: Arc::new(archive),
        })
    }

    pub fn load_file(path: &Path) -> Result<Self, LoadError> {
        log::info!("Loading project {:?}", path);
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(bytes)
    }

    pub fn model(&self) -> &Arc<ProjectModel> {
        &self.model
    }

    pub fn archive(&self) -> &Arc<ProjectArchive> {
        &self.archive
    }
}
