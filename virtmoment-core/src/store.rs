//! On-disk moment metadata.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<domain>/<name>.xml   one definition per moment
//! <root>/<domain>/current      name of the current moment
//! ```

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::CheckpointDef;
use crate::config::MomentConfig;
use crate::error::{MomentError, Result};
use crate::moment::{MomentDef, MomentObjList};
use crate::snapshot::SnapshotDef;

const CURRENT_FILE: &str = "current";
const XML_EXT: &str = "xml";

/// A definition that can be written to and read back from the store.
pub trait PersistedDef: MomentDef + Sized {
    fn to_xml(&self) -> Result<String>;
    fn from_xml(xml: &str) -> Result<Self>;
}

impl PersistedDef for SnapshotDef {
    fn to_xml(&self) -> Result<String> {
        SnapshotDef::to_xml(self)
    }

    fn from_xml(xml: &str) -> Result<Self> {
        SnapshotDef::from_xml(xml)
    }
}

impl PersistedDef for CheckpointDef {
    fn to_xml(&self) -> Result<String> {
        CheckpointDef::to_xml(self)
    }

    fn from_xml(xml: &str) -> Result<Self> {
        CheckpointDef::from_xml(xml)
    }
}

/// Directory-backed metadata store for one kind of moment.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store for the snapshots configured in `config`, if any.
    pub fn snapshots(config: &MomentConfig) -> Option<Self> {
        config.store.snapshot_dir.as_ref().map(Self::new)
    }

    /// Store for the checkpoints configured in `config`, if any.
    pub fn checkpoints(config: &MomentConfig) -> Option<Self> {
        config.store.checkpoint_dir.as_ref().map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn domain_dir(&self, domain: &str) -> Result<PathBuf> {
        if domain.is_empty() || domain.contains('/') || domain.starts_with('.') {
            return Err(MomentError::InvalidDefinition(format!(
                "invalid domain name '{}'",
                domain
            )));
        }
        Ok(self.root.join(domain))
    }

    fn moment_path(&self, domain: &str, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') {
            return Err(MomentError::InvalidDefinition(format!(
                "invalid moment name '{}'",
                name
            )));
        }
        Ok(self.domain_dir(domain)?.join(format!("{}.{}", name, XML_EXT)))
    }

    /// Write the definition of one moment, replacing any previous copy.
    #[instrument(skip(self, def), fields(moment = %def.name()))]
    pub async fn save<D: PersistedDef>(&self, domain: &str, def: &D) -> Result<()> {
        let path = self.moment_path(domain, def.name())?;
        let xml = def.to_xml()?;
        write_atomic(&path, xml.as_bytes()).await?;
        debug!(path = %path.display(), "Moment metadata saved");
        Ok(())
    }

    /// Delete the definition of one moment. Missing files are fine.
    #[instrument(skip(self))]
    pub async fn remove(&self, domain: &str, name: &str) -> Result<()> {
        let path = self.moment_path(domain, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Moment metadata removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Record the current moment (`None` clears the marker).
    #[instrument(skip(self))]
    pub async fn set_current(&self, domain: &str, name: Option<&str>) -> Result<()> {
        let path = self.domain_dir(domain)?.join(CURRENT_FILE);
        match name {
            Some(name) => write_atomic(&path, name.as_bytes()).await,
            None => match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Drop all metadata of a domain.
    #[instrument(skip(self))]
    pub async fn remove_domain(&self, domain: &str) -> Result<()> {
        let dir = self.domain_dir(domain)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Domain moment metadata removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild the moment forest of a domain from disk.
    ///
    /// Files are read in directory order, which is arbitrary, so every
    /// definition is assigned first and relations are resolved afterwards.
    /// Unreadable definitions are skipped. Inconsistent relations are
    /// logged and the affected moments end up at the top level.
    #[instrument(skip(self))]
    pub async fn load_domain<D: PersistedDef>(&self, domain: &str) -> Result<MomentObjList<D>> {
        let dir = self.domain_dir(domain)?;
        let mut list = MomentObjList::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(list),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(XML_EXT) {
                continue;
            }

            let xml = tokio::fs::read_to_string(&path).await?;
            let def = match D::from_xml(&xml) {
                Ok(def) => def,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse moment metadata");
                    continue;
                }
            };
            if let Err(e) = list.assign_def(def) {
                warn!(path = %path.display(), error = %e, "Failed to load moment metadata");
            }
        }

        if let Err(e) = list.update_relations() {
            warn!(error = %e, "Moments have inconsistent relations");
        }

        match tokio::fs::read_to_string(dir.join(CURRENT_FILE)).await {
            Ok(name) => {
                let name = name.trim();
                match list.find_by_name(name) {
                    Some(id) => list.set_current(Some(id)),
                    None => warn!(current = %name, "Current moment not found"),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(count = list.size(), current = ?list.current_name(), "Moment metadata loaded");
        Ok(list)
    }
}

/// Write through a temporary file so readers never see a partial file.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("new");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
