use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::models::{ResourceRecord, ResourceStatus, StateDocument};
use crate::cloud::ResourceKind;
use crate::error::{DrError, Result};

/// JSON-file-backed resource-state document. Every mutation is written
/// through before it returns.
pub struct StateStore {
    path: PathBuf,
    doc: StateDocument,
}

impl StateStore {
    /// Load `path` if it exists (a resumed run), else start a new document.
    pub fn open_or_create(path: &Path, compartment_id: &str) -> Result<Self> {
        if path.exists() {
            let store = Self::load(path)?;
            if store.doc.compartment_id != compartment_id {
                return Err(DrError::config(format!(
                    "{} belongs to compartment {}, not {}",
                    path.display(),
                    store.doc.compartment_id,
                    compartment_id
                )));
            }
            tracing::info!(
                path = %path.display(),
                resources = store.doc.resources.len(),
                "Resuming resource-state document"
            );
            return Ok(store);
        }
        let store = Self {
            path: path.to_path_buf(),
            doc: StateDocument::new(compartment_id),
        };
        store.save()?;
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            DrError::config(format!(
                "cannot read resource-state document {}: {}",
                path.display(),
                e
            ))
        })?;
        let doc: StateDocument = serde_json::from_str(&body)?;
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn doc(&self) -> &StateDocument {
        &self.doc
    }

    pub fn get(&self, address: &str) -> Option<&ResourceRecord> {
        self.doc.resources.get(address)
    }

    /// Identifier recorded at `address`, if any.
    pub fn id_of(&self, address: &str) -> Option<&str> {
        self.get(address).map(|r| r.id.as_str())
    }

    /// Atomic write: temp file in the same directory, then rename.
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.doc)?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| DrError::Io(e.error))?;
        Ok(())
    }

    /// Record a created or adopted resource at `address`. A resource this
    /// document already holds as `CREATED` stays `CREATED` when adopted again
    /// on a resumed run.
    pub fn record(
        &mut self,
        address: &str,
        kind: ResourceKind,
        id: &str,
        name: &str,
        status: ResourceStatus,
        parent: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let seq = self.doc.next_seq();
        let status = match self.doc.resources.get(address) {
            Some(prev) if prev.id == id && prev.status == ResourceStatus::Created => ResourceStatus::Created,
            _ => status,
        };
        let extra = self
            .doc
            .resources
            .get(address)
            .filter(|prev| prev.id == id)
            .map(|prev| prev.extra.clone())
            .unwrap_or_default();
        let seq = self
            .doc
            .resources
            .get(address)
            .filter(|prev| prev.id == id)
            .map_or(seq, |prev| prev.seq);

        tracing::debug!(address, kind = %kind, id, status = %status, "Recording resource");
        self.doc.resources.insert(
            address.to_string(),
            ResourceRecord {
                kind,
                id: id.to_string(),
                status,
                name: name.to_string(),
                compartment_id: self.doc.compartment_id.clone(),
                seq,
                parent: parent.map(str::to_string),
                extra,
                updated_at: now,
            },
        );
        self.doc.updated_at = now;
        self.save()
    }

    /// Attach facts (ip, uuid, export path) to a recorded resource.
    pub fn set_extra(&mut self, address: &str, values: BTreeMap<String, String>) -> Result<()> {
        let rec = self
            .doc
            .resources
            .get_mut(address)
            .ok_or_else(|| DrError::config(format!("no resource recorded at {}", address)))?;
        rec.extra.extend(values);
        rec.updated_at = Utc::now();
        self.save()
    }

    /// Move `address` to `status`; only forward transitions are allowed.
    pub fn set_status(&mut self, address: &str, status: ResourceStatus) -> Result<()> {
        let rec = self
            .doc
            .resources
            .get_mut(address)
            .ok_or_else(|| DrError::config(format!("no resource recorded at {}", address)))?;
        if !rec.status.can_become(status) {
            return Err(DrError::config(format!(
                "{} cannot go from {} to {}",
                address, rec.status, status
            )));
        }
        rec.status = status;
        rec.updated_at = Utc::now();
        self.save()
    }
}
