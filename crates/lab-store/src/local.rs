use crate::tree::{Node, Sidecar};
use crate::{tags_match, RecordStore, Result, StoreError};
use chrono::{DateTime, Utc};
use lab_record::{decode_record, encode_record_pretty, Record};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TREE_SCHEME: &str = "tree://";

const PAYLOAD_GLOB: &str = "record.*.json";

fn payload_name(label: &str) -> String {
    format!("record.{}.json", label)
}

/// Record store over a local directory tree: one container per project, one
/// leaf container per record, each leaf holding the JSON payload and a
/// sidecar stamping the owning project and the tag set.
///
/// The payload file is the source of truth; the tree is an index over it.
pub struct TreeRecordStore {
    root: PathBuf,
}

impl TreeRecordStore {
    pub fn open(uri: &str) -> Result<Self> {
        let path = uri.strip_prefix(TREE_SCHEME).unwrap_or(uri);
        Node::create(path)?;
        Ok(Self {
            root: PathBuf::from(path),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn root_node(&self) -> Result<Node> {
        Node::open(&self.root)
            .map_err(|_| StoreError::NotFound(format!("record store root {}", self.root.display())))
    }

    fn project_node(&self, project: &str) -> Result<Node> {
        self.root_node()?
            .child(project)
            .map_err(|_| StoreError::NotFound(format!("project {}", project)))
    }

    fn record_node(&self, project: &str, label: &str) -> Result<Node> {
        let missing = || StoreError::NotFound(format!("record {} in project {}", label, project));
        let node = self.project_node(project)?.child(label).map_err(|_| missing())?;
        if node.sidecar()?.project.as_deref() != Some(project) {
            return Err(missing());
        }
        Ok(node)
    }

    fn read_record(node: &Node) -> Result<Option<Record>> {
        let payloads = node.glob_files(PAYLOAD_GLOB)?;
        let Some(path) = payloads.first() else {
            return Ok(None);
        };
        let bytes = fs::read(path)?;
        Ok(Some(decode_record(&bytes)?))
    }

    fn backup_path(&self) -> PathBuf {
        let mut path = self.root.clone().into_os_string();
        path.push(".backup");
        PathBuf::from(path)
    }
}

impl fmt::Display for TreeRecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record store using a local file tree at {}", self.root.display())
    }
}

impl RecordStore for TreeRecordStore {
    fn list_projects(&self) -> Result<Vec<String>> {
        let mut projects: Vec<String> = self
            .root_node()?
            .children()?
            .iter()
            .map(|node| node.name())
            .collect();
        projects.sort();
        Ok(projects)
    }

    fn has_project(&self, project: &str) -> Result<bool> {
        Ok(self.root_node()?.has_child(project))
    }

    // No cross-step atomicity: a crash between the steps below leaves a
    // partially-initialized record container. Re-saving repairs it.
    fn save(&self, project: &str, record: &mut Record) -> Result<()> {
        let project_node = self.root_node()?.ensure_child(project)?;
        let record_node = project_node.ensure_child(&record.label)?;
        record_node.write_sidecar(&Sidecar {
            project: Some(project.to_string()),
            tags: record.tags.clone(),
        })?;
        let payload = encode_record_pretty(record)?;
        fs::write(record_node.path().join(payload_name(&record.label)), payload)?;
        debug!(project, label = %record.label, "stored record payload");
        Ok(())
    }

    fn get(&self, project: &str, label: &str) -> Result<Record> {
        let node = self.record_node(project, label)?;
        Self::read_record(&node)?
            .ok_or_else(|| StoreError::NotFound(format!("record {} in project {}", label, project)))
    }

    fn list(&self, project: &str, tags: Option<&[String]>) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for node in self.project_node(project)?.children()? {
            let sidecar = node.sidecar()?;
            if sidecar.project.as_deref() != Some(project) {
                continue;
            }
            if !tags_match(tags, &sidecar.tags) {
                continue;
            }
            if let Some(record) = Self::read_record(&node)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn labels(&self, project: &str, tags: Option<&[String]>) -> Result<Vec<String>> {
        let mut labels = Vec::new();
        for node in self.project_node(project)?.children()? {
            let sidecar = node.sidecar()?;
            if sidecar.project.as_deref() != Some(project) {
                continue;
            }
            if !tags_match(tags, &sidecar.tags) {
                continue;
            }
            if !node.glob_files(PAYLOAD_GLOB)?.is_empty() {
                labels.push(node.name());
            }
        }
        Ok(labels)
    }

    fn delete(&self, project: &str, label: &str) -> Result<()> {
        let node = self.record_node(project, label)?;
        node.remove_recursive()?;
        debug!(project, label, "deleted record container");
        Ok(())
    }

    fn delete_by_tag(&self, project: &str, tag: &str) -> Result<usize> {
        let filter = vec![tag.to_string()];
        let victims = self.labels(project, Some(&filter))?;
        for label in &victims {
            self.delete(project, label)?;
        }
        Ok(victims.len())
    }

    fn most_recent(&self, project: &str) -> Result<Option<String>> {
        let mut best: Option<(DateTime<Utc>, String)> = None;
        for record in self.list(project, None)? {
            // Strictly-greater keeps the first-encountered label on ties.
            match &best {
                Some((timestamp, _)) if record.timestamp <= *timestamp => {}
                _ => best = Some((record.timestamp, record.label)),
            }
        }
        Ok(best.map(|(_, label)| label))
    }

    fn backup(&self) -> Result<()> {
        let dest = self.backup_path();
        self.root_node()?.copy_recursive(&dest)?;
        debug!(dest = %dest.display(), "backed up record store");
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        // The backup must land before anything is destroyed.
        self.backup()?;
        self.root_node()?.remove_recursive()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let root = self.root_node()?;
        for project in self.list_projects()? {
            for label in self.labels(&project, None)? {
                self.delete(&project, &label)?;
            }
            root.remove_child(&project)?;
        }
        root.remove_recursive()?;
        Ok(())
    }

    fn accepts_uri(uri: &str) -> bool {
        uri.starts_with(TREE_SCHEME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_the_tree_scheme() {
        assert!(TreeRecordStore::accepts_uri("tree:///tmp/store"));
        assert!(!TreeRecordStore::accepts_uri("/tmp/store"));
        assert!(!TreeRecordStore::accepts_uri(
            "http://example.org/api/v1/private/token/"
        ));
    }

    #[test]
    fn payload_name_embeds_the_label() {
        assert_eq!(payload_name("run_1"), "record.run_1.json");
    }

    #[test]
    fn open_strips_the_scheme_prefix() {
        let dir = std::env::temp_dir().join(format!(
            "labstore_open_{}_{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        let uri = format!("{}{}", TREE_SCHEME, dir.display());
        let store = TreeRecordStore::open(&uri).expect("open");
        assert_eq!(store.root(), dir.as_path());
        assert!(dir.is_dir());
        let _ = fs::remove_dir_all(dir);
    }
}
