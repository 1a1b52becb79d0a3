use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SIDECAR_FILE: &str = ".sidecar.json";

/// Per-node metadata: the owning project stamp and the tag set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A directory-backed tree node: children are subdirectories, metadata is a
/// hidden sidecar file inside the node.
#[derive(Debug, Clone)]
pub struct Node {
    path: PathBuf,
}

impl Node {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(StoreError::NotFound(format!(
                "container {}",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn child(&self, name: &str) -> Result<Node> {
        Node::open(self.path.join(name))
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.path.join(name).is_dir()
    }

    pub fn ensure_child(&self, name: &str) -> Result<Node> {
        Node::create(self.path.join(name))
    }

    pub fn children(&self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                nodes.push(Node {
                    path: entry.path(),
                });
            }
        }
        Ok(nodes)
    }

    // Absent children are a no-op here; the backend layer decides when a
    // missing child is an error.
    pub fn remove_child(&self, name: &str) -> Result<()> {
        let path = self.path.join(name);
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    pub fn sidecar(&self) -> Result<Sidecar> {
        let path = self.path.join(SIDECAR_FILE);
        if !path.is_file() {
            return Ok(Sidecar::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write_sidecar(&self, sidecar: &Sidecar) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(sidecar)?;
        fs::write(self.path.join(SIDECAR_FILE), bytes)?;
        Ok(())
    }

    pub fn glob_files(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let mut matches = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if wildcard_match(pattern, &name.to_string_lossy()) {
                matches.push(entry.path());
            }
        }
        matches.sort();
        Ok(matches)
    }

    pub fn remove_recursive(&self) -> Result<()> {
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }

    pub fn copy_recursive(&self, dest: &Path) -> Result<()> {
        for entry in WalkDir::new(&self.path) {
            let entry = entry.map_err(std::io::Error::from)?;
            let rel = match entry.path().strip_prefix(&self.path) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let target = dest.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir(&target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !name.starts_with(first) {
        return false;
    }
    let mut rest = &name[first.len()..];
    if rest.len() < last.len() || !rest.ends_with(last) {
        return false;
    }
    rest = &rest[..rest.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_node(tag: &str) -> Node {
        let path = std::env::temp_dir().join(format!(
            "labstore_tree_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        Node::create(&path).expect("create temp node")
    }

    #[test]
    fn wildcard_match_covers_common_shapes() {
        assert!(wildcard_match("record.*.json", "record.run_1.json"));
        assert!(wildcard_match("record.*.json", "record..json"));
        assert!(!wildcard_match("record.*.json", "record.run_1.yaml"));
        assert!(!wildcard_match("record.*.json", ".sidecar.json"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("a*b*c", "a-x-b-y-c"));
        assert!(!wildcard_match("a*b*c", "a-x-c"));
        assert!(wildcard_match("exact", "exact"));
        assert!(!wildcard_match("exact", "inexact"));
    }

    #[test]
    fn open_of_missing_node_is_not_found() {
        let err = Node::open("/definitely/not/a/real/container/path")
            .expect_err("must fail");
        assert!(err.is_not_found());
    }

    #[test]
    fn children_lists_directories_only() {
        let node = temp_node("children");
        node.ensure_child("alpha").expect("child");
        node.ensure_child("beta").expect("child");
        fs::write(node.path().join("stray.txt"), b"x").expect("file");
        let mut names: Vec<String> = node
            .children()
            .expect("children")
            .iter()
            .map(|c| c.name())
            .collect();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);
        let _ = fs::remove_dir_all(node.path());
    }

    #[test]
    fn remove_child_is_a_no_op_when_absent() {
        let node = temp_node("remove");
        node.remove_child("ghost").expect("no-op remove");
        node.ensure_child("real").expect("child");
        node.remove_child("real").expect("remove");
        assert!(!node.has_child("real"));
        let _ = fs::remove_dir_all(node.path());
    }

    #[test]
    fn sidecar_roundtrips_and_defaults_when_missing() {
        let node = temp_node("sidecar");
        assert_eq!(node.sidecar().expect("default sidecar"), Sidecar::default());
        let sidecar = Sidecar {
            project: Some("demo".to_string()),
            tags: ["x".to_string(), "y".to_string()].into_iter().collect(),
        };
        node.write_sidecar(&sidecar).expect("write sidecar");
        assert_eq!(node.sidecar().expect("read sidecar"), sidecar);
        let _ = fs::remove_dir_all(node.path());
    }

    #[test]
    fn glob_skips_directories_and_non_matches() {
        let node = temp_node("glob");
        fs::write(node.path().join("record.a.json"), b"{}").expect("file");
        fs::write(node.path().join("record.b.json"), b"{}").expect("file");
        fs::write(node.path().join(SIDECAR_FILE), b"{}").expect("file");
        node.ensure_child("record.c.json").expect("dir with matching name");
        let found = node.glob_files("record.*.json").expect("glob");
        let names: Vec<String> = found
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["record.a.json", "record.b.json"]);
        let _ = fs::remove_dir_all(node.path());
    }

    #[test]
    fn copy_recursive_reproduces_the_subtree() {
        let node = temp_node("copy");
        let child = node.ensure_child("proj").expect("child");
        let leaf = child.ensure_child("run_1").expect("leaf");
        fs::write(leaf.path().join("record.run_1.json"), b"{}").expect("payload");
        leaf.write_sidecar(&Sidecar::default()).expect("sidecar");

        let dest = node.path().with_file_name(format!("{}.copy", node.name()));
        node.copy_recursive(&dest).expect("copy");
        assert!(dest.join("proj/run_1/record.run_1.json").is_file());
        assert!(dest.join("proj/run_1").join(SIDECAR_FILE).is_file());
        let _ = fs::remove_dir_all(node.path());
        let _ = fs::remove_dir_all(dest);
    }
}
