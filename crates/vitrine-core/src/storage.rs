use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use vitrine_types::{parse_id, Project};

use crate::config::ReorderPolicy;
use crate::error::{CatalogError, Result};

/// One element of the data file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredEntry {
    Project(Project),
    /// An element that does not decode as a project (no usable id, not an
    /// object). It is written back verbatim and never addressed by id.
    Opaque(Value),
}

/// The ordered contents of the data file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Records {
    entries: Vec<StoredEntry>,
}

impl Records {
    pub fn from_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        Self {
            entries: projects.into_iter().map(StoredEntry::Project).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StoredEntry] {
        &self.entries
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.entries.iter().filter_map(|entry| match entry {
            StoredEntry::Project(project) => Some(project),
            StoredEntry::Opaque(_) => None,
        })
    }

    pub fn opaque_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, StoredEntry::Opaque(_)))
            .count()
    }

    pub fn get(&self, id: u64) -> Option<&Project> {
        self.projects().find(|project| project.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Project> {
        self.entries.iter_mut().find_map(|entry| match entry {
            StoredEntry::Project(project) if project.id == id => Some(project),
            _ => None,
        })
    }

    /// `max(id) + 1` over every element that carries a readable id, or 1 when
    /// there is none. Deleting the newest record frees its id.
    pub fn next_id(&self) -> Result<u64> {
        let max = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                StoredEntry::Project(project) => Some(project.id),
                StoredEntry::Opaque(value) => value.get("id").and_then(parse_id),
            })
            .max();
        match max {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                tracing::error!("project id space exhausted at {}", max);
                CatalogError::Store("No project id left to assign.".to_string())
            }),
        }
    }

    pub fn prepend(&mut self, project: Project) {
        self.entries.insert(0, StoredEntry::Project(project));
    }

    pub fn remove(&mut self, id: u64) -> Option<Project> {
        let index = self
            .entries
            .iter()
            .position(|entry| matches!(entry, StoredEntry::Project(p) if p.id == id))?;
        match self.entries.remove(index) {
            StoredEntry::Project(project) => Some(project),
            StoredEntry::Opaque(_) => None,
        }
    }

    /// Rearrange projects to follow `order` and return how many were dropped.
    ///
    /// Unknown and repeated ids in `order` are ignored. Projects left out of
    /// `order` are dropped under [`ReorderPolicy::Strict`] and appended in their
    /// previous order under [`ReorderPolicy::AppendUnlisted`]. Opaque elements
    /// cannot be listed, so they always stay, after the projects.
    pub fn reorder(&mut self, order: &[u64], policy: ReorderPolicy) -> usize {
        let mut first_index: HashMap<u64, usize> = HashMap::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if let StoredEntry::Project(project) = entry {
                first_index.entry(project.id).or_insert(index);
            }
        }

        let mut slots: Vec<Option<StoredEntry>> =
            std::mem::take(&mut self.entries).into_iter().map(Some).collect();
        let mut reordered = Vec::with_capacity(slots.len());
        for id in order {
            if let Some(entry) = first_index.get(id).and_then(|index| slots[*index].take()) {
                reordered.push(entry);
            }
        }

        let mut opaque = Vec::new();
        let mut dropped = 0usize;
        for entry in slots.into_iter().flatten() {
            match entry {
                StoredEntry::Opaque(_) => opaque.push(entry),
                StoredEntry::Project(_) if policy == ReorderPolicy::AppendUnlisted => {
                    reordered.push(entry)
                }
                StoredEntry::Project(_) => dropped += 1,
            }
        }
        reordered.extend(opaque);
        self.entries = reordered;
        dropped
    }
}

/// Whole-document JSON persistence for the project sequence.
///
/// Every call goes back to disk; nothing is cached between requests, so manual
/// edits to the data file are picked up by the next read.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    path: PathBuf,
}

impl ProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails. A missing file is created as `[]`; a document that cannot
    /// be read as a list yields no records and is logged.
    pub fn load(&self) -> Records {
        self.read().unwrap_or_default()
    }

    /// Read for a load-mutate-save cycle. Unlike [`ProjectStore::load`], an
    /// unreadable document is an error, so the following save can never
    /// replace data it did not see.
    pub fn load_for_update(&self) -> Result<Records> {
        self.read().ok_or_else(|| {
            CatalogError::Store("Failed to read project data.".to_string())
        })
    }

    fn read(&self) -> Option<Records> {
        if !self.path.exists() {
            if let Err(err) = self.save(&Records::default()) {
                tracing::warn!("could not initialize {}: {}", self.path.display(), err);
            }
            return Some(Records::default());
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!("error reading {}: {}", self.path.display(), err);
                return None;
            }
        };
        let elements = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(elements)) => elements,
            Ok(_) => {
                tracing::warn!("{} does not hold a list", self.path.display());
                return None;
            }
            Err(err) => {
                tracing::error!("invalid JSON in {}: {}", self.path.display(), err);
                return None;
            }
        };

        let entries = elements
            .into_iter()
            .enumerate()
            .map(|(index, value)| match serde_json::from_value::<Project>(value.clone()) {
                Ok(project) => StoredEntry::Project(project),
                Err(err) => {
                    tracing::warn!(
                        "element {} of {} is not a project, keeping it as is: {}",
                        index,
                        self.path.display(),
                        err
                    );
                    StoredEntry::Opaque(value)
                }
            })
            .collect();
        Some(Records { entries })
    }

    /// Replace the data file with `records`, via a sibling temp file and a rename.
    pub fn save(&self, records: &Records) -> Result<()> {
        let payload = encode_pretty(records).map_err(|err| {
            tracing::error!("error encoding project data: {}", err);
            CatalogError::Store("Failed to encode project data.".to_string())
        })?;
        write_atomic(&self.path, &payload).map_err(|err| {
            tracing::error!("error writing {}: {}", self.path.display(), err);
            CatalogError::Store("Failed to save data.".to_string())
        })
    }
}

fn encode_pretty(records: &Records) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    records.serialize(&mut serializer)?;
    Ok(out)
}

fn write_atomic(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data.json".to_string());
    let tmp = parent.join(format!(".{file_name}.tmp-{}", Uuid::new_v4()));
    fs::write(&tmp, payload)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(id: u64, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            story: "first line\nsecond line".to_string(),
            ..Project::default()
        }
    }

    #[test]
    fn load_creates_missing_file_as_empty_list() {
        let tmp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(tmp.path().join("data").join("data.json"));
        assert!(store.load().is_empty());
        let raw = fs::read_to_string(store.path()).expect("created");
        assert_eq!(raw, "[]");
    }

    #[test]
    fn load_treats_garbage_and_non_lists_as_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(tmp.path().join("data.json"));
        fs::write(store.path(), "{\"id\": 1}").expect("write");
        assert!(store.load().is_empty());
        fs::write(store.path(), "not json at all").expect("write");
        assert!(store.load().is_empty());
        // load must not overwrite an existing but broken file
        assert_eq!(fs::read_to_string(store.path()).expect("read"), "not json at all");
    }

    #[test]
    fn load_for_update_refuses_unreadable_documents() {
        let tmp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(tmp.path().join("data.json"));
        assert!(store.load_for_update().expect("missing is empty").is_empty());
        for broken in ["not json at all", "{\"id\": 1}"] {
            fs::write(store.path(), broken).expect("write");
            let err = store.load_for_update().unwrap_err();
            assert_eq!(err, CatalogError::Store("Failed to read project data.".to_string()));
        }
    }

    #[test]
    fn undecodable_elements_survive_a_save() {
        let tmp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(tmp.path().join("data.json"));
        fs::write(
            store.path(),
            r#"[{"id": 1, "name": "Keep A"}, {"name": "no id"}, "stray", {"id": 2, "name": "Keep B"}]"#,
        )
        .expect("write");

        let records = store.load_for_update().expect("load");
        assert_eq!(records.len(), 4);
        assert_eq!(records.opaque_count(), 2);
        assert_eq!(records.projects().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);

        store.save(&records).expect("save");
        let raw: Value =
            serde_json::from_str(&fs::read_to_string(store.path()).expect("read")).expect("json");
        assert_eq!(raw[1]["name"], "no id");
        assert_eq!(raw[2], "stray");
        assert_eq!(raw[3]["name"], "Keep B");
    }

    #[test]
    fn next_id_counts_readable_ids_of_opaque_elements() {
        let mut records = Records::from_projects([sample(3, "C")]);
        records.entries.push(StoredEntry::Opaque(serde_json::json!({"id": "9", "name": {}})));
        assert_eq!(records.next_id().expect("id"), 10);
        assert_eq!(Records::default().next_id().expect("id"), 1);
    }

    #[test]
    fn next_id_reports_exhausted_id_space() {
        let records = Records::from_projects([sample(u64::MAX, "Max")]);
        let err = records.next_id().unwrap_err();
        assert!(matches!(err, CatalogError::Store(_)));
    }

    #[test]
    fn reorder_keeps_opaque_elements_under_strict_policy() {
        let mut records = Records::from_projects([sample(1, "A"), sample(2, "B")]);
        records.entries.insert(1, StoredEntry::Opaque(Value::Null));
        let dropped = records.reorder(&[2], ReorderPolicy::Strict);
        assert_eq!(dropped, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records.projects().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(records.entries()[1], StoredEntry::Opaque(Value::Null));
    }

    #[test]
    fn save_then_load_is_stable() {
        let tmp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(tmp.path().join("data.json"));
        store
            .save(&Records::from_projects([sample(2, "Second"), sample(1, "First")]))
            .expect("save");
        let first_bytes = fs::read(store.path()).expect("read");

        let loaded = store.load();
        assert_eq!(loaded.projects().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);
        store.save(&loaded).expect("resave");
        assert_eq!(fs::read(store.path()).expect("read"), first_bytes);
    }

    #[test]
    fn save_uses_four_space_indent_and_leaves_no_temp_files() {
        let tmp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(tmp.path().join("data.json"));
        store.save(&Records::from_projects([sample(1, "Demo")])).expect("save");
        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(raw.starts_with("[\n    {\n        \"id\": 1,"));
        let names = fs::read_dir(tmp.path())
            .expect("list")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["data.json".to_string()]);
    }

    #[test]
    fn save_reports_unwritable_target() {
        let tmp = TempDir::new().expect("tempdir");
        // a directory where the file should be makes the rename fail
        let path = tmp.path().join("data.json");
        fs::create_dir_all(path.join("occupied")).expect("mkdir");
        let store = ProjectStore::new(&path);
        let err = store.save(&Records::from_projects([sample(1, "Demo")])).unwrap_err();
        assert!(matches!(err, CatalogError::Store(_)));
    }
}
