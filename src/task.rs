use crate::priority::classify;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Coarse task priority. Ordinal: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Opaque, stable task identifier. Unique across the store at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub created_at: u64,
}

impl Task {
    pub fn new(text: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            text: text.into(),
            completed: false,
            priority,
            created_at: epoch_seconds(),
        }
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Seed record for `--tasks` files. Priority falls back to the heuristic
/// when the file does not name one.
#[derive(Debug, Clone, Deserialize)]
struct TaskSeed {
    text: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    priority: Option<Priority>,
}

/// Ordered, revisioned task collection. Stands in for the external list
/// collaborator: every mutation bumps `revision`, and the scene rebuilds
/// whenever the revision it last observed differs.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    revision: u64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read tasks file {}", path.display()))?;
        let seeds: Vec<TaskSeed> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse tasks file {}", path.display()))?;
        let mut store = TaskStore::new();
        for seed in seeds {
            let priority = seed.priority.unwrap_or_else(|| classify(&seed.text));
            let mut task = Task::new(seed.text, priority);
            task.completed = seed.completed;
            store.tasks.push(task);
        }
        store.revision = 1;
        Ok(store)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn add(&mut self, text: impl Into<String>, priority: Priority) -> TaskId {
        let task = Task::new(text, priority);
        let id = task.id;
        self.tasks.push(task);
        self.revision += 1;
        id
    }

    /// Flips the completion flag for `id`. Returns false when the id is
    /// not (or no longer) present.
    pub fn toggle(&mut self, id: TaskId) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.completed = !task.completed;
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        if self.tasks.len() != before {
            self.revision += 1;
            true
        } else {
            false
        }
    }

    pub fn remove_last(&mut self) -> Option<TaskId> {
        let task = self.tasks.pop()?;
        self.revision += 1;
        Some(task.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mutations_bump_revision() {
        let mut store = TaskStore::new();
        assert_eq!(store.revision(), 0);
        let id = store.add("Water the plants", Priority::Low);
        assert_eq!(store.revision(), 1);
        assert!(store.toggle(id));
        assert_eq!(store.revision(), 2);
        assert!(store.remove(id));
        assert_eq!(store.revision(), 3);
        assert!(!store.toggle(id), "removed ids stop resolving");
        assert_eq!(store.revision(), 3, "failed toggle must not bump the revision");
    }

    #[test]
    fn ids_stay_unique_across_store() {
        let mut store = TaskStore::new();
        let a = store.add("one", Priority::Medium);
        let b = store.add("one", Priority::Medium);
        assert_ne!(a, b);
    }

    #[test]
    fn seed_file_classifies_missing_priorities() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"[{{"text": "Fix this ASAP"}}, {{"text": "Buy milk", "completed": true, "priority": "low"}}]"#
        )
        .expect("write seeds");
        let store = TaskStore::load(file.path()).expect("load seeds");
        assert_eq!(store.len(), 2);
        assert_eq!(store.tasks()[0].priority, Priority::High);
        assert!(!store.tasks()[0].completed);
        assert_eq!(store.tasks()[1].priority, Priority::Low, "explicit priority wins over heuristic");
        assert!(store.tasks()[1].completed);
    }

    #[test]
    fn malformed_seed_file_errors() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write");
        assert!(TaskStore::load(file.path()).is_err());
    }
}
