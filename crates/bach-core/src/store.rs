//! Task persistence.
//!
//! [`TaskDb`] keeps tasks in a single redb table keyed by task id with the
//! JSON-encoded task as value. [`InMemoryTaskStore`] has the same semantics
//! without touching disk.

use crate::error::{BachError, Result};
use crate::task::Task;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

pub trait TaskStore: Send + Sync {
    /// Insert or replace `task`; returns its id.
    fn save(&self, task: &Task) -> Result<String>;
    fn load(&self, id: &str) -> Result<Task>;
    /// Every stored task, newest first.
    fn list(&self) -> Result<Vec<Task>>;
    /// Returns `false` when nothing was stored under `id`.
    fn delete(&self, id: &str) -> Result<bool>;
}

fn newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
}

// ---------------------------------------------------------------------------
// TaskDb
// ---------------------------------------------------------------------------

/// Key: task id. Value: JSON-encoded Task.
const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

fn db_err(e: impl std::fmt::Display) -> BachError {
    BachError::Store(e.to_string())
}

pub struct TaskDb {
    db: Database,
}

impl TaskDb {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(TASKS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }
}

impl TaskStore for TaskDb {
    fn save(&self, task: &Task) -> Result<String> {
        task.validate()?;
        let value = serde_json::to_vec(task).map_err(db_err)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(TASKS).map_err(db_err)?;
            table
                .insert(task.id.as_str(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        tracing::debug!(id = %task.id, name = %task.name, "task saved");
        Ok(task.id.clone())
    }

    fn load(&self, id: &str) -> Result<Task> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TASKS).map_err(db_err)?;
        let entry = table
            .get(id)
            .map_err(db_err)?
            .ok_or_else(|| BachError::TaskNotFound(id.to_string()))?;
        serde_json::from_slice(entry.value()).map_err(db_err)
    }

    fn list(&self) -> Result<Vec<Task>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TASKS).map_err(db_err)?;
        let mut tasks = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            tasks.push(serde_json::from_slice::<Task>(v.value()).map_err(db_err)?);
        }
        newest_first(&mut tasks);
        Ok(tasks)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = wt.open_table(TASKS).map_err(db_err)?;
            let removed = table.remove(id).map_err(db_err)?;
            removed.is_some()
        };
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// InMemoryTaskStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn save(&self, task: &Task) -> Result<String> {
        task.validate()?;
        let mut tasks = self.tasks.write().map_err(db_err)?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(task.id.clone())
    }

    fn load(&self, id: &str) -> Result<Task> {
        let tasks = self.tasks.read().map_err(db_err)?;
        tasks
            .get(id)
            .cloned()
            .ok_or_else(|| BachError::TaskNotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().map_err(db_err)?;
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        newest_first(&mut all);
        Ok(all)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut tasks = self.tasks.write().map_err(db_err)?;
        Ok(tasks.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QuerySource;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn task(name: &str, age_mins: i64) -> Task {
        let mut t = Task::new(name, vec!["123".into()]);
        t.query = Some(QuerySource::Area("placement".into()));
        t.rules = vec!["clicks > 10".into()];
        t.created_at = Utc::now() - Duration::minutes(age_mins);
        t
    }

    fn exercise(store: &dyn TaskStore) {
        let old = task("old", 10);
        let new = task("new", 1);
        let old_id = store.save(&old).unwrap();
        store.save(&new).unwrap();

        assert_eq!(store.load(&old_id).unwrap(), old);
        let names: Vec<String> = store.list().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["new", "old"]);

        let mut renamed = old.clone();
        renamed.name = "renamed".into();
        store.save(&renamed).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.load(&old_id).unwrap().name, "renamed");

        assert!(store.delete(&old_id).unwrap());
        assert!(!store.delete(&old_id).unwrap());
        assert!(matches!(store.load(&old_id), Err(BachError::TaskNotFound(_))));
    }

    #[test]
    fn in_memory_store_semantics() {
        exercise(&InMemoryTaskStore::new());
    }

    #[test]
    fn redb_store_semantics() {
        let dir = TempDir::new().unwrap();
        let db = TaskDb::open(&dir.path().join("nested/tasks.redb")).unwrap();
        exercise(&db);
    }

    #[test]
    fn redb_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.redb");
        let t = task("persisted", 0);
        {
            let db = TaskDb::open(&path).unwrap();
            db.save(&t).unwrap();
        }
        let db = TaskDb::open(&path).unwrap();
        assert_eq!(db.load(&t.id).unwrap(), t);
    }

    #[test]
    fn invalid_tasks_are_rejected() {
        let store = InMemoryTaskStore::new();
        let empty = Task::new("no accounts", vec![]);
        assert!(matches!(store.save(&empty), Err(BachError::Configuration(_))));
    }
}
