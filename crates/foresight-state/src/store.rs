//! EvaluationStore — redb-backed evaluation history.
//!
//! Provides append, list and delete operations over the evaluations of each
//! (target, model) pair. The store assigns IDs; the prediction models only
//! read snapshots and recommend IDs for deletion. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use foresight_core::{Evaluation, EvaluationId, EvaluationValue};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe evaluation store backed by redb.
#[derive(Clone)]
pub struct EvaluationStore {
    db: Arc<Database>,
}

/// Key of the history for one (target, model) pair. Model names may not
/// contain `:`, which keeps `{target}:{model}:{id}` unambiguous when split
/// from the right.
fn history_key(target: &str, model: &str) -> StateResult<String> {
    if target.is_empty() {
        return Err(StateError::InvalidKey("empty target name".to_string()));
    }
    if model.is_empty() || model.contains(':') {
        return Err(StateError::InvalidKey(format!("model name {model:?}")));
    }
    Ok(format!("{target}:{model}"))
}

fn evaluation_key(history: &str, id: EvaluationId) -> String {
    format!("{history}:{id:020}")
}

/// Split `{target}:{model}:{id}` back into its target and model.
fn split_evaluation_key(key: &str) -> Option<(&str, &str)> {
    let mut parts = key.rsplitn(3, ':');
    let _id = parts.next()?;
    let model = parts.next()?;
    let target = parts.next()?;
    Some((target, model))
}

impl EvaluationStore {
    /// Open (or create) a persistent evaluation store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "evaluation store opened");
        Ok(store)
    }

    /// Open a persistent evaluation store that must already exist.
    pub fn open_existing(path: &Path) -> StateResult<Self> {
        if !path.is_file() {
            return Err(StateError::Open(format!("{} does not exist", path.display())));
        }
        let db = Database::open(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "existing evaluation store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory evaluation store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory evaluation store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(EVALUATIONS).map_err(map_err!(Table))?;
        txn.open_table(NEXT_IDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Record a new evaluation, assigning it the next ID of its history.
    pub fn append_evaluation(
        &self,
        target: &str,
        model: &str,
        created: DateTime<Utc>,
        val: EvaluationValue,
    ) -> StateResult<Evaluation> {
        let history = history_key(target, model)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let evaluation;
        {
            let mut ids = txn.open_table(NEXT_IDS).map_err(map_err!(Table))?;
            let id = ids
                .get(history.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);

            evaluation = Evaluation { id, created, val };
            let value = serde_json::to_vec(&evaluation).map_err(map_err!(Serialize))?;

            let mut table = txn.open_table(EVALUATIONS).map_err(map_err!(Table))?;
            table
                .insert(evaluation_key(&history, id).as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            ids.insert(history.as_str(), id + 1)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%target, %model, id = evaluation.id, "evaluation stored");
        Ok(evaluation)
    }

    /// List the evaluation history of a (target, model) pair in ID order.
    pub fn list_evaluations(&self, target: &str, model: &str) -> StateResult<Vec<Evaluation>> {
        let prefix = format!("{}:", history_key(target, model)?);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVALUATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(&prefix) {
                break;
            }
            // A target containing ':' can share this prefix; match exactly.
            if split_evaluation_key(key) != Some((target, model)) {
                continue;
            }
            let evaluation: Evaluation =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(evaluation);
        }
        Ok(results)
    }

    /// Delete the given evaluations. Unknown IDs are ignored; returns the
    /// number actually removed.
    pub fn delete_evaluations(
        &self,
        target: &str,
        model: &str,
        ids: &[EvaluationId],
    ) -> StateResult<u32> {
        let history = history_key(target, model)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0u32;
        {
            let mut table = txn.open_table(EVALUATIONS).map_err(map_err!(Table))?;
            for id in ids {
                let key = evaluation_key(&history, *id);
                if table
                    .remove(key.as_str())
                    .map_err(map_err!(Write))?
                    .is_some()
                {
                    count += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%target, %model, requested = ids.len(), deleted = count, "evaluations deleted");
        Ok(count)
    }

    /// Delete the whole history of a (target, model) pair. The ID counter is
    /// kept so later evaluations never reuse an ID.
    pub fn delete_model_history(&self, target: &str, model: &str) -> StateResult<u32> {
        let ids: Vec<EvaluationId> = self
            .list_evaluations(target, model)?
            .into_iter()
            .map(|e| e.id)
            .collect();
        self.delete_evaluations(target, model, &ids)
    }

    /// Names of the models that currently hold evaluations for a target.
    pub fn list_models(&self, target: &str) -> StateResult<Vec<String>> {
        let prefix = format!("{target}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVALUATIONS).map_err(map_err!(Table))?;
        let mut models = BTreeSet::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some((t, model)) = split_evaluation_key(key)
                && t == target
            {
                models.insert(model.to_string());
            }
        }
        Ok(models.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn val(replicas: i32) -> EvaluationValue {
        EvaluationValue {
            target_replicas: replicas,
        }
    }

    // ── Append / list ──────────────────────────────────────────────

    #[test]
    fn append_assigns_monotonic_ids() {
        let store = EvaluationStore::open_in_memory().unwrap();

        let a = store.append_evaluation("default/api", "reactive", t(0), val(1)).unwrap();
        let b = store.append_evaluation("default/api", "reactive", t(10), val(2)).unwrap();
        let c = store.append_evaluation("default/api", "reactive", t(20), val(3)).unwrap();

        assert_eq!((a.id, b.id, c.id), (0, 1, 2));
        let all = store.list_evaluations("default/api", "reactive").unwrap();
        assert_eq!(all, vec![a, b, c]);
    }

    #[test]
    fn list_orders_by_id_past_ten() {
        let store = EvaluationStore::open_in_memory().unwrap();
        for i in 0..12 {
            store.append_evaluation("web", "reactive", t(i), val(i as i32)).unwrap();
        }

        let ids: Vec<_> = store
            .list_evaluations("web", "reactive")
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn histories_are_isolated_per_target_and_model() {
        let store = EvaluationStore::open_in_memory().unwrap();
        store.append_evaluation("web", "reactive", t(0), val(1)).unwrap();
        store.append_evaluation("web", "other", t(0), val(1)).unwrap();
        store.append_evaluation("web:canary", "reactive", t(0), val(1)).unwrap();
        store.append_evaluation("web:canary", "reactive", t(5), val(2)).unwrap();

        assert_eq!(store.list_evaluations("web", "reactive").unwrap().len(), 1);
        assert_eq!(store.list_evaluations("web", "other").unwrap().len(), 1);
        assert_eq!(store.list_evaluations("web:canary", "reactive").unwrap().len(), 2);
        // Separate counters per history.
        let next = store.append_evaluation("web", "other", t(9), val(4)).unwrap();
        assert_eq!(next.id, 1);
    }

    #[test]
    fn model_name_with_colon_rejected() {
        let store = EvaluationStore::open_in_memory().unwrap();
        let err = store.append_evaluation("web", "a:b", t(0), val(1)).unwrap_err();
        assert!(matches!(err, StateError::InvalidKey(_)));
        assert!(store.list_evaluations("", "reactive").is_err());
    }

    // ── Delete ─────────────────────────────────────────────────────

    #[test]
    fn delete_removes_only_requested_ids() {
        let store = EvaluationStore::open_in_memory().unwrap();
        for i in 0..4 {
            store.append_evaluation("web", "reactive", t(i), val(1)).unwrap();
        }

        let deleted = store.delete_evaluations("web", "reactive", &[0, 2, 99]).unwrap();
        assert_eq!(deleted, 2);

        let remaining: Vec<_> = store
            .list_evaluations("web", "reactive")
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(remaining, vec![1, 3]);
    }

    #[test]
    fn ids_not_reused_after_delete() {
        let store = EvaluationStore::open_in_memory().unwrap();
        store.append_evaluation("web", "reactive", t(0), val(1)).unwrap();
        store.append_evaluation("web", "reactive", t(1), val(1)).unwrap();

        assert_eq!(store.delete_model_history("web", "reactive").unwrap(), 2);
        assert!(store.list_evaluations("web", "reactive").unwrap().is_empty());

        let next = store.append_evaluation("web", "reactive", t(2), val(1)).unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn list_models_for_target() {
        let store = EvaluationStore::open_in_memory().unwrap();
        store.append_evaluation("web", "reactive", t(0), val(1)).unwrap();
        store.append_evaluation("web", "fast", t(0), val(1)).unwrap();
        store.append_evaluation("web:canary", "slow", t(0), val(1)).unwrap();

        assert_eq!(store.list_models("web").unwrap(), vec!["fast", "reactive"]);
        assert_eq!(store.list_models("web:canary").unwrap(), vec!["slow"]);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = EvaluationStore::open(&db_path).unwrap();
            store.append_evaluation("prod/api", "reactive", t(0), val(3)).unwrap();
        }

        // Reopen the same database file.
        let store = EvaluationStore::open(&db_path).unwrap();
        let history = store.list_evaluations("prod/api", "reactive").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].val.target_replicas, 3);

        let next = store.append_evaluation("prod/api", "reactive", t(1), val(4)).unwrap();
        assert_eq!(next.id, 1);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn open_existing_requires_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("missing").join("test.redb");

        let err = EvaluationStore::open_existing(&db_path).err().unwrap();
        assert!(matches!(err, StateError::Open(_)));
        assert!(!db_path.exists());
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn open_existing_reads_created_store() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        {
            let store = EvaluationStore::open(&db_path).unwrap();
            store.append_evaluation("prod/api", "reactive", t(0), val(5)).unwrap();
        }

        let store = EvaluationStore::open_existing(&db_path).unwrap();
        let history = store.list_evaluations("prod/api", "reactive").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].val.target_replicas, 5);
    }

    #[test]
    fn empty_store_operations() {
        let store = EvaluationStore::open_in_memory().unwrap();

        assert!(store.list_evaluations("any", "reactive").unwrap().is_empty());
        assert!(store.list_models("any").unwrap().is_empty());
        assert_eq!(store.delete_evaluations("any", "reactive", &[]).unwrap(), 0);
        assert_eq!(store.delete_evaluations("any", "reactive", &[1]).unwrap(), 0);
        assert_eq!(store.delete_model_history("any", "reactive").unwrap(), 0);
    }
}
