use crate::{
    error::{validation_error, AppError},
    types::ThreatRecord,
};
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Append-only threat history backed by a single JSON file.
///
/// Every append is a full read-modify-write of the file, serialized by
/// `write_lock`.
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        if !tokio::fs::try_exists(&self.path).await? {
            info!("Creating empty threat history at {}", self.path.display());
            self.write(&[]).await?;
        }
        Ok(())
    }

    /// The whole history. A missing or unreadable file reads as empty.
    pub async fn load(&self) -> Vec<ThreatRecord> {
        let _guard = self.write_lock.lock().await;
        self.read().await.unwrap_or_else(|e| {
            error!("Error loading threat history {}: {}", self.path.display(), e);
            Vec::new()
        })
    }

    /// Appends `records` and returns the new history length.
    ///
    /// An existing file that cannot be read back is left untouched and the
    /// append fails.
    pub async fn append(&self, records: Vec<ThreatRecord>) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut history = self.read().await?;
        history.extend(records);
        self.write(&history).await?;
        debug!("Threat history now holds {} records", history.len());
        Ok(history.len())
    }

    async fn read(&self) -> Result<Vec<ThreatRecord>, AppError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn write(&self, history: &[ThreatRecord]) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(history)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Checks a `threatHistory` payload: it must be a list of JSON objects whose
/// known fields, when present, are strings or null.
pub fn parse_submission(payload: Value) -> Result<Vec<ThreatRecord>, AppError> {
    let Value::Array(items) = payload else {
        return Err(validation_error("Invalid data format"));
    };
    items
        .into_iter()
        .map(|item| {
            let Value::Object(fields) = item else {
                return Err(validation_error("Invalid data format"));
            };
            for key in ThreatRecord::STRING_FIELDS {
                match fields.get(key) {
                    None | Some(Value::Null) | Some(Value::String(_)) => {}
                    Some(other) => {
                        debug!("Rejected history record: {} is {}", key, other);
                        return Err(validation_error("Invalid data format"));
                    }
                }
            }
            Ok(ThreatRecord::from_fields(fields))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(threat: &str) -> ThreatRecord {
        ThreatRecord::default()
            .with("threat", threat)
            .with("severity", "High")
            .with("site", "https://example.com")
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_initialized_writes_empty_list_once() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        store.ensure_initialized().await.unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap().trim(), "[]");

        store.append(vec![record("Phishing")]).await.unwrap();
        store.ensure_initialized().await.unwrap();
        assert_eq!(store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_appends_are_additive() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        store.append(vec![record("seed")]).await.unwrap();
        let prior = store.load().await.len();

        let (n, k) = (4, 3);
        for round in 0..n {
            let batch = (0..k).map(|i| record(&format!("{round}-{i}"))).collect();
            store.append(batch).await.unwrap();
        }

        let history = store.load().await;
        assert_eq!(history.len(), prior + n * k);
        assert_eq!(history[0].threat(), Some("seed"));
        assert_eq!(history.last().unwrap().threat(), Some("3-2"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_lose_records() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(HistoryStore::new(dir.path().join("history.json")));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.append(vec![record(&i.to_string())]).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.load().await.len(), 8);
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_keeps_records_from_older_writers() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        std::fs::write(
            store.path(),
            r#"[{"threat":"Phishing","site":"a.test"},{"threat":"XSS","severity":3}]"#,
        )
        .unwrap();

        let total = store.append(vec![record("new")]).await.unwrap();

        assert_eq!(total, 3);
        let history: Value = serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(history[0], json!({"threat": "Phishing", "site": "a.test"}));
        assert_eq!(history[1], json!({"threat": "XSS", "severity": 3}));
        assert_eq!(history[2]["threat"], "new");
    }

    #[tokio::test]
    async fn test_append_refuses_to_overwrite_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        for content in ["{not json", r#"[{"threat":"a"}, 7]"#] {
            std::fs::write(store.path(), content).unwrap();

            let result = store.append(vec![record("new")]).await;

            assert!(matches!(result, Err(AppError::Serialization(_))));
            assert_eq!(std::fs::read_to_string(store.path()).unwrap(), content);
        }
    }

    #[test]
    fn test_parse_submission() {
        let records = parse_submission(json!([
            {"threat": "XSS", "site": "https://a.test"},
            {"threat": null, "severity": "High"},
            {}
        ]))
        .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].fields().get("threat"), Some(&Value::Null));

        for bad in [json!({"threat": "XSS"}), json!("nope"), json!(null), json!([1, 2]), json!([{"threat": 5}])] {
            assert!(matches!(parse_submission(bad), Err(AppError::InvalidInput(_))));
        }
    }
}
