use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFileRecord {
    pub id: Uuid,
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

impl DownloadedFileRecord {
    pub fn new(filename: String, path: PathBuf, url: &str, title: &str, size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            path,
            url: url.to_string(),
            title: title.to_string(),
            timestamp: Utc::now(),
            size,
        }
    }
}

/// Metadata about files produced by successful downloads, keyed by basename.
/// Lives as long as the server and is lost on restart.
pub struct DownloadRegistry {
    records: Mutex<HashMap<String, DownloadedFileRecord>>,
    capacity: usize,
}

impl DownloadRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Inserts or replaces the record for its filename, then evicts the
    /// oldest records beyond capacity.
    pub async fn record(&self, record: DownloadedFileRecord) {
        let mut records = self.records.lock().await;
        records.insert(record.filename.clone(), record);
        trim_to_capacity(&mut records, self.capacity);
    }

    pub async fn get(&self, filename: &str) -> Option<DownloadedFileRecord> {
        self.records.lock().await.get(filename).cloned()
    }

    /// All records, newest first.
    pub async fn list(&self) -> Vec<DownloadedFileRecord> {
        let mut records: Vec<_> = self.records.lock().await.values().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }

    /// Drops records whose file has disappeared from disk. Returns how many
    /// were removed.
    pub async fn forget_missing(&self) -> usize {
        let snapshot: Vec<(Uuid, PathBuf)> = self
            .records
            .lock()
            .await
            .values()
            .map(|record| (record.id, record.path.clone()))
            .collect();

        let mut missing = HashSet::new();
        for (id, path) in snapshot {
            let exists = tokio::fs::metadata(&path)
                .await
                .is_ok_and(|metadata| metadata.is_file());
            if !exists {
                missing.insert(id);
            }
        }
        if missing.is_empty() {
            return 0;
        }

        // records replaced while the lock was released carry a new id and stay
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| !missing.contains(&record.id));
        before - records.len()
    }
}

fn trim_to_capacity(records: &mut HashMap<String, DownloadedFileRecord>, capacity: usize) {
    if records.len() <= capacity {
        return;
    }

    let overflow = records.len() - capacity;
    let mut oldest = records
        .iter()
        .map(|(filename, record)| (filename.clone(), record.timestamp))
        .collect::<Vec<_>>();
    oldest.sort_by_key(|(_, timestamp)| *timestamp);

    for (filename, _) in oldest.into_iter().take(overflow) {
        records.remove(&filename);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record_at(filename: &str, minutes_ago: i64) -> DownloadedFileRecord {
        let mut record = DownloadedFileRecord::new(
            filename.to_string(),
            PathBuf::from("downloads").join(filename),
            "https://youtu.be/dQw4w9WgXcQ",
            "title",
            2048,
        );
        record.timestamp = Utc::now() - Duration::minutes(minutes_ago);
        record
    }

    #[tokio::test]
    async fn replaces_records_with_the_same_name() {
        let registry = DownloadRegistry::new(10);
        registry.record(record_at("a.mp4", 5)).await;
        let mut newer = record_at("a.mp4", 0);
        newer.size = 4096;
        registry.record(newer).await;

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(registry.get("a.mp4").await.unwrap().size, 4096);
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let registry = DownloadRegistry::new(2);
        registry.record(record_at("old.mp4", 30)).await;
        registry.record(record_at("mid.mp4", 20)).await;
        registry.record(record_at("new.mp4", 10)).await;

        assert!(registry.get("old.mp4").await.is_none());
        let names: Vec<_> = registry
            .list()
            .await
            .into_iter()
            .map(|record| record.filename)
            .collect();
        assert_eq!(names, ["new.mp4", "mid.mp4"]);
    }

    #[tokio::test]
    async fn forgets_records_for_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.mp4");
        std::fs::write(&kept, b"data").unwrap();

        let registry = DownloadRegistry::new(10);
        let mut present = record_at("kept.mp4", 1);
        present.path = kept;
        registry.record(present).await;
        let mut gone = record_at("gone.mp4", 1);
        gone.path = dir.path().join("gone.mp4");
        registry.record(gone).await;

        assert_eq!(registry.forget_missing().await, 1);
        assert!(registry.get("kept.mp4").await.is_some());
        assert!(registry.get("gone.mp4").await.is_none());
        assert_eq!(registry.forget_missing().await, 0);
    }

    #[tokio::test]
    async fn directories_do_not_count_as_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DownloadRegistry::new(10);
        let mut record = record_at("folder", 1);
        record.path = dir.path().to_path_buf();
        registry.record(record).await;

        assert_eq!(registry.forget_missing().await, 1);
        assert!(registry.list().await.is_empty());
    }
}
