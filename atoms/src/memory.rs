//! In-process stand-ins for the photo bucket and the metadata table.
//!
//! They follow the same contracts as the S3 and DynamoDB implementations,
//! including the conditional-write rules of [`RecordTable`]. The photo store
//! also queues the notifications S3 would emit, so the full
//! create → register → list cycle can run without AWS.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::PhotoError;
use crate::photos::service::PhotoStore;
use crate::records::model::{normalize_sequencer, PhotoRecord, StorageEvent, StorageEventKind};
use crate::records::service::{RecordTable, WriteOutcome};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryPhotoStore {
    bucket: String,
    objects: Mutex<HashMap<String, MemoryObject>>,
    events: Mutex<Vec<StorageEvent>>,
    sequence: AtomicU64,
    failing: AtomicBool,
}

impl MemoryPhotoStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<MemoryObject> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every subsequent write fail as if S3 were unreachable.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Out-of-band removal (console, lifecycle rule). Emits a removed event
    /// when the object existed.
    pub fn remove(&self, key: &str) -> bool {
        let existed = lock(&self.objects).remove(key).is_some();
        if existed {
            self.emit(StorageEventKind::Removed, key, 0);
        }
        existed
    }

    /// Drain the notifications emitted so far, oldest first.
    pub fn take_events(&self) -> Vec<StorageEvent> {
        std::mem::take(&mut *lock(&self.events))
    }

    fn emit(&self, kind: StorageEventKind, key: &str, size: i64) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.events).push(StorageEvent {
            kind,
            bucket: self.bucket.clone(),
            key: key.to_string(),
            size,
            etag: None,
            sequencer: normalize_sequencer(&format!("{seq:X}")),
            event_time: chrono::Utc::now().to_rfc3339(),
        });
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_photo(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), PhotoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PhotoError::storage(format!("bucket {} is unavailable", self.bucket)));
        }
        let size = bytes.len() as i64;
        lock(&self.objects).insert(
            key.to_string(),
            MemoryObject {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        self.emit(StorageEventKind::Created, key, size);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Row {
    Live(PhotoRecord),
    /// Left by a sequenced remove; hidden from scans.
    Tombstone { sequencer: String },
}

impl Row {
    fn sequencer(&self) -> Option<&str> {
        match self {
            Row::Live(record) => record.sequencer.as_deref(),
            Row::Tombstone { sequencer } => Some(sequencer),
        }
    }

    fn live(&self) -> Option<&PhotoRecord> {
        match self {
            Row::Live(record) => Some(record),
            Row::Tombstone { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordTable {
    table_name: String,
    items: Mutex<HashMap<String, Row>>,
    failing_keys: Mutex<HashSet<String>>,
    failing_scan: AtomicBool,
}

impl MemoryRecordTable {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    /// Writes touching `id` fail as if DynamoDB throttled them.
    pub fn fail_key(&self, id: &str) {
        lock(&self.failing_keys).insert(id.to_string());
    }

    pub fn fail_scans(&self, failing: bool) {
        self.failing_scan.store(failing, Ordering::SeqCst);
    }

    /// All live records, sorted by id.
    pub fn snapshot(&self) -> Vec<PhotoRecord> {
        let mut records = self.live_records();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Whether a remove has left its marker for `id`.
    pub fn has_tombstone(&self, id: &str) -> bool {
        matches!(lock(&self.items).get(id), Some(Row::Tombstone { .. }))
    }

    fn live_records(&self) -> Vec<PhotoRecord> {
        lock(&self.items).values().filter_map(Row::live).cloned().collect()
    }

    fn check_key(&self, id: &str) -> Result<(), PhotoError> {
        if lock(&self.failing_keys).contains(id) {
            return Err(PhotoError::storage(format!(
                "table {} rejected write for {}",
                self.table_name, id
            )));
        }
        Ok(())
    }
}

/// `attribute_not_exists(id) OR attribute_not_exists(sequencer) OR sequencer < :seq`
fn accepts(stored: Option<&Row>, incoming: &str) -> bool {
    stored
        .and_then(Row::sequencer)
        .map_or(true, |current| current < incoming)
}

#[async_trait]
impl RecordTable for MemoryRecordTable {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn upsert(&self, record: &PhotoRecord) -> Result<WriteOutcome, PhotoError> {
        self.check_key(&record.id)?;
        let mut items = lock(&self.items);
        if let Some(seq) = record.sequencer.as_deref() {
            if !accepts(items.get(&record.id), seq) {
                return Ok(WriteOutcome::Skipped);
            }
        }
        items.insert(record.id.clone(), Row::Live(record.clone()));
        Ok(WriteOutcome::Applied)
    }

    async fn remove(&self, id: &str, sequencer: Option<&str>) -> Result<WriteOutcome, PhotoError> {
        self.check_key(id)?;
        let mut items = lock(&self.items);
        let was_live = matches!(items.get(id), Some(Row::Live(_)));

        match sequencer {
            None => {
                if was_live {
                    items.remove(id);
                }
            }
            Some(seq) => {
                if !accepts(items.get(id), seq) {
                    return Ok(WriteOutcome::Skipped);
                }
                items.insert(
                    id.to_string(),
                    Row::Tombstone {
                        sequencer: seq.to_string(),
                    },
                );
            }
        }

        Ok(if was_live {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Skipped
        })
    }

    async fn scan_all(&self) -> Result<Vec<PhotoRecord>, PhotoError> {
        if self.failing_scan.load(Ordering::SeqCst) {
            return Err(PhotoError::storage(format!("table {} is unavailable", self.table_name)));
        }
        Ok(self.live_records())
    }
}
