use async_trait::async_trait;
use aws_lambda_events::event::s3::S3EventRecord;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

use super::model::{PhotoRecord, StorageEvent, StorageEventKind};
use crate::error::PhotoError;

/// What a conditional write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Duplicate, stale, or nothing to delete.
    Skipped,
}

/// The metadata table. Writes are idempotent per key: an upsert only lands
/// when its sequencer is newer than the stored one. A sequenced remove leaves
/// a tombstone carrying its sequencer, so a stale create delivered after it
/// is skipped. Tombstones never show up in `scan_all`.
///
/// `remove` reports `Applied` only when a live record went away.
#[async_trait]
pub trait RecordTable: Send + Sync {
    fn table_name(&self) -> &str;

    async fn upsert(&self, record: &PhotoRecord) -> Result<WriteOutcome, PhotoError>;

    async fn remove(&self, id: &str, sequencer: Option<&str>) -> Result<WriteOutcome, PhotoError>;

    async fn scan_all(&self) -> Result<Vec<PhotoRecord>, PhotoError>;
}

/// Shared by upserts and tombstone writes: land only over nothing, over an
/// unsequenced row, or over an older sequencer.
const UPSERT_CONDITION: &str =
    "attribute_not_exists(#id) OR attribute_not_exists(#seq) OR #seq < :seq";

const DELETED_ATTRIBUTE: &str = "deleted";

/// DynamoDB table keyed by `id` (string).
#[derive(Debug, Clone)]
pub struct DynamoRecordTable {
    client: DynamoClient,
    table_name: String,
}

impl DynamoRecordTable {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Without a sequencer there is nothing to order a tombstone by, so the
    /// live row is simply deleted.
    async fn delete_unsequenced(&self, id: &str) -> Result<WriteOutcome, PhotoError> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| PhotoError::storage(format!("DynamoDB delete_item error: {}", e)))?;

        match output.attributes() {
            Some(old) if !is_tombstone(old) => Ok(WriteOutcome::Applied),
            _ => Ok(WriteOutcome::Skipped),
        }
    }
}

#[async_trait]
impl RecordTable for DynamoRecordTable {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn upsert(&self, record: &PhotoRecord) -> Result<WriteOutcome, PhotoError> {
        let mut builder = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)));

        // Since there is conditional logic for the sequencer, we need to use builder
        if let Some(seq) = &record.sequencer {
            builder = builder
                .condition_expression(UPSERT_CONDITION)
                .expression_attribute_names("#id", "id")
                .expression_attribute_names("#seq", "sequencer")
                .expression_attribute_values(":seq", AttributeValue::S(seq.clone()));
        }

        match builder.send().await {
            Ok(_) => Ok(WriteOutcome::Applied),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Ok(WriteOutcome::Skipped)
            }
            Err(e) => Err(PhotoError::storage(format!("DynamoDB put_item error: {}", e))),
        }
    }

    async fn remove(&self, id: &str, sequencer: Option<&str>) -> Result<WriteOutcome, PhotoError> {
        let Some(seq) = sequencer else {
            return self.delete_unsequenced(id).await;
        };

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(tombstone_item(id, seq)))
            .condition_expression(UPSERT_CONDITION)
            .expression_attribute_names("#id", "id")
            .expression_attribute_names("#seq", "sequencer")
            .expression_attribute_values(":seq", AttributeValue::S(seq.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await;

        match result {
            Ok(output) => match output.attributes() {
                Some(old) if !is_tombstone(old) => Ok(WriteOutcome::Applied),
                _ => Ok(WriteOutcome::Skipped),
            },
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Ok(WriteOutcome::Skipped)
            }
            Err(e) => Err(PhotoError::storage(format!("DynamoDB put_item (tombstone) error: {}", e))),
        }
    }

    async fn scan_all(&self) -> Result<Vec<PhotoRecord>, PhotoError> {
        let mut records = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("attribute_not_exists(#deleted)")
                .expression_attribute_names("#deleted", DELETED_ATTRIBUTE)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| PhotoError::storage(format!("DynamoDB scan error: {}", e)))?;

            for item in result.items().iter().filter(|item| !is_tombstone(item)) {
                match record_from_item(item) {
                    Some(record) => records.push(record),
                    None => tracing::warn!("Skipping table item without an id"),
                }
            }

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }
}

pub fn record_to_item(record: &PhotoRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(record.id.clone()));
    item.insert("object_key".to_string(), AttributeValue::S(record.object_key.clone()));
    item.insert("bucket".to_string(), AttributeValue::S(record.bucket.clone()));
    item.insert("size".to_string(), AttributeValue::N(record.size.to_string()));
    item.insert("event_time".to_string(), AttributeValue::S(record.event_time.clone()));
    if let Some(etag) = &record.etag {
        item.insert("etag".to_string(), AttributeValue::S(etag.clone()));
    }
    if let Some(seq) = &record.sequencer {
        item.insert("sequencer".to_string(), AttributeValue::S(seq.clone()));
    }
    item
}

pub fn tombstone_item(id: &str, sequencer: &str) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(id.to_string()));
    item.insert("sequencer".to_string(), AttributeValue::S(sequencer.to_string()));
    item.insert(DELETED_ATTRIBUTE.to_string(), AttributeValue::Bool(true));
    item
}

pub fn is_tombstone(item: &HashMap<String, AttributeValue>) -> bool {
    item.contains_key(DELETED_ATTRIBUTE)
}

pub fn record_from_item(item: &HashMap<String, AttributeValue>) -> Option<PhotoRecord> {
    let id = item.get("id").and_then(|v| v.as_s().ok())?.to_string();
    Some(PhotoRecord {
        object_key: item
            .get("object_key")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| id.clone()),
        bucket: item.get("bucket").and_then(|v| v.as_s().ok()).map(|s| s.to_string()).unwrap_or_default(),
        size: item.get("size").and_then(|v| v.as_n().ok()).and_then(|n| n.parse().ok()).unwrap_or(0),
        etag: item.get("etag").and_then(|v| v.as_s().ok()).map(|s| s.to_string()),
        event_time: item.get("event_time").and_then(|v| v.as_s().ok()).map(|s| s.to_string()).unwrap_or_default(),
        sequencer: item.get("sequencer").and_then(|v| v.as_s().ok()).map(|s| s.to_string()),
        id,
    })
}

/// Apply one normalized storage event to the table.
pub async fn register_event(
    table: &dyn RecordTable,
    event: &StorageEvent,
) -> Result<WriteOutcome, PhotoError> {
    match event.kind {
        StorageEventKind::Created => table.upsert(&event.to_record()).await,
        StorageEventKind::Removed => table.remove(&event.key, event.sequencer.as_deref()).await,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedNotification {
    pub index: usize,
    pub key: Option<String>,
    pub error: PhotoError,
}

/// Tally of one notification batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub applied: usize,
    pub skipped: usize,
    /// Notifications we cannot act on (unsupported event, undecodable key).
    /// Retrying them would not help.
    pub rejected: usize,
    /// Table failures; the platform should redeliver the batch.
    pub failed: Vec<FailedNotification>,
}

impl BatchReport {
    pub fn should_retry(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Apply every notification in the batch independently. A failure on one
/// never stops the rest; the caller decides what to do with `failed`.
pub async fn register_batch(table: &dyn RecordTable, records: &[S3EventRecord]) -> BatchReport {
    let mut report = BatchReport::default();

    for (index, record) in records.iter().enumerate() {
        let event = match StorageEvent::try_from(record) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    "Rejected notification #{}: event={:?}, key={:?}, error={}",
                    index,
                    record.event_name,
                    record.s3.object.key,
                    e
                );
                report.rejected += 1;
                continue;
            }
        };

        match register_event(table, &event).await {
            Ok(WriteOutcome::Applied) => {
                tracing::info!("Registered {:?} for key={} in table={}", event.kind, event.key, table.table_name());
                report.applied += 1;
            }
            Ok(WriteOutcome::Skipped) => {
                tracing::info!("Skipped {:?} for key={} (duplicate, stale or absent)", event.kind, event.key);
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!(
                    "Failed to register {:?} for key={} in table={}: {}",
                    event.kind,
                    event.key,
                    table.table_name(),
                    e
                );
                report.failed.push(FailedNotification {
                    index,
                    key: Some(event.key.clone()),
                    error: e,
                });
            }
        }
    }

    report
}

/// Every record in the table, in scan order.
pub async fn list_records(table: &dyn RecordTable) -> Result<Vec<PhotoRecord>, PhotoError> {
    table.scan_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordTable;
    use crate::records::model::normalize_sequencer;
    use aws_lambda_events::event::s3::S3Event;

    fn created(key: &str, seq: &str) -> StorageEvent {
        StorageEvent {
            kind: StorageEventKind::Created,
            bucket: "photo-bucket".to_string(),
            key: key.to_string(),
            size: 10,
            etag: Some(format!("etag-{seq}")),
            sequencer: normalize_sequencer(seq),
            event_time: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn removed(key: &str, seq: &str) -> StorageEvent {
        StorageEvent {
            kind: StorageEventKind::Removed,
            size: 0,
            etag: None,
            ..created(key, seq)
        }
    }

    fn s3_record(event_name: &str, key: &str, sequencer: &str) -> serde_json::Value {
        serde_json::json!({
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "ap-southeast-2",
            "eventTime": "2026-01-01T00:00:00.000Z",
            "eventName": event_name,
            "userIdentity": { "principalId": "AWS:EXAMPLE" },
            "requestParameters": { "sourceIPAddress": "127.0.0.1" },
            "responseElements": {},
            "s3": {
                "s3SchemaVersion": "1.0",
                "configurationId": "photo-trigger",
                "bucket": { "name": "photo-bucket", "arn": "arn:aws:s3:::photo-bucket" },
                "object": { "key": key, "size": 4, "eTag": "abc", "sequencer": sequencer }
            }
        })
    }

    fn batch(records: Vec<serde_json::Value>) -> Vec<S3EventRecord> {
        let event: S3Event = serde_json::from_value(serde_json::json!({ "Records": records }))
            .expect("fixture should deserialize");
        event.records
    }

    #[test]
    fn item_round_trips_through_attribute_values() {
        let record = created("cat.png", "0A").to_record();
        let item = record_to_item(&record);

        assert_eq!(item["size"], AttributeValue::N("10".to_string()));
        assert_eq!(record_from_item(&item), Some(record));
    }

    #[test]
    fn item_without_id_is_ignored() {
        let mut item = HashMap::new();
        item.insert("bucket".to_string(), AttributeValue::S("b".to_string()));
        assert_eq!(record_from_item(&item), None);
    }

    #[tokio::test]
    async fn duplicate_created_event_is_idempotent() {
        let table = MemoryRecordTable::new("photos");
        let event = created("cat.png", "01");

        assert_eq!(register_event(&table, &event).await.unwrap(), WriteOutcome::Applied);
        let once = table.snapshot();
        assert_eq!(register_event(&table, &event).await.unwrap(), WriteOutcome::Skipped);

        assert_eq!(table.snapshot(), once);
    }

    #[tokio::test]
    async fn removed_before_created_does_not_crash() {
        let table = MemoryRecordTable::new("photos");

        let outcome = register_event(&table, &removed("cat.png", "02")).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert!(table.snapshot().is_empty());
    }

    #[tokio::test]
    async fn stale_created_event_after_remove_stays_removed() {
        let table = MemoryRecordTable::new("photos");
        register_event(&table, &created("cat.png", "01")).await.unwrap();
        register_event(&table, &removed("cat.png", "03")).await.unwrap();

        let outcome = register_event(&table, &created("cat.png", "02")).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Skipped);
        assert!(list_records(&table).await.unwrap().is_empty());
    }

    #[test]
    fn tombstone_item_is_recognised() {
        let item = tombstone_item("cat.png", "0A");
        assert!(is_tombstone(&item));
        assert_eq!(item["sequencer"], AttributeValue::S("0A".to_string()));
        assert!(!is_tombstone(&record_to_item(&created("cat.png", "0A").to_record())));
    }

    #[tokio::test]
    async fn stale_created_event_does_not_overwrite_newer_record() {
        let table = MemoryRecordTable::new("photos");
        register_event(&table, &created("cat.png", "05")).await.unwrap();

        let outcome = register_event(&table, &created("cat.png", "03")).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(table.snapshot()[0].etag.as_deref(), Some("etag-05"));
    }

    #[tokio::test]
    async fn remove_deletes_existing_record() {
        let table = MemoryRecordTable::new("photos");
        register_event(&table, &created("cat.png", "01")).await.unwrap();

        let outcome = register_event(&table, &removed("cat.png", "02")).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Applied);
        assert!(list_records(&table).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_handles_each_notification_independently() {
        let table = MemoryRecordTable::new("photos");
        let records = batch(vec![
            s3_record("ObjectCreated:Put", "a.png", "01"),
            s3_record("ObjectRestore:Completed", "b.png", "02"),
            s3_record("ObjectCreated:Put", "bad%zz.png", "03"),
            s3_record("ObjectCreated:Put", "my+cat.png", "04"),
            s3_record("ObjectRemoved:Delete", "gone.png", "05"),
        ]);

        let report = register_batch(&table, &records).await;

        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.rejected, 2);
        assert!(!report.should_retry());
        let mut ids: Vec<String> = table.snapshot().into_iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a.png".to_string(), "my cat.png".to_string()]);
    }

    #[tokio::test]
    async fn table_failure_is_reported_for_retry_without_stopping_siblings() {
        let table = MemoryRecordTable::new("photos");
        table.fail_key("broken.png");
        let records = batch(vec![
            s3_record("ObjectCreated:Put", "broken.png", "01"),
            s3_record("ObjectCreated:Put", "ok.png", "02"),
        ]);

        let report = register_batch(&table, &records).await;

        assert_eq!(report.applied, 1);
        assert!(report.should_retry());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].index, 0);
        assert_eq!(report.failed[0].key.as_deref(), Some("broken.png"));
        assert!(matches!(report.failed[0].error, PhotoError::StorageUnavailable(_)));
    }

    mod dynamo {
        use super::*;
        use aws_sdk_dynamodb::operation::delete_item::DeleteItemOutput;
        use aws_sdk_dynamodb::operation::put_item::{PutItemError, PutItemOutput};
        use aws_sdk_dynamodb::operation::scan::ScanOutput;
        use aws_sdk_dynamodb::types::error::ConditionalCheckFailedException;
        use aws_smithy_mocks::{mock, mock_client, RuleMode};

        const EXPECTED_CONDITION: &str =
            "attribute_not_exists(#id) OR attribute_not_exists(#seq) OR #seq < :seq";

        fn sequenced_put(req: &aws_sdk_dynamodb::operation::put_item::PutItemInput, seq: &str) -> bool {
            req.table_name() == Some("photos")
                && req.condition_expression() == Some(EXPECTED_CONDITION)
                && req.expression_attribute_names().and_then(|n| n.get("#seq")).map(String::as_str)
                    == Some("sequencer")
                && req.expression_attribute_values().and_then(|v| v.get(":seq"))
                    == Some(&AttributeValue::S(seq.to_string()))
        }

        fn condition_failed() -> PutItemError {
            PutItemError::ConditionalCheckFailedException(
                ConditionalCheckFailedException::builder()
                    .message("The conditional request failed")
                    .build(),
            )
        }

        #[tokio::test]
        async fn upsert_sends_sequencer_condition() {
            let expected = normalize_sequencer("0A").unwrap();
            let rule = mock!(aws_sdk_dynamodb::Client::put_item)
                .match_requests(move |req| {
                    sequenced_put(req, &expected)
                        && req.item().and_then(|i| i.get("deleted")).is_none()
                })
                .then_output(|| PutItemOutput::builder().build());
            let table = DynamoRecordTable::new(mock_client!(aws_sdk_dynamodb, [&rule]), "photos");

            let outcome = table.upsert(&created("cat.png", "0A").to_record()).await.unwrap();

            assert_eq!(outcome, WriteOutcome::Applied);
            assert_eq!(rule.num_calls(), 1);
        }

        #[tokio::test]
        async fn failed_condition_on_upsert_is_skipped() {
            let rule = mock!(aws_sdk_dynamodb::Client::put_item).then_error(condition_failed);
            let table = DynamoRecordTable::new(mock_client!(aws_sdk_dynamodb, [&rule]), "photos");

            let outcome = table.upsert(&created("cat.png", "01").to_record()).await.unwrap();

            assert_eq!(outcome, WriteOutcome::Skipped);
        }

        #[tokio::test]
        async fn sequenced_remove_writes_tombstone_over_live_record() {
            let seq = normalize_sequencer("02").unwrap();
            let expected = seq.clone();
            let rule = mock!(aws_sdk_dynamodb::Client::put_item)
                .match_requests(move |req| {
                    sequenced_put(req, &expected)
                        && req.item().map(is_tombstone).unwrap_or(false)
                        && req.return_values() == Some(&ReturnValue::AllOld)
                })
                .then_output(|| {
                    PutItemOutput::builder()
                        .attributes("id", AttributeValue::S("cat.png".to_string()))
                        .attributes("size", AttributeValue::N("10".to_string()))
                        .build()
                });
            let table = DynamoRecordTable::new(mock_client!(aws_sdk_dynamodb, [&rule]), "photos");

            let outcome = table.remove("cat.png", Some(&seq)).await.unwrap();

            assert_eq!(outcome, WriteOutcome::Applied);
        }

        #[tokio::test]
        async fn remove_without_live_record_or_with_newer_record_is_skipped() {
            let absent = mock!(aws_sdk_dynamodb::Client::put_item)
                .match_requests(|req| req.expression_attribute_values().and_then(|v| v.get(":seq"))
                    == Some(&AttributeValue::S("01".to_string())))
                .then_output(|| PutItemOutput::builder().build());
            let newer = mock!(aws_sdk_dynamodb::Client::put_item)
                .match_requests(|req| req.expression_attribute_values().and_then(|v| v.get(":seq"))
                    == Some(&AttributeValue::S("02".to_string())))
                .then_error(condition_failed);
            let table = DynamoRecordTable::new(
                mock_client!(aws_sdk_dynamodb, RuleMode::MatchAny, [&absent, &newer]),
                "photos",
            );

            assert_eq!(table.remove("a.png", Some("01")).await.unwrap(), WriteOutcome::Skipped);
            assert_eq!(table.remove("b.png", Some("02")).await.unwrap(), WriteOutcome::Skipped);
        }

        #[tokio::test]
        async fn unsequenced_remove_deletes_the_row() {
            let rule = mock!(aws_sdk_dynamodb::Client::delete_item)
                .match_requests(|req| req.key().and_then(|k| k.get("id"))
                    == Some(&AttributeValue::S("cat.png".to_string())))
                .then_output(|| {
                    DeleteItemOutput::builder()
                        .attributes("id", AttributeValue::S("cat.png".to_string()))
                        .build()
                });
            let table = DynamoRecordTable::new(mock_client!(aws_sdk_dynamodb, [&rule]), "photos");

            assert_eq!(table.remove("cat.png", None).await.unwrap(), WriteOutcome::Applied);
        }

        #[tokio::test]
        async fn scan_follows_last_evaluated_key_and_hides_tombstones() {
            let first = mock!(aws_sdk_dynamodb::Client::scan)
                .match_requests(|req| {
                    req.exclusive_start_key().is_none()
                        && req.filter_expression() == Some("attribute_not_exists(#deleted)")
                })
                .then_output(|| {
                    ScanOutput::builder()
                        .items(record_to_item(&created("a.png", "01").to_record()))
                        .last_evaluated_key("id", AttributeValue::S("a.png".to_string()))
                        .build()
                });
            let second = mock!(aws_sdk_dynamodb::Client::scan)
                .match_requests(|req| {
                    req.exclusive_start_key().and_then(|k| k.get("id"))
                        == Some(&AttributeValue::S("a.png".to_string()))
                })
                .then_output(|| {
                    ScanOutput::builder()
                        .items(record_to_item(&created("b.png", "02").to_record()))
                        .items(tombstone_item("c.png", "03"))
                        .build()
                });
            let table = DynamoRecordTable::new(
                mock_client!(aws_sdk_dynamodb, RuleMode::MatchAny, [&first, &second]),
                "photos",
            );

            let mut ids: Vec<String> = table.scan_all().await.unwrap().into_iter().map(|r| r.id).collect();
            ids.sort();

            assert_eq!(ids, vec!["a.png".to_string(), "b.png".to_string()]);
            assert_eq!(first.num_calls(), 1);
            assert_eq!(second.num_calls(), 1);
        }
    }
}
