use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{Error, LambdaEvent};
use photo_atoms::records::register_batch;
use photo_shared::TableState;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct RegisterSummary {
    pub applied: usize,
    pub skipped: usize,
    pub rejected: usize,
}

/// Register Lambda handler - keeps the metadata table in step with bucket notifications.
///
/// Every notification is attempted. If any table write failed the invocation
/// errors afterwards so the platform redelivers; the writes are idempotent.
pub(crate) async fn function_handler(
    event: LambdaEvent<S3Event>,
    state: Arc<TableState>,
) -> Result<RegisterSummary, Error> {
    let records = event.payload.records;
    tracing::info!(
        "Register Lambda invoked - request_id={} notifications={}",
        event.context.request_id,
        records.len()
    );

    let report = register_batch(state.table.as_ref(), &records).await;

    tracing::info!(
        "Batch done - applied={} skipped={} rejected={} failed={}",
        report.applied,
        report.skipped,
        report.rejected,
        report.failed.len()
    );

    if report.should_retry() {
        let keys: Vec<&str> = report
            .failed
            .iter()
            .filter_map(|f| f.key.as_deref())
            .collect();
        return Err(Error::from(format!(
            "{} of {} notifications failed to register: {:?}",
            report.failed.len(),
            records.len(),
            keys
        )));
    }

    Ok(RegisterSummary {
        applied: report.applied,
        skipped: report.skipped,
        rejected: report.rejected,
    })
}
