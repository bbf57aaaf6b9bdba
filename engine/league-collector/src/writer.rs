//! Writes validated records to the sink

use crate::error::StepError;
use crate::types::DomainRecord;
use persistence::{PersistenceError, RecordSink, UpsertOutcome};
use std::sync::Arc;
use tracing::debug;

/// Idempotent record writer shared by every planner of a run
#[derive(Clone)]
pub struct RecordWriter {
    sink: Arc<dyn RecordSink>,
}

impl RecordWriter {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn RecordSink> {
        &self.sink
    }

    /// Upsert `record` under its entity key
    pub async fn write(&self, record: &DomainRecord) -> Result<UpsertOutcome, StepError> {
        let key = record.entity_key()?;
        let data = record.to_data().map_err(PersistenceError::from)?;

        let outcome = self.sink.upsert(&key, record.kind(), data).await?;
        debug!("Wrote {} {} ({:?})", record.kind(), key, outcome);
        Ok(outcome)
    }
}
