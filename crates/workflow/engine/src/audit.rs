//! Audit sinks for forwarding history events
//!
//! Every event appended by a committed engine call is forwarded, in
//! history order, after the commit. The instance history stays the
//! source of truth; a sink failure is logged and never fails the call.

use insureflow_types::{Event, ProcessType, WorkflowInstanceId, WorkflowResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An event together with the instance it belongs to
#[derive(Clone, Debug, PartialEq)]
pub struct AuditRecord {
    pub instance_id: WorkflowInstanceId,
    pub process_type: ProcessType,
    pub event: Event,
}

/// Trait for audit sinks
pub trait AuditSink: Send + Sync {
    /// Forward one record
    fn record(&self, record: &AuditRecord) -> WorkflowResult<()>;
}

/// Emits each record as a structured `tracing` event
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> WorkflowResult<()> {
        let data = if record.event.data.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&record.event.data)
                .map_err(|e| insureflow_types::WorkflowError::Store(e.to_string()))?
        };

        tracing::info!(
            target: "insureflow::audit",
            instance_id = %record.instance_id,
            process_type = %record.process_type,
            sequence = record.event.sequence,
            event_type = %record.event.event_type,
            user_id = %record.event.user_id,
            data = %data,
            "{}",
            record.event.description
        );
        Ok(())
    }
}

/// In-memory audit sink for testing
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Get all records
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Records of one instance, in order
    pub fn records_for(&self, instance_id: &WorkflowInstanceId) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| &r.instance_id == instance_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> WorkflowResult<()> {
        self.records.write().push(record.clone());
        Ok(())
    }
}

/// Discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: &AuditRecord) -> WorkflowResult<()> {
        Ok(())
    }
}

/// Composite sink that writes to multiple sinks
///
/// Every sink sees every record; the first failure is reported after all
/// sinks were tried.
pub struct CompositeSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for CompositeSink {
    fn record(&self, record: &AuditRecord) -> WorkflowResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
