use lend_types::ItemId;

use crate::error::AuditResult;
use crate::record::AuditRecord;

/// Position of the most recent record in the trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuditHead {
    pub seq: u64,
    pub hash: [u8; 32],
}

impl From<&AuditRecord> for AuditHead {
    fn from(record: &AuditRecord) -> Self {
        Self {
            seq: record.seq,
            hash: record.record_hash,
        }
    }
}

/// Read boundary for the audit trail.
///
/// Appending is not part of this trait: records are only written by a store
/// transaction, together with the mutation they describe.
pub trait AuditReader: Send + Sync {
    fn head(&self) -> AuditResult<Option<AuditHead>>;

    /// Records with `from_seq <= seq <= to_seq`, in sequence order.
    fn read_range(&self, from_seq: u64, to_seq: u64) -> AuditResult<Vec<AuditRecord>>;

    fn read_all(&self) -> AuditResult<Vec<AuditRecord>>;

    /// Every record for one item, oldest first.
    fn records_for_item(&self, item: ItemId) -> AuditResult<Vec<AuditRecord>>;

    fn record_count(&self) -> AuditResult<u64>;
}
