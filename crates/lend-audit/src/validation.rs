use std::collections::HashMap;

use lend_types::ItemId;

use crate::error::AuditResult;
use crate::record::{AuditEntry, AuditOperation, AuditRecord, ItemSnapshot};
use crate::traits::AuditReader;

/// Result of validating an audit trail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrailReport {
    pub record_count: u64,
    pub items_seen: usize,
    pub hash_chain_valid: bool,
    pub sequence_monotonic: bool,
    pub snapshots_continuous: bool,
    pub violations: Vec<Violation>,
}

impl TrailReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub seq: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    SequenceGap,
    HashChainBreak,
    HashMismatch,
    MalformedEntry,
    /// A second `Create` for an item that already exists.
    DuplicateCreate,
    /// An `Update` or `Delete` for an item with no prior `Create`.
    MissingCreate,
    /// The old snapshot differs from the previous record's new snapshot.
    SnapshotDiscontinuity,
}

/// Audit trail integrity validator.
pub struct TrailValidator;

impl TrailValidator {
    /// Read the whole trail and validate it.
    pub fn validate<R: AuditReader + ?Sized>(reader: &R) -> AuditResult<TrailReport> {
        let records = reader.read_all()?;
        let report = Self::validate_records(&records);
        tracing::debug!(
            records = report.record_count,
            violations = report.violations.len(),
            "audit trail validated"
        );
        Ok(report)
    }

    /// Validate a trail given as records in sequence order.
    pub fn validate_records(records: &[AuditRecord]) -> TrailReport {
        let mut violations = Vec::new();
        let mut hash_chain_valid = true;
        let mut sequence_monotonic = true;
        let mut snapshots_continuous = true;
        let mut last_state: HashMap<ItemId, ItemSnapshot> = HashMap::new();

        for (index, record) in records.iter().enumerate() {
            let mut flag = |kind: ViolationKind, description: String| {
                violations.push(Violation {
                    seq: record.seq,
                    kind,
                    description,
                });
            };

            let expected_seq = (index + 1) as u64;
            if record.seq != expected_seq {
                sequence_monotonic = false;
                flag(
                    ViolationKind::SequenceGap,
                    format!("expected seq {expected_seq}, got {}", record.seq),
                );
            }

            let expected_prev = index
                .checked_sub(1)
                .map(|prev| records[prev].record_hash);
            if record.prev_hash != expected_prev {
                hash_chain_valid = false;
                flag(
                    ViolationKind::HashChainBreak,
                    "previous hash link mismatch".into(),
                );
            }

            if !record.verify() {
                hash_chain_valid = false;
                flag(
                    ViolationKind::HashMismatch,
                    "record hash does not match computed".into(),
                );
            }

            if let Err(e) = entry_of(record).validate() {
                flag(ViolationKind::MalformedEntry, e.to_string());
                continue;
            }

            let previous = last_state.get(&record.item_id).copied();
            match (record.operation, previous) {
                (AuditOperation::Create, Some(_)) => flag(
                    ViolationKind::DuplicateCreate,
                    format!("item {} created twice", record.item_id),
                ),
                (AuditOperation::Update | AuditOperation::Delete, None) => flag(
                    ViolationKind::MissingCreate,
                    format!("item {} changed before it was created", record.item_id),
                ),
                (AuditOperation::Update | AuditOperation::Delete, Some(prev)) => {
                    if record.old != Some(prev) {
                        snapshots_continuous = false;
                        flag(
                            ViolationKind::SnapshotDiscontinuity,
                            format!(
                                "item {} old state does not match last recorded state",
                                record.item_id
                            ),
                        );
                    }
                }
                (AuditOperation::Create, None) => {}
            }

            if let Some(new) = record.new {
                last_state.insert(record.item_id, new);
            }
        }

        TrailReport {
            record_count: records.len() as u64,
            items_seen: last_state.len(),
            hash_chain_valid,
            sequence_monotonic,
            snapshots_continuous,
            violations,
        }
    }
}

fn entry_of(record: &AuditRecord) -> AuditEntry {
    AuditEntry {
        item_id: record.item_id,
        operation: record.operation,
        old: record.old,
        new: record.new,
        at: record.at,
        actor: record.actor.clone(),
        reason: record.reason.clone(),
    }
}
