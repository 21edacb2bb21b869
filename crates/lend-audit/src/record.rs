use std::fmt;

use lend_model::CatalogItem;
use lend_types::{Actor, ItemId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Kind of catalog mutation an audit record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditOperation {
    /// The item was registered. No old snapshot.
    Create,
    /// Copy counts changed (borrow, return, total adjustment).
    Update,
    /// The item was soft-deleted. Both snapshots are kept.
    Delete,
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// The tracked fields of a catalog item at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    pub available_copies: u32,
    pub total_copies: u32,
    pub soft_deleted: bool,
}

impl From<&CatalogItem> for ItemSnapshot {
    fn from(item: &CatalogItem) -> Self {
        Self {
            item_id: item.id(),
            available_copies: item.available_copies(),
            total_copies: item.total_copies(),
            soft_deleted: item.is_soft_deleted(),
        }
    }
}

/// An audit entry before it is sealed into the trail.
///
/// The inventory ledger builds one entry per mutation; the store assigns the
/// sequence number and hash link when appending it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub item_id: ItemId,
    pub operation: AuditOperation,
    pub old: Option<ItemSnapshot>,
    pub new: Option<ItemSnapshot>,
    pub at: Timestamp,
    pub actor: Actor,
    /// Short machine-friendly cause, e.g. `borrow` or `adjust-total`.
    pub reason: String,
}

impl AuditEntry {
    /// Entry for a newly registered item.
    pub fn created(item: &CatalogItem, at: Timestamp, actor: Actor) -> Self {
        Self {
            item_id: item.id(),
            operation: AuditOperation::Create,
            old: None,
            new: Some(ItemSnapshot::from(item)),
            at,
            actor,
            reason: "register".into(),
        }
    }

    /// Entry for a change between two states of the same item.
    pub fn changed(
        operation: AuditOperation,
        before: ItemSnapshot,
        after: &CatalogItem,
        at: Timestamp,
        actor: Actor,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            item_id: after.id(),
            operation,
            old: Some(before),
            new: Some(ItemSnapshot::from(after)),
            at,
            actor,
            reason: reason.into(),
        }
    }

    /// Check that the snapshots fit the operation and the item.
    pub fn validate(&self) -> AuditResult<()> {
        let malformed = |reason: &str| AuditError::MalformedEntry {
            reason: format!("{} for item {}: {reason}", self.operation, self.item_id),
        };

        match (self.operation, &self.old, &self.new) {
            (AuditOperation::Create, None, Some(_)) => {}
            (AuditOperation::Create, _, _) => {
                return Err(malformed("create needs only a new snapshot"))
            }
            (AuditOperation::Update | AuditOperation::Delete, Some(_), Some(_)) => {}
            (_, _, _) => return Err(malformed("both snapshots are required")),
        }

        for snapshot in self.old.iter().chain(self.new.iter()) {
            if snapshot.item_id != self.item_id {
                return Err(malformed("snapshot belongs to another item"));
            }
        }
        if let Some(new) = &self.new {
            if new.available_copies > new.total_copies {
                return Err(malformed("available copies exceed total"));
            }
            if self.operation == AuditOperation::Delete && !new.soft_deleted {
                return Err(malformed("delete must set the soft-delete flag"));
            }
        }
        Ok(())
    }
}

/// A sealed, append-only audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// 1-based position in the trail.
    pub seq: u64,
    pub item_id: ItemId,
    pub operation: AuditOperation,
    pub old: Option<ItemSnapshot>,
    pub new: Option<ItemSnapshot>,
    pub at: Timestamp,
    pub actor: Actor,
    pub reason: String,
    /// Hash of the previous record; `None` for the first.
    pub prev_hash: Option<[u8; 32]>,
    /// Hash of this record with this field zeroed.
    pub record_hash: [u8; 32],
}

impl AuditRecord {
    /// Seal an entry at position `seq`, linking it to `prev_hash`.
    pub fn seal(entry: AuditEntry, seq: u64, prev_hash: Option<[u8; 32]>) -> AuditResult<Self> {
        entry.validate()?;
        let mut record = Self {
            seq,
            item_id: entry.item_id,
            operation: entry.operation,
            old: entry.old,
            new: entry.new,
            at: entry.at,
            actor: entry.actor,
            reason: entry.reason,
            prev_hash,
            record_hash: [0; 32],
        };
        record.record_hash = record.compute_hash()?;
        Ok(record)
    }

    /// Recompute the hash over the canonical form (record hash zeroed).
    pub fn compute_hash(&self) -> AuditResult<[u8; 32]> {
        let mut canonical = self.clone();
        canonical.record_hash = [0; 32];
        let encoded = serde_json::to_vec(&canonical)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"lend-audit-v1:");
        hasher.update(&encoded);
        Ok(*hasher.finalize().as_bytes())
    }

    /// Returns `true` if the stored hash matches the content.
    pub fn verify(&self) -> bool {
        self.compute_hash()
            .map(|h| h == self.record_hash)
            .unwrap_or(false)
    }

    /// Short hex form of the record hash.
    pub fn short_hash(&self) -> String {
        hex::encode(&self.record_hash[..4])
    }
}
