use lend_audit::{AuditEntry, AuditOperation, ItemSnapshot};
use lend_model::CatalogItem;
use lend_store::{CopyChange, CopyUpdate, StoreTransaction};
use lend_types::{Actor, ItemId, Timestamp};
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// What [`InventoryLedger::return_copy`] did with the copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyReturn {
    /// The copy went back on the shelf.
    Restored,
    /// Every copy was already on the shelf. The count was left unchanged,
    /// which means the inventory and the loan records disagree.
    AlreadyShelved { total: u32 },
    /// No item with that id exists.
    Missing,
}

impl CopyReturn {
    /// Returns `true` when the return could not be reflected in the count.
    pub fn is_discrepancy(&self) -> bool {
        matches!(self, Self::AlreadyShelved { .. })
    }
}

/// Audited copy-count operations on catalog items.
///
/// Every method works inside the transaction it is given and never commits
/// it; the caller decides whether the surrounding workflow succeeds.
pub struct InventoryLedger;

impl InventoryLedger {
    /// Take one copy of `item` off the shelf.
    ///
    /// Returns `Ok(false)` when the item is retired or has no copy available.
    /// The check and the decrement are a single conditional update.
    pub fn borrow_copy(
        tx: &mut dyn StoreTransaction,
        item: ItemId,
        actor: &Actor,
        at: Timestamp,
    ) -> LedgerResult<bool> {
        match tx.conditional_update_available(item, CopyChange::Take, at)? {
            CopyUpdate::Missing => Err(LedgerError::ItemNotFound(item)),
            CopyUpdate::Unchanged(current) => {
                debug!(
                    item = %item,
                    available = current.available_copies(),
                    retired = current.is_soft_deleted(),
                    "no copy available to lend"
                );
                Ok(false)
            }
            CopyUpdate::Applied { before, after } => {
                tx.append_audit(AuditEntry::changed(
                    AuditOperation::Update,
                    ItemSnapshot::from(&before),
                    &after,
                    at,
                    actor.clone(),
                    "borrow",
                ))?;
                debug!(item = %item, available = after.available_copies(), "copy lent");
                Ok(true)
            }
        }
    }

    /// Put one copy of `item` back on the shelf.
    ///
    /// If every copy is already on the shelf nothing changes, no audit entry
    /// is written, and [`CopyReturn::AlreadyShelved`] reports the discrepancy.
    pub fn return_copy(
        tx: &mut dyn StoreTransaction,
        item: ItemId,
        actor: &Actor,
        at: Timestamp,
    ) -> LedgerResult<CopyReturn> {
        match tx.conditional_update_available(item, CopyChange::Restore, at)? {
            CopyUpdate::Missing => {
                debug!(item = %item, "return for unknown item");
                Ok(CopyReturn::Missing)
            }
            CopyUpdate::Unchanged(current) => {
                warn!(
                    item = %item,
                    total = current.total_copies(),
                    "return would exceed total copies; count left unchanged"
                );
                Ok(CopyReturn::AlreadyShelved {
                    total: current.total_copies(),
                })
            }
            CopyUpdate::Applied { before, after } => {
                tx.append_audit(AuditEntry::changed(
                    AuditOperation::Update,
                    ItemSnapshot::from(&before),
                    &after,
                    at,
                    actor.clone(),
                    "return",
                ))?;
                debug!(item = %item, available = after.available_copies(), "copy returned");
                Ok(CopyReturn::Restored)
            }
        }
    }

    /// Add a new title with `copies` copies, all on the shelf.
    pub fn register_item(
        tx: &mut dyn StoreTransaction,
        title: &str,
        copies: u32,
        actor: &Actor,
        at: Timestamp,
    ) -> LedgerResult<CatalogItem> {
        let item = CatalogItem::new(title, copies, at)?;
        tx.append_audit(AuditEntry::created(&item, at, actor.clone()))?;
        tx.insert_item(item.clone())?;
        debug!(item = %item.id(), copies, "item registered");
        Ok(item)
    }

    /// Change the number of physical copies while keeping the number on loan.
    ///
    /// Setting the current total again is a no-op and writes no audit entry.
    pub fn adjust_total_copies(
        tx: &mut dyn StoreTransaction,
        item: ItemId,
        new_total: u32,
        actor: &Actor,
        at: Timestamp,
    ) -> LedgerResult<CatalogItem> {
        let mut current = tx.item(item)?.ok_or(LedgerError::ItemNotFound(item))?;
        if current.total_copies() == new_total {
            return Ok(current);
        }
        let before = ItemSnapshot::from(&current);
        current.adjust_total(new_total, at)?;
        tx.append_audit(AuditEntry::changed(
            AuditOperation::Update,
            before,
            &current,
            at,
            actor.clone(),
            "adjust-total",
        ))?;
        tx.update_item(current.clone())?;
        debug!(item = %item, total = new_total, "total copies adjusted");
        Ok(current)
    }

    /// Soft-delete an item. It can no longer be lent, but outstanding copies
    /// may still be returned.
    pub fn retire_item(
        tx: &mut dyn StoreTransaction,
        item: ItemId,
        actor: &Actor,
        at: Timestamp,
    ) -> LedgerResult<CatalogItem> {
        let mut current = tx.item(item)?.ok_or(LedgerError::ItemNotFound(item))?;
        let before = ItemSnapshot::from(&current);
        current.retire(at)?;
        tx.append_audit(AuditEntry::changed(
            AuditOperation::Delete,
            before,
            &current,
            at,
            actor.clone(),
            "retire",
        ))?;
        tx.update_item(current.clone())?;
        debug!(item = %item, "item retired");
        Ok(current)
    }
}
