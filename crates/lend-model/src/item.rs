use lend_types::{ItemId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A lendable title with a fixed number of physical copies.
///
/// Invariant: `available_copies <= total_copies`. The copy counts are only
/// changed by [`take_copy`](Self::take_copy), [`restore_copy`](Self::restore_copy),
/// and [`adjust_total`](Self::adjust_total), which the store calls while it
/// holds the item under its write lock. Items are never removed; retiring an
/// item sets the soft-delete flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    id: ItemId,
    title: String,
    total_copies: u32,
    available_copies: u32,
    soft_deleted: bool,
    created_at: Timestamp,
    updated_at: Timestamp,
}

/// Raw field values of a [`CatalogItem`], as held by storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemParts {
    pub id: ItemId,
    pub title: String,
    pub total_copies: u32,
    pub available_copies: u32,
    pub soft_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CatalogItem {
    /// Create a new item with every copy on the shelf.
    pub fn new(title: impl Into<String>, total_copies: u32, now: Timestamp) -> DomainResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::EmptyField { field: "title" });
        }
        Ok(Self {
            id: ItemId::new(),
            title,
            total_copies,
            available_copies: total_copies,
            soft_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild an item from trusted storage without validation.
    pub fn rehydrate(parts: ItemParts) -> Self {
        Self {
            id: parts.id,
            title: parts.title,
            total_copies: parts.total_copies,
            available_copies: parts.available_copies,
            soft_deleted: parts.soft_deleted,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    /// Decompose into raw fields for storage.
    pub fn into_parts(self) -> ItemParts {
        ItemParts {
            id: self.id,
            title: self.title,
            total_copies: self.total_copies,
            available_copies: self.available_copies,
            soft_deleted: self.soft_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn available_copies(&self) -> u32 {
        self.available_copies
    }

    /// Copies currently lent out.
    pub fn on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.soft_deleted
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Returns `true` if a copy can be lent right now.
    pub fn is_borrowable(&self) -> bool {
        !self.soft_deleted && self.available_copies > 0
    }

    /// Check-and-decrement: take one copy off the shelf.
    ///
    /// Returns `false` without changing anything when the item is retired
    /// or has no copy available.
    pub fn take_copy(&mut self, now: Timestamp) -> bool {
        if !self.is_borrowable() {
            return false;
        }
        self.available_copies -= 1;
        self.updated_at = now;
        true
    }

    /// Put one copy back on the shelf, capped at the total.
    ///
    /// Returns `false` when every copy is already on the shelf.
    pub fn restore_copy(&mut self, now: Timestamp) -> bool {
        if self.available_copies >= self.total_copies {
            return false;
        }
        self.available_copies += 1;
        self.updated_at = now;
        true
    }

    /// Change the number of physical copies, keeping the on-loan count.
    pub fn adjust_total(&mut self, new_total: u32, now: Timestamp) -> DomainResult<()> {
        if self.soft_deleted {
            return Err(DomainError::ItemRetired(self.id));
        }
        let on_loan = self.on_loan();
        if new_total < on_loan {
            return Err(DomainError::TotalBelowOnLoan {
                requested: new_total,
                on_loan,
            });
        }
        self.total_copies = new_total;
        self.available_copies = new_total - on_loan;
        self.updated_at = now;
        Ok(())
    }

    /// Soft-delete the item. Copies still on loan may be returned later.
    pub fn retire(&mut self, now: Timestamp) -> DomainResult<()> {
        if self.soft_deleted {
            return Err(DomainError::ItemRetired(self.id));
        }
        self.soft_deleted = true;
        self.updated_at = now;
        Ok(())
    }

    /// Verify the copy-count invariant.
    pub fn check_invariant(&self) -> DomainResult<()> {
        if self.available_copies > self.total_copies {
            return Err(DomainError::InvalidCopyCount {
                total: self.total_copies,
                available: self.available_copies,
            });
        }
        Ok(())
    }
}
