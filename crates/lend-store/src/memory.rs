use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use lend_audit::{
    AuditEntry, AuditError, AuditHead, AuditReader, AuditRecord, AuditResult, ItemSnapshot,
};
use lend_model::{CatalogItem, ItemParts, Loan, LoanParts, Member, MemberParts};
use lend_types::{ItemId, LoanId, MemberId, Money, RequestId, Timestamp};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{
    CommitSummary, CopyChange, CopyUpdate, FeeAdjustment, LendingStore, StoreTransaction,
};

/// Committed rows. Entities are held in their storage form and rebuilt
/// through the trusted `rehydrate` path on every read.
#[derive(Default)]
struct StoreState {
    items: HashMap<ItemId, ItemParts>,
    members: HashMap<MemberId, MemberParts>,
    loans: HashMap<LoanId, LoanParts>,
    audit: Vec<AuditRecord>,
    requests: HashMap<RequestId, LoanId>,
}

impl StoreState {
    fn head(&self) -> Option<AuditHead> {
        self.audit.last().map(AuditHead::from)
    }
}

/// In-memory lending store.
///
/// Write transactions are serialised by a single async writer lock, so a
/// transaction's view of committed state cannot change underneath it.
/// Readers take a short read lock on the committed state and never wait on
/// an open transaction.
pub struct InMemoryLendingStore {
    state: Arc<RwLock<StoreState>>,
    writer: Arc<Mutex<()>>,
    config: StoreConfig,
}

impl InMemoryLendingStore {
    /// Create an empty store with default settings.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            writer: Arc::new(Mutex::new(())),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn read_state(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        read_lock(&self.state)
    }
}

impl Default for InMemoryLendingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryLendingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("InMemoryLendingStore");
        if let Ok(state) = self.state.read() {
            s.field("items", &state.items.len())
                .field("members", &state.members.len())
                .field("loans", &state.loans.len())
                .field("audit_records", &state.audit.len());
        }
        s.field("config", &self.config).finish()
    }
}

fn read_lock(state: &RwLock<StoreState>) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
    state
        .read()
        .map_err(|_| StoreError::InvariantViolation("store read lock poisoned".into()))
}

fn write_lock(state: &RwLock<StoreState>) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
    state
        .write()
        .map_err(|_| StoreError::InvariantViolation("store write lock poisoned".into()))
}

fn audit_backend<T>(result: StoreResult<T>) -> AuditResult<T> {
    result.map_err(|e| AuditError::Backend(e.to_string()))
}

#[async_trait]
impl LendingStore for InMemoryLendingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let waited = self.config.lock_timeout;
        let guard = tokio::time::timeout(waited, self.writer.clone().lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout { waited })?;
        Ok(Box::new(MemoryTransaction::new(self.state.clone(), guard)))
    }

    fn item(&self, id: ItemId) -> StoreResult<Option<CatalogItem>> {
        let state = self.read_state()?;
        Ok(state.items.get(&id).cloned().map(CatalogItem::rehydrate))
    }

    fn member(&self, id: MemberId) -> StoreResult<Option<Member>> {
        let state = self.read_state()?;
        Ok(state.members.get(&id).cloned().map(Member::rehydrate))
    }

    fn loan(&self, id: LoanId) -> StoreResult<Option<Loan>> {
        let state = self.read_state()?;
        Ok(state.loans.get(&id).cloned().map(Loan::rehydrate))
    }

    fn items(&self) -> StoreResult<Vec<CatalogItem>> {
        let state = self.read_state()?;
        let mut items: Vec<CatalogItem> = state
            .items
            .values()
            .cloned()
            .map(CatalogItem::rehydrate)
            .collect();
        items.sort_by_key(CatalogItem::id);
        Ok(items)
    }

    fn loans(&self) -> StoreResult<Vec<Loan>> {
        let state = self.read_state()?;
        let mut loans: Vec<Loan> = state.loans.values().cloned().map(Loan::rehydrate).collect();
        loans.sort_by_key(Loan::id);
        Ok(loans)
    }
}

impl AuditReader for InMemoryLendingStore {
    fn head(&self) -> AuditResult<Option<AuditHead>> {
        let state = audit_backend(self.read_state())?;
        Ok(state.head())
    }

    fn read_range(&self, from_seq: u64, to_seq: u64) -> AuditResult<Vec<AuditRecord>> {
        if from_seq > to_seq {
            return Err(AuditError::InvalidRange {
                from: from_seq,
                to: to_seq,
            });
        }
        let state = audit_backend(self.read_state())?;
        Ok(state
            .audit
            .iter()
            .filter(|r| r.seq >= from_seq && r.seq <= to_seq)
            .cloned()
            .collect())
    }

    fn read_all(&self) -> AuditResult<Vec<AuditRecord>> {
        let state = audit_backend(self.read_state())?;
        Ok(state.audit.clone())
    }

    fn records_for_item(&self, item: ItemId) -> AuditResult<Vec<AuditRecord>> {
        let state = audit_backend(self.read_state())?;
        Ok(state
            .audit
            .iter()
            .filter(|r| r.item_id == item)
            .cloned()
            .collect())
    }

    fn record_count(&self) -> AuditResult<u64> {
        let state = audit_backend(self.read_state())?;
        Ok(state.audit.len() as u64)
    }
}

/// Write transaction over [`InMemoryLendingStore`].
///
/// Holds the store's writer lock for its whole lifetime.
struct MemoryTransaction {
    state: Arc<RwLock<StoreState>>,
    _writer: OwnedMutexGuard<()>,
    items: HashMap<ItemId, CatalogItem>,
    members: HashMap<MemberId, Member>,
    loans: HashMap<LoanId, Loan>,
    audit: Vec<AuditEntry>,
    requests: HashMap<RequestId, LoanId>,
    mutations: HashMap<ItemId, u32>,
    committed: bool,
}

impl MemoryTransaction {
    fn new(state: Arc<RwLock<StoreState>>, writer: OwnedMutexGuard<()>) -> Self {
        Self {
            state,
            _writer: writer,
            items: HashMap::new(),
            members: HashMap::new(),
            loans: HashMap::new(),
            audit: Vec::new(),
            requests: HashMap::new(),
            mutations: HashMap::new(),
            committed: false,
        }
    }

    fn is_dirty(&self) -> bool {
        !(self.items.is_empty()
            && self.members.is_empty()
            && self.loans.is_empty()
            && self.audit.is_empty()
            && self.requests.is_empty())
    }

    fn stage_item(&mut self, item: CatalogItem) {
        *self.mutations.entry(item.id()).or_default() += 1;
        self.items.insert(item.id(), item);
    }

    /// Check the write-set before anything is applied.
    fn verify_write_set(&self) -> StoreResult<()> {
        let mut records: HashMap<ItemId, u32> = HashMap::new();
        let mut last_new: HashMap<ItemId, ItemSnapshot> = HashMap::new();
        for entry in &self.audit {
            *records.entry(entry.item_id).or_default() += 1;
            if let Some(new) = entry.new {
                last_new.insert(entry.item_id, new);
            }
        }

        let touched: HashSet<ItemId> = self
            .mutations
            .keys()
            .chain(records.keys())
            .copied()
            .collect();
        for item in touched {
            let mutations = self.mutations.get(&item).copied().unwrap_or(0);
            let audited = records.get(&item).copied().unwrap_or(0);
            if mutations != audited {
                return Err(StoreError::UnauditedMutation {
                    item,
                    mutations,
                    records: audited,
                });
            }
        }

        for (id, item) in &self.items {
            item.check_invariant()
                .map_err(|e| StoreError::InvariantViolation(e.to_string()))?;
            if last_new.get(id) != Some(&ItemSnapshot::from(item)) {
                return Err(StoreError::AuditMismatch { item: *id });
            }
        }
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction {
    fn item(&self, id: ItemId) -> StoreResult<Option<CatalogItem>> {
        if let Some(item) = self.items.get(&id) {
            return Ok(Some(item.clone()));
        }
        let state = read_lock(&self.state)?;
        Ok(state.items.get(&id).cloned().map(CatalogItem::rehydrate))
    }

    fn insert_item(&mut self, item: CatalogItem) -> StoreResult<()> {
        if self.item(item.id())?.is_some() {
            return Err(StoreError::Duplicate {
                entity: "item",
                id: item.id().to_string(),
            });
        }
        self.stage_item(item);
        Ok(())
    }

    fn update_item(&mut self, item: CatalogItem) -> StoreResult<()> {
        if self.item(item.id())?.is_none() {
            return Err(StoreError::not_found("item", item.id()));
        }
        self.stage_item(item);
        Ok(())
    }

    fn conditional_update_available(
        &mut self,
        id: ItemId,
        change: CopyChange,
        at: Timestamp,
    ) -> StoreResult<CopyUpdate> {
        let Some(before) = self.item(id)? else {
            return Ok(CopyUpdate::Missing);
        };
        let mut after = before.clone();
        let applied = match change {
            CopyChange::Take => after.take_copy(at),
            CopyChange::Restore => after.restore_copy(at),
        };
        if !applied {
            return Ok(CopyUpdate::Unchanged(before));
        }
        self.stage_item(after.clone());
        Ok(CopyUpdate::Applied { before, after })
    }

    fn member(&self, id: MemberId) -> StoreResult<Option<Member>> {
        if let Some(member) = self.members.get(&id) {
            return Ok(Some(member.clone()));
        }
        let state = read_lock(&self.state)?;
        Ok(state.members.get(&id).cloned().map(Member::rehydrate))
    }

    fn put_member(&mut self, member: Member) -> StoreResult<()> {
        self.members.insert(member.id(), member);
        Ok(())
    }

    fn adjust_member_fees(
        &mut self,
        id: MemberId,
        adjustment: FeeAdjustment,
    ) -> StoreResult<Money> {
        let mut member = self
            .member(id)?
            .ok_or_else(|| StoreError::not_found("member", id))?;
        let balance = match adjustment {
            FeeAdjustment::Charge(amount) => member.add_fee(amount)?,
            FeeAdjustment::Pay(amount) => member.pay_fee(amount)?,
        };
        self.members.insert(id, member);
        Ok(balance)
    }

    fn loan(&self, id: LoanId) -> StoreResult<Option<Loan>> {
        if let Some(loan) = self.loans.get(&id) {
            return Ok(Some(loan.clone()));
        }
        let state = read_lock(&self.state)?;
        Ok(state.loans.get(&id).cloned().map(Loan::rehydrate))
    }

    fn put_loan(&mut self, loan: Loan) -> StoreResult<()> {
        self.loans.insert(loan.id(), loan);
        Ok(())
    }

    fn loans_for_member(&self, member: MemberId) -> StoreResult<Vec<Loan>> {
        let state = read_lock(&self.state)?;
        let committed = state
            .loans
            .values()
            .filter(|parts| parts.member_id == member && !self.loans.contains_key(&parts.id))
            .cloned()
            .map(Loan::rehydrate);
        let staged = self
            .loans
            .values()
            .filter(|loan| loan.member_id() == member)
            .cloned();
        let mut loans: Vec<Loan> = committed.chain(staged).collect();
        loans.sort_by_key(|loan| (loan.borrowed_at(), loan.id()));
        Ok(loans)
    }

    fn append_audit(&mut self, entry: AuditEntry) -> StoreResult<()> {
        entry.validate()?;
        self.audit.push(entry);
        Ok(())
    }

    fn completed_request(&self, id: RequestId) -> StoreResult<Option<LoanId>> {
        if let Some(loan) = self.requests.get(&id) {
            return Ok(Some(*loan));
        }
        let state = read_lock(&self.state)?;
        Ok(state.requests.get(&id).copied())
    }

    fn record_request(&mut self, id: RequestId, loan: LoanId) -> StoreResult<()> {
        if self.completed_request(id)?.is_some() {
            return Err(StoreError::Duplicate {
                entity: "request",
                id: id.to_string(),
            });
        }
        self.requests.insert(id, loan);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<CommitSummary> {
        if let Err(e) = self.verify_write_set() {
            tracing::error!(error = %e, "refusing to commit transaction");
            return Err(e);
        }

        let state_lock = self.state.clone();
        let mut state = write_lock(&state_lock)?;

        // Seal first so a failure leaves committed state untouched.
        let mut prev_hash = state.head().map(|h| h.hash);
        let mut seq = state.audit.len() as u64;
        let mut sealed = Vec::with_capacity(self.audit.len());
        for entry in std::mem::take(&mut self.audit) {
            seq += 1;
            let record = AuditRecord::seal(entry, seq, prev_hash)?;
            prev_hash = Some(record.record_hash);
            sealed.push(record);
        }

        let audit_records = sealed.len();
        state.audit.extend(sealed);
        for (id, item) in std::mem::take(&mut self.items) {
            state.items.insert(id, item.into_parts());
        }
        for (id, member) in std::mem::take(&mut self.members) {
            state.members.insert(id, member.into_parts());
        }
        for (id, loan) in std::mem::take(&mut self.loans) {
            state.loans.insert(id, loan.into_parts());
        }
        state.requests.extend(std::mem::take(&mut self.requests));
        let head = state.head();
        drop(state);

        self.committed = true;
        tracing::debug!(audit_records, "transaction committed");
        Ok(CommitSummary {
            audit_records,
            head,
        })
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.committed && self.is_dirty() {
            tracing::debug!(
                staged_items = self.items.len(),
                staged_loans = self.loans.len(),
                "transaction rolled back"
            );
        }
    }
}
