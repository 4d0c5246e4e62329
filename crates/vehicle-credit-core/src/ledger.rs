//! Persistent aggregate store.
//!
//! Every mutation is a command run through [`Ledger::transact`]: it holds the
//! write lock for its whole duration, works on a staged copy of the state and
//! only swaps the copy in after the snapshot (if any) has been written. A
//! failed command leaves the committed state untouched.
//!
//! File-backed ledgers also take a writer lease (`<file>.lock`, created
//! exclusively) and reload the snapshot under it, so handles in different
//! processes commit one after another against the latest state.

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::closing::{summarize_closing, CashClosing, DeclaredTotals, ExpenseRecord};
use crate::config::EngineConfig;
use crate::delinquency::{assess_loans, DelinquencyReport};
use crate::error::VehicleCreditError;
use crate::loan::{Installment, Loan, LoanTerms};
use crate::news::{apply_news_event, revert_adjustment, NewsAdjustment, NewsEvent, NewsImpact};
use crate::payments::{self, PaymentInput};
use crate::receipt::{build_receipt, Receipt};
use crate::report::{summarize_period, PeriodReport};
use crate::types::{
    ClosingId, ComputationOutput, InstallmentId, LoanId, LoanStatus, Money, NewsId, PaymentMethod,
    StoreId,
};
use crate::VehicleCreditResult;

/// How long a command waits for another writer to release the snapshot.
const LEASE_TIMEOUT: Duration = Duration::from_secs(10);
const LEASE_POLL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub loans: BTreeMap<LoanId, Loan>,
    /// Installments in recording order.
    pub installments: Vec<Installment>,
    pub news: BTreeMap<NewsId, NewsEvent>,
    pub adjustments: Vec<NewsAdjustment>,
    pub closings: BTreeMap<ClosingId, CashClosing>,
}

impl LedgerState {
    fn loan_mut(&mut self, id: LoanId) -> VehicleCreditResult<&mut Loan> {
        self.loans
            .get_mut(&id)
            .ok_or_else(|| VehicleCreditError::not_found("loan", id))
    }

    fn installment_index(&self, id: InstallmentId) -> VehicleCreditResult<usize> {
        self.installments
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| VehicleCreditError::not_found("installment", id))
    }

    fn store_loans(&self, store_id: StoreId) -> Vec<Loan> {
        self.loans
            .values()
            .filter(|l| l.store_id == store_id)
            .cloned()
            .collect()
    }

    fn put_loans(&mut self, loans: Vec<Loan>) {
        for loan in loans {
            self.loans.insert(loan.id, loan);
        }
    }

    /// Undo every adjustment recorded for `news_id`.
    fn revert_news(&mut self, news_id: NewsId) -> VehicleCreditResult<usize> {
        let (reverted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.adjustments)
            .into_iter()
            .partition(|a| a.news_id == news_id);
        self.adjustments = kept;
        for adjustment in &reverted {
            let loan = self.loan_mut(adjustment.loan_id)?;
            revert_adjustment(loan, adjustment)?;
        }
        Ok(reverted.len())
    }

    fn apply_news(&mut self, event: &NewsEvent) -> VehicleCreditResult<ComputationOutput<NewsImpact>> {
        if let Some(loan_id) = event.loan_id {
            let loan = self
                .loans
                .get(&loan_id)
                .ok_or_else(|| VehicleCreditError::not_found("loan", loan_id))?;
            if loan.store_id != event.store_id {
                return Err(VehicleCreditError::invalid(
                    "loan_id",
                    "Loan belongs to a different store",
                ));
            }
        }
        let mut loans = self.store_loans(event.store_id);
        let impact = apply_news_event(&mut loans, event)?;
        self.put_loans(loans);
        self.adjustments
            .extend(impact.result.adjustments.iter().cloned());
        Ok(impact)
    }
}

// ---------------------------------------------------------------------------
// Command inputs
// ---------------------------------------------------------------------------

/// Editable fields of a recorded payment. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallmentUpdate {
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub fee: Option<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingRequest {
    pub store_id: StoreId,
    pub date: NaiveDate,
    pub installment_ids: Vec<InstallmentId>,
    pub declared: DeclaredTotals,
    /// Expense book for the closing; `None` when it could not be obtained.
    /// Only records of the closing's store and date are counted.
    #[serde(default)]
    pub expenses: Option<Vec<ExpenseRecord>>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    state: RwLock<LedgerState>,
    path: Option<PathBuf>,
    config: EngineConfig,
}

impl Ledger {
    pub fn in_memory(config: EngineConfig) -> VehicleCreditResult<Self> {
        config.validate()?;
        Ok(Self {
            state: RwLock::new(LedgerState::default()),
            path: None,
            config,
        })
    }

    /// Open a file-backed ledger. A missing file starts an empty ledger that is
    /// created on the first commit.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> VehicleCreditResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let state = load_state(&path)?;
        log::info!(
            "ledger {} opened: {} loans, {} installments, {} closings",
            path.display(),
            state.loans.len(),
            state.installments.len(),
            state.closings.len()
        );
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }

    fn transact<T>(
        &self,
        command: &str,
        f: impl FnOnce(&mut LedgerState, &EngineConfig) -> VehicleCreditResult<T>,
    ) -> VehicleCreditResult<T> {
        let mut committed = self.state.write();

        let _lease = match &self.path {
            Some(path) => {
                let lease = WriterLease::acquire(path, LEASE_TIMEOUT).inspect_err(|e| {
                    log::warn!("{command} rejected: {e}");
                })?;
                *committed = load_state(path)?;
                Some(lease)
            }
            None => None,
        };
        let mut staged = committed.clone();

        let outcome = f(&mut staged, &self.config).and_then(|value| {
            if let Some(path) = &self.path {
                persist(path, &staged)?;
            }
            Ok(value)
        });

        match outcome {
            Ok(value) => {
                *committed = staged;
                log::info!("{command} committed");
                Ok(value)
            }
            Err(e) => {
                log::warn!("{command} rejected: {e}");
                Err(e)
            }
        }
    }

    // -- Loans --------------------------------------------------------------

    pub fn create_loan(&self, terms: &LoanTerms) -> VehicleCreditResult<Loan> {
        self.transact("create_loan", |state, config| {
            let loan = Loan::open(terms, config)?;
            state.loans.insert(loan.id, loan.clone());
            Ok(loan)
        })
    }

    pub fn loan(&self, id: LoanId) -> VehicleCreditResult<Loan> {
        self.state
            .read()
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| VehicleCreditError::not_found("loan", id))
    }

    pub fn loans_for_store(&self, store_id: StoreId) -> Vec<Loan> {
        self.state.read().store_loans(store_id)
    }

    /// Archive a loan together with all of its installments.
    pub fn archive_loan(&self, id: LoanId) -> VehicleCreditResult<Loan> {
        self.transact("archive_loan", |state, _| {
            let loan = state.loan_mut(id)?;
            if loan.archived {
                return Err(VehicleCreditError::InactiveLoan {
                    loan_id: id,
                    status: loan.status,
                });
            }
            loan.archived = true;
            let archived = loan.clone();
            for inst in state.installments.iter_mut().filter(|i| i.loan_id == id) {
                inst.archived = true;
            }
            Ok(archived)
        })
    }

    /// Move a DEFAULTED loan back to ACTIVE.
    pub fn reinstate_loan(&self, id: LoanId) -> VehicleCreditResult<Loan> {
        self.transact("reinstate_loan", |state, _| {
            let loan = state.loan_mut(id)?;
            if loan.archived || loan.status != LoanStatus::Defaulted {
                return Err(VehicleCreditError::invalid(
                    "status",
                    format!("Only defaulted loans can be reinstated (loan is {:?})", loan.status),
                ));
            }
            loan.status = LoanStatus::Active;
            Ok(loan.clone())
        })
    }

    // -- Installments -------------------------------------------------------

    pub fn record_payment(
        &self,
        loan_id: LoanId,
        input: &PaymentInput,
    ) -> VehicleCreditResult<Installment> {
        self.transact("record_payment", |state, _| {
            let loan = state.loan_mut(loan_id)?;
            let installment = payments::record_payment(loan, input)?;
            state.installments.push(installment.clone());
            Ok(installment)
        })
    }

    pub fn update_installment(
        &self,
        id: InstallmentId,
        update: &InstallmentUpdate,
    ) -> VehicleCreditResult<Installment> {
        self.transact("update_installment", |state, _| {
            let idx = state.installment_index(id)?;
            let inst = &mut state.installments[idx];
            if inst.is_consumed() {
                return Err(VehicleCreditError::AlreadyClosed {
                    installment_ids: vec![id],
                });
            }
            if inst.archived {
                return Err(VehicleCreditError::invalid(
                    "installment_id",
                    "Archived installments cannot be edited",
                ));
            }
            if let Some(fee) = update.fee {
                if fee < Money::ZERO {
                    return Err(VehicleCreditError::invalid("fee", "Fee cannot be negative"));
                }
                inst.fee = fee;
            }
            if let Some(method) = update.method {
                inst.method = method;
            }
            if let Some(notes) = &update.notes {
                inst.notes = notes.clone();
            }
            if let Some(attachment) = &update.attachment {
                inst.attachment = Some(attachment.clone());
            }
            Ok(inst.clone())
        })
    }

    /// Remove the most recent payment of its loan and restore the loan
    /// aggregates.
    pub fn delete_payment(&self, id: InstallmentId) -> VehicleCreditResult<Installment> {
        self.transact("delete_payment", |state, _| {
            let idx = state.installment_index(id)?;
            let installment = state.installments[idx].clone();

            let latest = state
                .installments
                .iter()
                .rev()
                .find(|i| i.loan_id == installment.loan_id)
                .map(|i| i.id);
            if latest != Some(installment.id) {
                return Err(VehicleCreditError::invalid(
                    "installment_id",
                    "Only the most recent payment of a loan can be deleted",
                ));
            }

            let loan = state.loan_mut(installment.loan_id)?;
            payments::delete_payment(loan, &installment)?;
            state.installments.remove(idx);
            Ok(installment)
        })
    }

    pub fn installment(&self, id: InstallmentId) -> VehicleCreditResult<Installment> {
        let state = self.state.read();
        let idx = state.installment_index(id)?;
        Ok(state.installments[idx].clone())
    }

    pub fn installments_for_loan(&self, loan_id: LoanId) -> Vec<Installment> {
        self.state
            .read()
            .installments
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect()
    }

    pub fn installments_for_store(&self, store_id: StoreId) -> Vec<Installment> {
        self.state
            .read()
            .installments
            .iter()
            .filter(|i| i.store_id == store_id)
            .cloned()
            .collect()
    }

    /// Payments still eligible for a cash closing.
    pub fn available_payments(&self, store_id: StoreId) -> Vec<Installment> {
        self.state
            .read()
            .installments
            .iter()
            .filter(|i| i.store_id == store_id && !i.archived && !i.is_consumed())
            .cloned()
            .collect()
    }

    // -- Closings -----------------------------------------------------------

    /// Reconcile the selected payments and mark them consumed, atomically.
    pub fn create_closing(
        &self,
        request: &ClosingRequest,
    ) -> VehicleCreditResult<ComputationOutput<CashClosing>> {
        self.transact("create_closing", |state, config| {
            if request.installment_ids.is_empty() {
                return Err(VehicleCreditError::invalid(
                    "installment_ids",
                    "A closing must include at least one payment",
                ));
            }
            let unique: BTreeSet<InstallmentId> = request.installment_ids.iter().copied().collect();
            if unique.len() != request.installment_ids.len() {
                return Err(VehicleCreditError::invalid(
                    "installment_ids",
                    "Duplicate payment in selection",
                ));
            }

            let mut selected = Vec::with_capacity(request.installment_ids.len());
            for id in &request.installment_ids {
                let inst = &state.installments[state.installment_index(*id)?];
                if inst.store_id != request.store_id {
                    return Err(VehicleCreditError::invalid(
                        "installment_ids",
                        format!("Payment {} belongs to a different store", id),
                    ));
                }
                selected.push(inst.clone());
            }

            let consumed: Vec<InstallmentId> = selected
                .iter()
                .filter(|i| i.is_consumed())
                .map(|i| i.id)
                .collect();
            if !consumed.is_empty() {
                return Err(VehicleCreditError::AlreadyClosed {
                    installment_ids: consumed,
                });
            }
            if let Some(archived) = selected.iter().find(|i| i.archived) {
                return Err(VehicleCreditError::invalid(
                    "installment_ids",
                    format!("Payment {} is archived", archived.id),
                ));
            }

            let expenses: Option<Vec<ExpenseRecord>> = request.expenses.as_ref().map(|all| {
                all.iter()
                    .filter(|e| e.store_id == request.store_id && e.date == request.date)
                    .cloned()
                    .collect()
            });
            let summary =
                summarize_closing(&selected, expenses.as_deref(), &request.declared, config)?;

            let closing = CashClosing {
                id: Uuid::new_v4(),
                store_id: request.store_id,
                date: request.date,
                installment_ids: request.installment_ids.clone(),
                declared: request.declared.clone(),
                summary: summary.result,
                created_by: request.created_by,
            };

            for inst in state
                .installments
                .iter_mut()
                .filter(|i| unique.contains(&i.id))
            {
                inst.closing_id = Some(closing.id);
            }
            state.closings.insert(closing.id, closing.clone());

            Ok(ComputationOutput {
                result: closing,
                methodology: summary.methodology,
                assumptions: summary.assumptions,
                warnings: summary.warnings,
                metadata: summary.metadata,
            })
        })
    }

    pub fn closing(&self, id: ClosingId) -> VehicleCreditResult<CashClosing> {
        self.state
            .read()
            .closings
            .get(&id)
            .cloned()
            .ok_or_else(|| VehicleCreditError::not_found("closing", id))
    }

    pub fn closings_for_store(&self, store_id: StoreId) -> Vec<CashClosing> {
        let mut closings: Vec<CashClosing> = self
            .state
            .read()
            .closings
            .values()
            .filter(|c| c.store_id == store_id)
            .cloned()
            .collect();
        closings.sort_by_key(|c| c.date);
        closings
    }

    pub fn period_report(
        &self,
        store_id: StoreId,
        from: NaiveDate,
        to: NaiveDate,
        expenses: &[ExpenseRecord],
    ) -> VehicleCreditResult<ComputationOutput<PeriodReport>> {
        let installments = self.installments_for_store(store_id);
        let expenses: Vec<ExpenseRecord> = expenses
            .iter()
            .filter(|e| e.store_id == store_id)
            .cloned()
            .collect();
        summarize_period(&installments, &expenses, from, to)
    }

    // -- News ---------------------------------------------------------------

    pub fn create_news_event(
        &self,
        event: &NewsEvent,
    ) -> VehicleCreditResult<ComputationOutput<NewsImpact>> {
        self.transact("create_news_event", |state, _| {
            if state.news.contains_key(&event.id) {
                return Err(VehicleCreditError::invalid("id", "News event already exists"));
            }
            let impact = state.apply_news(event)?;
            state.news.insert(event.id, event.clone());
            Ok(impact)
        })
    }

    /// Replace an event: its previous adjustments are reverted and the new
    /// version is applied from scratch.
    pub fn update_news_event(
        &self,
        event: &NewsEvent,
    ) -> VehicleCreditResult<ComputationOutput<NewsImpact>> {
        self.transact("update_news_event", |state, _| {
            let existing = state
                .news
                .get(&event.id)
                .ok_or_else(|| VehicleCreditError::not_found("news", event.id))?;
            if existing.store_id != event.store_id {
                return Err(VehicleCreditError::invalid(
                    "store_id",
                    "News events cannot move between stores",
                ));
            }
            state.revert_news(event.id)?;
            let impact = state.apply_news(event)?;
            state.news.insert(event.id, event.clone());
            Ok(impact)
        })
    }

    /// Delete an event and restore every loan it adjusted.
    pub fn delete_news_event(&self, id: NewsId) -> VehicleCreditResult<NewsEvent> {
        self.transact("delete_news_event", |state, _| {
            let event = state
                .news
                .remove(&id)
                .ok_or_else(|| VehicleCreditError::not_found("news", id))?;
            let reverted = state.revert_news(id)?;
            log::debug!("news {}: {} adjustments reverted", id, reverted);
            Ok(event)
        })
    }

    pub fn news_for_store(&self, store_id: StoreId) -> Vec<NewsEvent> {
        self.state
            .read()
            .news
            .values()
            .filter(|n| n.store_id == store_id)
            .cloned()
            .collect()
    }

    pub fn adjustments_for_news(&self, id: NewsId) -> Vec<NewsAdjustment> {
        self.state
            .read()
            .adjustments
            .iter()
            .filter(|a| a.news_id == id)
            .cloned()
            .collect()
    }

    // -- Delinquency / receipts ---------------------------------------------

    pub fn assess_delinquency(
        &self,
        store_id: StoreId,
        as_of: NaiveDate,
    ) -> VehicleCreditResult<ComputationOutput<DelinquencyReport>> {
        self.transact("assess_delinquency", |state, config| {
            let mut loans = state.store_loans(store_id);
            let report = assess_loans(&mut loans, as_of, config)?;
            state.put_loans(loans);
            Ok(report)
        })
    }

    pub fn receipt(&self, installment_id: InstallmentId, today: NaiveDate) -> VehicleCreditResult<Receipt> {
        let state = self.state.read();
        let installment = &state.installments[state.installment_index(installment_id)?];
        let loan = state
            .loans
            .get(&installment.loan_id)
            .ok_or_else(|| VehicleCreditError::not_found("loan", installment.loan_id))?;
        build_receipt(loan, installment, today)
    }
}

// ---------------------------------------------------------------------------
// Snapshot file
// ---------------------------------------------------------------------------

/// Exclusive right to commit to a snapshot file, held across processes.
/// Released by removing the lock file on drop.
struct WriterLease {
    path: PathBuf,
}

impl WriterLease {
    fn acquire(snapshot: &Path, timeout: Duration) -> VehicleCreditResult<Self> {
        let path = sibling(snapshot, ".lock")?;
        let started = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= timeout {
                        return Err(VehicleCreditError::Storage(format!(
                            "timed out waiting for writer lease {}",
                            path.display()
                        )));
                    }
                    thread::sleep(LEASE_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("could not release writer lease {}: {e}", self.path.display());
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> VehicleCreditResult<PathBuf> {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| VehicleCreditError::Storage(format!("{} is not a file path", path.display())))?;
    name.push(suffix);
    Ok(path.with_file_name(name))
}

/// Read the snapshot at `path`; a missing file is an empty ledger.
fn load_state(path: &Path) -> VehicleCreditResult<LedgerState> {
    if !path.exists() {
        return Ok(LedgerState::default());
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write `state` next to `path` and rename it into place.
fn persist(path: &Path, state: &LedgerState) -> VehicleCreditResult<()> {
    let tmp = sibling(path, ".tmp")?;

    let body = serde_json::to_vec_pretty(state)?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
