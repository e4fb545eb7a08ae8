//! In-memory loan book.
//!
//! Every mutating operation runs as a transaction against one loan: the loan's
//! mutex is held for the whole read-modify-write, the work happens on a clone,
//! and the clone replaces the stored loan only when the work succeeds. Loans
//! are independent of each other, so operations on different loans proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::import::{self, ImportReport, ImportRow, RowStatus};
use crate::ledger::{Loan, NewLoan};
use crate::payments::{PaymentAllocator, PaymentReceipt, PaymentRequest, ReceiptJournal};
use crate::types::{LoanId, PaymentSource, ReceiptId};
use crate::views::InstallmentView;

/// result of looking up a borrower's open loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorrowerMatch {
    None,
    Unique(LoanId),
    /// references of every open candidate
    Ambiguous(Vec<String>),
}

#[derive(Debug, Default)]
struct Registry {
    loans: HashMap<LoanId, Arc<Mutex<Loan>>>,
    by_reference: HashMap<String, LoanId>,
    by_operation: HashMap<String, LoanId>,
    by_borrower: HashMap<String, Vec<LoanId>>,
    next_sequence: u64,
}

impl Registry {
    fn insert(&mut self, loan: Loan) {
        let id = loan.id;
        self.by_reference.insert(loan.reference.clone(), id);
        if let Some(number) = &loan.operation_number {
            self.by_operation.insert(number.clone(), id);
        }
        self.by_borrower.entry(loan.borrower_id.clone()).or_default().push(id);
        self.loans.insert(id, Arc::new(Mutex::new(loan)));
    }

    fn next_reference(&mut self, prefix: &str) -> String {
        loop {
            self.next_sequence += 1;
            let candidate = format!("{}-{:06}", prefix, self.next_sequence);
            if !self.by_reference.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// working state of one loan transaction
#[derive(Debug)]
pub struct LoanTx {
    /// working copy, written back on commit
    pub loan: Loan,
    pub events: EventStore,
    receipts: Vec<PaymentReceipt>,
}

impl LoanTx {
    fn begin(loan: Loan) -> Self {
        Self {
            loan,
            events: EventStore::new(),
            receipts: Vec::new(),
        }
    }

    /// queue a receipt for the journal, dropped on rollback
    pub fn stage(&mut self, receipt: PaymentReceipt) {
        self.receipts.push(receipt);
    }

    pub fn staged(&self) -> &[PaymentReceipt] {
        &self.receipts
    }
}

pub struct LoanBook {
    config: LedgerConfig,
    registry: RwLock<Registry>,
    journal: Mutex<ReceiptJournal>,
    events: Mutex<EventStore>,
}

fn poisoned(resource: &'static str) -> LedgerError {
    LedgerError::StoragePoisoned { resource }
}

impl LoanBook {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            registry: RwLock::new(Registry::default()),
            journal: Mutex::new(ReceiptJournal::new()),
            events: Mutex::new(EventStore::new()),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// originate a loan with its schedule and register it
    pub fn create_loan(&self, request: NewLoan, time: &SafeTimeProvider) -> Result<Loan> {
        request.validate()?;

        let open_date = request.open_date.unwrap_or_else(|| time.now().date_naive());
        let mut events = EventStore::new();

        let loan = {
            let mut registry = self.registry.write().map_err(|_| poisoned("registry"))?;

            if let Some(number) = &request.operation_number {
                if registry.by_operation.contains_key(number) {
                    return Err(LedgerError::DuplicateOperationNumber {
                        number: number.clone(),
                    });
                }
            }

            let reference = match &request.reference {
                Some(reference) => {
                    let reference = reference.trim().to_string();
                    if registry.by_reference.contains_key(&reference) {
                        return Err(LedgerError::DuplicateReference { reference });
                    }
                    reference
                }
                None => registry.next_reference(&self.config.reference_prefix),
            };

            let loan = Loan::originate(&request, reference, open_date, &self.config, &mut events)?;
            registry.insert(loan.clone());
            loan
        };

        self.events.lock().map_err(|_| poisoned("events"))?.absorb(&mut events);

        Ok(loan)
    }

    fn handle(&self, id: LoanId) -> Result<Arc<Mutex<Loan>>> {
        let registry = self.registry.read().map_err(|_| poisoned("registry"))?;
        registry.loans
            .get(&id)
            .cloned()
            .ok_or(LedgerError::LoanNotFound { id })
    }

    fn id_for_reference(&self, reference: &str) -> Result<LoanId> {
        let registry = self.registry.read().map_err(|_| poisoned("registry"))?;
        registry.by_reference
            .get(reference.trim())
            .copied()
            .ok_or_else(|| LedgerError::LoanReferenceNotFound {
                reference: reference.to_string(),
            })
    }

    /// run `work` as one atomic transaction on a loan.
    ///
    /// The loan stays locked until commit or rollback. On `Err` the stored
    /// loan, the journal and the event log are left exactly as they were.
    pub fn transact<T, F>(&self, id: LoanId, work: F) -> Result<T>
    where
        F: FnOnce(&mut LoanTx) -> Result<T>,
    {
        let handle = self.handle(id)?;
        let mut stored = handle.lock().map_err(|_| poisoned("loan"))?;

        let mut tx = LoanTx::begin(stored.clone());

        let value = match work(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                warn!(loan_id = %id, error = %e, "transaction rolled back");
                return Err(e);
            }
        };

        if tx.loan.id != stored.id
            || tx.loan.reference != stored.reference
            || tx.loan.borrower_id != stored.borrower_id
            || tx.loan.operation_number != stored.operation_number
        {
            warn!(loan_id = %id, "transaction rolled back, loan identity changed");
            return Err(LedgerError::invalid_field("loan", "identity cannot change inside a transaction"));
        }

        let mut journal = self.journal.lock().map_err(|_| poisoned("journal"))?;
        let mut events = self.events.lock().map_err(|_| poisoned("events"))?;

        let LoanTx { loan, events: mut staged_events, receipts } = tx;
        *stored = loan;
        let receipt_count = receipts.len();
        for receipt in receipts {
            journal.append(receipt);
        }
        events.absorb(&mut staged_events);

        debug!(loan_id = %id, receipts = receipt_count, "transaction committed");

        Ok(value)
    }

    /// allocate one payment to a loan
    pub fn pay(&self, id: LoanId, request: PaymentRequest, time: &SafeTimeProvider) -> Result<PaymentReceipt> {
        let created_at = time.now();

        self.transact(id, |tx| {
            let receipt = PaymentAllocator::allocate(&mut tx.loan, &request, created_at, &mut tx.events)?;
            tx.stage(receipt.clone());
            Ok(receipt)
        })
    }

    pub fn pay_by_reference(
        &self,
        reference: &str,
        request: PaymentRequest,
        time: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let id = self.id_for_reference(reference)?;
        self.pay(id, request, time)
    }

    /// apply a bulk payment file.
    ///
    /// Header and format problems fail the whole import before any row is
    /// touched. After that every row is its own transaction and gets its own
    /// outcome in the report; a failing row never stops the rest.
    pub fn import_payments(
        &self,
        bytes: &[u8],
        effective_date: NaiveDate,
        time: &SafeTimeProvider,
    ) -> Result<ImportReport> {
        let parsed = import::parse(bytes, &self.config.import)?;
        let mut report = ImportReport::new();

        for row in &parsed.rows {
            let status = match row.precheck() {
                Some(status) => status,
                None => self.apply_row(row, effective_date, time),
            };
            debug!(row = row.row, identifier = %row.identifier, ?status, "import row processed");
            report.record(row, status);
        }

        let timestamp = time.now();
        self.events.lock().map_err(|_| poisoned("events"))?.emit(Event::ImportCompleted {
            rows: report.total(),
            applied: report.applied,
            amount_applied: report.amount_applied,
            timestamp,
        });

        info!(
            rows = report.total(),
            applied = report.applied,
            skipped = report.skipped,
            zero_amount = report.zero_amount,
            not_found = report.not_found,
            ambiguous = report.ambiguous,
            failed = report.failed,
            amount_applied = %report.amount_applied,
            "import completed"
        );

        Ok(report)
    }

    fn apply_row(&self, row: &ImportRow, effective_date: NaiveDate, time: &SafeTimeProvider) -> RowStatus {
        let amount = match row.amount {
            Some(amount) => amount,
            None => return RowStatus::ZeroAmount,
        };

        let id = match self.find_open_by_borrower(&row.identifier, &row.normalized) {
            Ok(BorrowerMatch::Unique(id)) => id,
            Ok(BorrowerMatch::None) => return RowStatus::NotFound,
            Ok(BorrowerMatch::Ambiguous(references)) => {
                warn!(row = row.row, identifier = %row.identifier, ?references, "identifier matches several open loans");
                return RowStatus::Ambiguous { references };
            }
            Err(e) => return RowStatus::Failed { message: e.to_string() },
        };

        let request = PaymentRequest::new(amount, effective_date, PaymentSource::BulkImport);
        match self.pay(id, request, time) {
            Ok(receipt) => RowStatus::Applied {
                loan_id: id,
                receipt_id: receipt.id,
                unapplied: receipt.unapplied,
            },
            Err(e) => {
                warn!(row = row.row, loan_id = %id, error = %e, "import row failed");
                RowStatus::Failed { message: e.to_string() }
            }
        }
    }

    /// set the moratory interest due on one installment
    pub fn assess_moratory(&self, id: LoanId, seq: u32, amount: Money, time: &SafeTimeProvider) -> Result<()> {
        let timestamp = time.now();
        self.transact(id, |tx| tx.loan.assess_moratory(seq, amount, timestamp, &mut tx.events))
    }

    /// recount overdue installments as of a date, returns the count
    pub fn refresh_delinquency(&self, id: LoanId, as_of: NaiveDate, time: &SafeTimeProvider) -> Result<u32> {
        let timestamp = time.now();
        self.transact(id, |tx| Ok(tx.loan.refresh_delinquency(as_of, timestamp, &mut tx.events)))
    }

    pub fn mark_legal(&self, id: LoanId, time: &SafeTimeProvider) -> Result<()> {
        let timestamp = time.now();
        self.transact(id, |tx| tx.loan.mark_legal(timestamp, &mut tx.events))
    }

    /// snapshot of a loan
    pub fn loan(&self, id: LoanId) -> Result<Loan> {
        let handle = self.handle(id)?;
        let loan = handle.lock().map_err(|_| poisoned("loan"))?;
        Ok(loan.clone())
    }

    pub fn loan_by_reference(&self, reference: &str) -> Result<Loan> {
        let id = self.id_for_reference(reference)?;
        self.loan(id)
    }

    /// snapshots of every loan, ordered by reference
    pub fn loans(&self) -> Result<Vec<Loan>> {
        let handles: Vec<Arc<Mutex<Loan>>> = {
            let registry = self.registry.read().map_err(|_| poisoned("registry"))?;
            registry.loans.values().cloned().collect()
        };

        let mut loans = handles
            .iter()
            .map(|h| h.lock().map(|loan| loan.clone()).map_err(|_| poisoned("loan")))
            .collect::<Result<Vec<_>>>()?;
        loans.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(loans)
    }

    pub fn receipts_for(&self, id: LoanId) -> Result<Vec<PaymentReceipt>> {
        self.handle(id)?;
        let journal = self.journal.lock().map_err(|_| poisoned("journal"))?;
        Ok(journal.for_loan(id))
    }

    pub fn receipt(&self, id: ReceiptId) -> Result<Option<PaymentReceipt>> {
        let journal = self.journal.lock().map_err(|_| poisoned("journal"))?;
        Ok(journal.get(id).cloned())
    }

    /// the single open loan of a borrower, matched on the raw or normalized identifier
    pub fn find_open_by_borrower(&self, raw: &str, normalized: &str) -> Result<BorrowerMatch> {
        let handles: Vec<Arc<Mutex<Loan>>> = {
            let registry = self.registry.read().map_err(|_| poisoned("registry"))?;

            let mut ids: Vec<LoanId> = [raw.trim(), normalized.trim()]
                .iter()
                .filter(|key| !key.is_empty())
                .filter_map(|key| registry.by_borrower.get(*key))
                .flatten()
                .copied()
                .collect();
            ids.sort();
            ids.dedup();

            ids.iter().filter_map(|id| registry.loans.get(id).cloned()).collect()
        };

        let mut open = Vec::new();
        for handle in handles {
            let loan = handle.lock().map_err(|_| poisoned("loan"))?;
            if loan.status.is_open() {
                open.push((loan.id, loan.reference.clone()));
            }
        }

        Ok(match open.as_slice() {
            [] => BorrowerMatch::None,
            [(id, _)] => BorrowerMatch::Unique(*id),
            many => {
                let mut references: Vec<String> = many.iter().map(|(_, r)| r.clone()).collect();
                references.sort();
                BorrowerMatch::Ambiguous(references)
            }
        })
    }

    /// drain committed events
    pub fn take_events(&self) -> Result<Vec<Event>> {
        let mut events = self.events.lock().map_err(|_| poisoned("events"))?;
        Ok(events.take_events())
    }

    /// principal collected by receipts effective within `from..=to`
    pub fn principal_collected_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Money> {
        let journal = self.journal.lock().map_err(|_| poisoned("journal"))?;
        Ok(journal
            .iter()
            .filter(|r| r.effective_date >= from && r.effective_date <= to)
            .map(|r| r.breakdown.to_principal)
            .sum())
    }

    /// installments of every loan falling due within `from..=to`
    pub fn installments_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<InstallmentView>> {
        let mut due: Vec<InstallmentView> = self
            .loans()?
            .iter()
            .flat_map(|loan| {
                loan.installments
                    .iter()
                    .filter(move |i| i.due_date >= from && i.due_date <= to)
                    .map(move |i| InstallmentView::new(loan, i))
            })
            .collect();

        due.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.reference.cmp(&b.reference)));
        Ok(due)
    }
}
