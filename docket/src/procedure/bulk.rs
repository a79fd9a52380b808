use crate::collection::Document;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::Filter;
use crate::trigger::TriggerPipeline;
use std::time::{Duration, Instant};

/// How much work one batch may do before handing control back.
///
/// Running out of budget is not an error: the batch stops cleanly between
/// operations and reports what is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// At most this many operations.
    Operations(usize),
    /// Stop once this much wall-clock time has passed. At least one
    /// operation runs whenever the batch starts with time left.
    Elapsed(Duration),
    Unlimited,
}

struct BudgetMeter {
    budget: Budget,
    started: Instant,
    spent: usize,
}

impl BudgetMeter {
    fn start(budget: Budget) -> Self {
        BudgetMeter {
            budget,
            started: Instant::now(),
            spent: 0,
        }
    }

    fn exhausted(&self) -> bool {
        match self.budget {
            Budget::Operations(limit) => self.spent >= limit,
            Budget::Elapsed(limit) => self.started.elapsed() >= limit,
            Budget::Unlimited => false,
        }
    }

    fn charge(&mut self) {
        self.spent += 1;
    }
}

/// A single step of a bulk workload.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Create(Document),
    Delete(String),
}

/// Why a batch stopped.
#[derive(Debug, Clone)]
pub enum BatchStatus {
    /// Every operation was applied.
    Completed,
    /// The budget ran out; the remainder can be resubmitted.
    BudgetExhausted,
    /// The operation at the head of the remainder failed and was not applied.
    Failed(DocketError),
}

/// Result of [BulkOperationDriver::run_batch].
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    applied: usize,
    remaining: Vec<BulkOperation>,
    status: BatchStatus,
}

impl BatchOutcome {
    /// Number of operations applied by this batch.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Operations not applied, in their original order.
    pub fn remaining(&self) -> &[BulkOperation] {
        &self.remaining
    }

    pub fn into_remaining(self) -> Vec<BulkOperation> {
        self.remaining
    }

    pub fn status(&self) -> &BatchStatus {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, BatchStatus::Completed)
    }
}

/// Result of [BulkOperationDriver::delete_matching].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    deleted: usize,
    more_remaining: bool,
}

impl DeleteOutcome {
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    /// Whether the filter still matches at least one live document.
    pub fn more_remaining(&self) -> bool {
        self.more_remaining
    }
}

/// Applies sequences of writes under a budget.
///
/// Operations run strictly in the order given and are never partially
/// applied: each one either succeeds or stays at the head of the remainder.
/// Every operation holds the collection write gate only while it runs, so a
/// batch interleaves fairly with other writers and can be resumed later by
/// resubmitting the remainder.
///
/// Bulk writes go straight to the store; they do not run triggers.
///
/// # Usage
///
/// ```rust
/// use docket::collection::DocumentStore;
/// use docket::procedure::{Budget, BulkOperation, BulkOperationDriver};
/// use docket::trigger::TriggerPipeline;
/// use docket::doc;
///
/// let pipeline = TriggerPipeline::new(DocumentStore::new("bulk"));
/// let driver = BulkOperationDriver::new(pipeline, 200);
///
/// let ops: Vec<BulkOperation> = (0..5)
///     .map(|i| BulkOperation::Create(doc! { name: (format!("Bulk inserted doc {}", i)) }))
///     .collect();
/// let outcome = driver.run_batch(ops, Budget::Operations(3));
/// assert_eq!(outcome.applied(), 3);
/// assert_eq!(outcome.remaining().len(), 2);
/// ```
#[derive(Clone)]
pub struct BulkOperationDriver {
    pipeline: TriggerPipeline,
    page_size: usize,
}

impl BulkOperationDriver {
    /// Creates a driver; `page_size` bounds how many matches a delete scan
    /// materializes at once.
    pub fn new(pipeline: TriggerPipeline, page_size: usize) -> Self {
        BulkOperationDriver {
            pipeline,
            page_size,
        }
    }

    /// Applies `operations` in order until they run out, the budget runs out,
    /// or one fails.
    pub fn run_batch(&self, mut operations: Vec<BulkOperation>, budget: Budget) -> BatchOutcome {
        let mut meter = BudgetMeter::start(budget);
        let mut applied = 0;
        let mut status = BatchStatus::Completed;

        for operation in &operations {
            if meter.exhausted() {
                status = BatchStatus::BudgetExhausted;
                break;
            }
            match self.apply(operation) {
                Ok(()) => {
                    applied += 1;
                    meter.charge();
                }
                Err(err) => {
                    log::error!("Bulk operation {} failed: {}", applied, err);
                    status = BatchStatus::Failed(err);
                    break;
                }
            }
        }

        let remaining = operations.split_off(applied);
        log::debug!(
            "Bulk batch on {} applied {}, {} remaining, status {:?}",
            self.pipeline.store().name(),
            applied,
            remaining.len(),
            status
        );
        BatchOutcome {
            applied,
            remaining,
            status,
        }
    }

    /// Deletes documents matching `filter` until the budget runs out.
    ///
    /// The filter is resolved against the live store on every call, so
    /// documents deleted by someone else in the meantime are skipped and new
    /// matches are picked up by the next call.
    pub fn delete_matching(&self, filter: &Filter, budget: Budget) -> DocketResult<DeleteOutcome> {
        let store = self.pipeline.store();
        let mut meter = BudgetMeter::start(budget);
        let mut deleted = 0;
        let mut cursor = store.scan(filter.clone(), self.page_size)?;

        'pages: while !meter.exhausted() {
            let page = cursor.next_page(None)?;
            let done = !page.has_more();
            for document in page.documents() {
                if meter.exhausted() {
                    break 'pages;
                }
                let Some(id) = document.id() else { continue };
                let result = {
                    let _gate = self.pipeline.gate();
                    store.delete(id)
                };
                match result {
                    Ok(_) => {
                        deleted += 1;
                        meter.charge();
                    }
                    Err(err) if err.kind() == &ErrorKind::NotFound => {
                        log::trace!("{} was already deleted", id);
                    }
                    Err(err) => return Err(err),
                }
            }
            if done {
                break;
            }
        }

        let more_remaining = store.first_match(filter)?.is_some();
        log::debug!(
            "Bulk delete on {} removed {}, more remaining: {}",
            store.name(),
            deleted,
            more_remaining
        );
        Ok(DeleteOutcome {
            deleted,
            more_remaining,
        })
    }

    fn apply(&self, operation: &BulkOperation) -> DocketResult<()> {
        let store = self.pipeline.store();
        let _gate = self.pipeline.gate();
        match operation {
            BulkOperation::Create(document) => store.create(document.clone()).map(|_| ()),
            BulkOperation::Delete(id) => store.delete(id).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::DocumentStore;
    use crate::doc;
    use crate::filter::field;

    fn driver() -> BulkOperationDriver {
        BulkOperationDriver::new(TriggerPipeline::new(DocumentStore::new("bulk")), 200)
    }

    fn creates(n: usize) -> Vec<BulkOperation> {
        (0..n)
            .map(|i| {
                BulkOperation::Create(doc! {
                    id: (format!("doc{:04}", i)),
                    name: (format!("Bulk inserted doc {}", i)),
                })
            })
            .collect()
    }

    #[test]
    fn thousand_creates_in_five_budgeted_batches() {
        let driver = driver();
        let mut pending = creates(1000);
        let mut total = 0;
        let mut calls = 0;
        while !pending.is_empty() {
            let outcome = driver.run_batch(pending, Budget::Operations(200));
            calls += 1;
            total += outcome.applied();
            assert!(!matches!(outcome.status(), BatchStatus::Failed(_)));
            pending = outcome.into_remaining();
        }
        assert_eq!(calls, 5);
        assert_eq!(total, 1000);
        assert_eq!(driver.pipeline.store().size(), 1000);
    }

    #[test]
    fn budget_exhaustion_keeps_order() {
        let driver = driver();
        let outcome = driver.run_batch(creates(5), Budget::Operations(2));
        assert!(matches!(outcome.status(), BatchStatus::BudgetExhausted));
        assert_eq!(outcome.applied(), 2);
        assert_eq!(outcome.remaining(), &creates(5)[2..]);
        assert_eq!(
            driver.pipeline.store().ids(),
            vec!["doc0000".to_string(), "doc0001".to_string()]
        );
    }

    #[test]
    fn exact_budget_completes() {
        let driver = driver();
        let outcome = driver.run_batch(creates(3), Budget::Operations(3));
        assert!(outcome.is_complete());
        assert!(outcome.remaining().is_empty());
    }

    #[test]
    fn empty_batch_completes() {
        let outcome = driver().run_batch(Vec::new(), Budget::Operations(0));
        assert!(outcome.is_complete());
        assert_eq!(outcome.applied(), 0);
    }

    #[test]
    fn failure_leaves_failed_operation_at_head() {
        let driver = driver();
        driver.pipeline.store().create(doc! { id: "doc0001" }).unwrap();
        let outcome = driver.run_batch(creates(3), Budget::Unlimited);
        assert_eq!(outcome.applied(), 1);
        match outcome.status() {
            BatchStatus::Failed(err) => assert_eq!(err.kind(), &ErrorKind::DuplicateId),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(outcome.remaining(), &creates(3)[1..]);
    }

    #[test]
    fn deletes_run_in_order() {
        let driver = driver();
        driver.run_batch(creates(3), Budget::Unlimited);
        let outcome = driver.run_batch(
            vec![
                BulkOperation::Delete("doc0000".into()),
                BulkOperation::Delete("missing".into()),
                BulkOperation::Delete("doc0002".into()),
            ],
            Budget::Unlimited,
        );
        assert_eq!(outcome.applied(), 1);
        assert_eq!(outcome.remaining().len(), 2);
        assert_eq!(driver.pipeline.store().ids(), vec!["doc0001", "doc0002"]);
    }

    #[test]
    fn elapsed_budget_of_zero_applies_nothing() {
        let outcome = driver().run_batch(creates(2), Budget::Elapsed(Duration::ZERO));
        assert!(matches!(outcome.status(), BatchStatus::BudgetExhausted));
        assert_eq!(outcome.applied(), 0);
    }

    #[test]
    fn delete_matching_reports_more_remaining() {
        let driver = driver();
        driver.run_batch(creates(10), Budget::Unlimited);
        driver.pipeline.store().create(doc! { id: "other", name: "keep" }).unwrap();
        let filter = field("name").starts_with("Bulk inserted doc ");

        let first = driver.delete_matching(&filter, Budget::Operations(4)).unwrap();
        assert_eq!(first.deleted(), 4);
        assert!(first.more_remaining());

        let mut total = first.deleted();
        loop {
            let outcome = driver.delete_matching(&filter, Budget::Operations(4)).unwrap();
            total += outcome.deleted();
            if !outcome.more_remaining() {
                break;
            }
        }
        assert_eq!(total, 10);
        assert_eq!(driver.pipeline.store().ids(), vec!["other"]);
    }

    #[test]
    fn delete_matching_across_small_pages() {
        let driver = BulkOperationDriver::new(TriggerPipeline::new(DocumentStore::new("bulk")), 3);
        driver.run_batch(creates(7), Budget::Unlimited);
        let outcome = driver
            .delete_matching(&field("name").starts_with("Bulk"), Budget::Unlimited)
            .unwrap();
        assert_eq!(outcome.deleted(), 7);
        assert!(!outcome.more_remaining());
    }
}
