use docket::collection::{Collection, Document, RequestOptions};
use docket::common::Value;
use docket::doc;
use docket::errors::{DocketError, DocketResult, ErrorKind};
use docket::Docket;
use std::backtrace::Backtrace;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test with retry logic and error handling.
///
/// `before` builds a fresh context, `after` tears it down; `after` also runs
/// when the test itself fails.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> DocketResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> DocketResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> DocketResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx.clone()) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx.clone());
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        let failure = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_backtrace = Some(bt);
                e
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_backtrace = Some(Backtrace::capture().to_string());
                format!("Panic: {}", err_msg)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", failure);
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(failure);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

#[derive(Clone)]
pub struct TestContext {
    db: Docket,
    collection_name: String,
}

impl TestContext {
    pub fn new(db: Docket, collection_name: String) -> Self {
        Self {
            db,
            collection_name,
        }
    }

    pub fn db(&self) -> Docket {
        self.db.clone()
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// The context's own collection, created on first use.
    pub fn collection(&self) -> DocketResult<Collection> {
        self.db.collection(&self.collection_name)
    }
}

pub fn random_collection_name() -> String {
    format!("coll-{}", uuid::Uuid::new_v4())
}

pub fn create_test_context() -> DocketResult<TestContext> {
    let db = Docket::builder().open()?;
    Ok(TestContext::new(db, random_collection_name()))
}

/// A context whose collections use small pages and caps, so paging paths
/// are exercised with few documents.
pub fn create_small_page_context() -> DocketResult<TestContext> {
    let db = Docket::builder()
        .page_size(7)
        .max_count_per_invocation(25)
        .open()?;
    Ok(TestContext::new(db, random_collection_name()))
}

pub fn cleanup(ctx: TestContext) -> DocketResult<()> {
    let db = ctx.db();
    if db.has_collection(ctx.collection_name())? {
        db.drop_collection(ctx.collection_name())?;
    }
    db.close()
}

/// Inserts `count` documents named `Bulk inserted doc <i>`, untriggered.
pub fn insert_test_documents(collection: &Collection, count: usize) -> DocketResult<Vec<String>> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let created = collection.store().create(doc! {
            name: (format!("Bulk inserted doc {}", i)),
            seq: i,
        })?;
        match created.id() {
            Some(id) => ids.push(id.to_string()),
            None => {
                return Err(DocketError::new(
                    "Created document has no id",
                    ErrorKind::InternalError,
                ))
            }
        }
    }
    Ok(ids)
}

pub fn andersen_family() -> Document {
    doc! {
        id: "AndersenFamily",
        lastName: "Andersen",
        parents: [
            { firstName: "Thomas" },
            { firstName: "Mary Kay" },
        ],
        address: {
            state: "WA",
            county: "King",
            city: "Seattle",
            countryRegionName: "United States",
        },
        isRegistered: true,
    }
}

pub fn wakefield_family() -> Document {
    doc! {
        id: "WakefieldFamily",
        parents: [
            { familyName: "Wakefield", givenName: "Robin" },
            { familyName: "Miller", givenName: "Ben" },
        ],
        address: {
            state: "NY",
            county: "Manhattan",
            city: "NY",
            countryRegionName: "Canada",
        },
        isRegistered: false,
    }
}

pub fn no_triggers() -> RequestOptions {
    RequestOptions::new()
}

/// Reads an integer field of a procedure response.
pub fn response_i64(response: &Value, field: &str) -> i64 {
    response
        .as_document()
        .and_then(|doc| doc.get(field))
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("response {:?} has no integer {}", response, field))
}
