use docket::collection::RequestOptions;
use docket::common::{RetryPolicy, SP_HELLO_WORLD};
use docket::doc;
use docket::errors::ErrorKind;
use docket::Docket;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_retry::retry;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
#[retry]
fn test_retry_policy_rides_out_throttling() {
    let db = Docket::builder()
        .request_rate_limit(3)
        .throttle_window(Duration::from_millis(100))
        .open()
        .unwrap();
    let collection = db.collection("throttled").unwrap();
    let policy = RetryPolicy::new(10);

    for i in 0..10 {
        policy
            .execute(|| {
                collection.create_document(doc! { id: (format!("t{}", i)) }, &RequestOptions::new())
            })
            .unwrap();
    }
    assert_eq!(collection.store().size(), 10);
}

#[test]
fn test_throttled_error_carries_delay() {
    let db = Docket::builder()
        .request_rate_limit(1)
        .throttle_window(Duration::from_secs(30))
        .open()
        .unwrap();
    let collection = db.collection("throttled").unwrap();
    collection.execute_procedure(SP_HELLO_WORLD, &[]).unwrap();

    let err = collection.execute_procedure(SP_HELLO_WORLD, &[]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Throttled(_)));
    let delay = err.retry_after().unwrap();
    assert!(delay > Duration::from_secs(25) && delay <= Duration::from_secs(30));
}

#[test]
fn test_retry_gives_up_after_max_attempts() {
    let db = Docket::builder()
        .request_rate_limit(1)
        .throttle_window(Duration::from_secs(30))
        .open()
        .unwrap();
    let collection = db.collection("throttled").unwrap();
    collection.read_document("x").unwrap_err();

    let slept = Arc::new(Mutex::new(Vec::new()));
    let recorder = slept.clone();
    let policy = RetryPolicy::new(4).with_sleeper(move |delay| {
        if let Ok(mut delays) = recorder.lock() {
            delays.push(delay);
        }
    });

    let err = policy
        .execute(|| collection.execute_procedure(SP_HELLO_WORLD, &[]))
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Throttled(_)));
    assert_eq!(slept.lock().map(|d| d.len()).unwrap_or_default(), 3);
}

#[test]
fn test_non_throttling_errors_are_not_retried() {
    let db = Docket::builder().open().unwrap();
    let collection = db.collection("plain").unwrap();
    let attempts = Arc::new(Mutex::new(0));
    let counter = attempts.clone();
    let policy = RetryPolicy::new(5).with_sleeper(|_| {});

    let err = policy
        .execute(|| {
            if let Ok(mut n) = counter.lock() {
                *n += 1;
            }
            collection.read_document("missing")
        })
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::NotFound);
    assert_eq!(*attempts.lock().unwrap(), 1);
}
