use docket::collection::RequestOptions;
use docket::common::{Value, METADATA_ID, METADATA_LAST_ID, TRG_ENSURE_UNIQUE_ID, TRG_UPDATE_METADATA};
use docket::doc;
use docket::errors::{DocketError, ErrorKind};
use docket::trigger::{PipelineState, Trigger, TriggerOperation, TriggerType};
use docket::Docket;
use docket_int_test::test_util::{cleanup, create_test_context, no_triggers, run_test};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn dedup() -> RequestOptions {
    RequestOptions::new().pre_trigger_include(vec![TRG_ENSURE_UNIQUE_ID])
}

fn metadata() -> RequestOptions {
    RequestOptions::new().post_trigger_include(vec![TRG_UPDATE_METADATA])
}

#[test]
fn test_pre_trigger_dedups_ids() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            let a = collection.create_document(doc! { id: "DUPEJ", name: "A" }, &dedup())?;
            let b = collection.create_document(doc! { id: "DUPEJ", name: "B" }, &dedup())?;

            assert_eq!(a.document().id(), Some("DUPEJ"));
            assert_eq!(a.state(), PipelineState::Done);
            let suffixed = b.document().id().unwrap_or_default();
            assert_eq!(suffixed.len(), "DUPEJ".len() + 5);
            assert!(suffixed.starts_with("DUPEJ"));
            assert!(suffixed["DUPEJ".len()..].chars().all(|c| c.is_ascii_digit()));
            assert_eq!(
                collection.read_document(suffixed)?.get("name"),
                Some(&Value::from("B"))
            );
            assert_eq!(collection.store().size(), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_post_trigger_tracks_last_id() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            let d1 = collection.create_document(doc! { id: "D1" }, &metadata())?;
            let d2 = collection.create_document(doc! { id: "D2" }, &metadata())?;
            assert_eq!(d1.state(), PipelineState::Done);

            let meta = collection.read_document(METADATA_ID)?;
            assert_eq!(
                meta.get(METADATA_LAST_ID).and_then(|v| v.as_str()),
                d2.document().id()
            );
            let metadata_docs = collection
                .store()
                .ids()
                .into_iter()
                .filter(|id| id == METADATA_ID)
                .count();
            assert_eq!(metadata_docs, 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_both_builtins_together() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            let options = RequestOptions::new()
                .pre_trigger_include(vec![TRG_ENSURE_UNIQUE_ID])
                .post_trigger_include(vec![TRG_UPDATE_METADATA]);
            collection.create_document(doc! { id: "X" }, &options)?;
            let second = collection.create_document(doc! { id: "X" }, &options)?;

            let meta = collection.read_document(METADATA_ID)?;
            assert_eq!(
                meta.get(METADATA_LAST_ID).and_then(|v| v.as_str()),
                second.document().id()
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_triggers_only_run_when_requested() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            collection.create_document(doc! { id: "plain" }, &no_triggers())?;
            let err = collection
                .create_document(doc! { id: "plain" }, &no_triggers())
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::DuplicateId);
            assert!(collection.store().get(METADATA_ID).is_none());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unknown_or_mistyped_trigger() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            let unknown = RequestOptions::new().pre_trigger_include(vec!["trgMissing"]);
            let err = collection
                .create_document(doc! { id: "a" }, &unknown)
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TriggerNotFound);

            // a post trigger named as a pre trigger
            let mistyped = RequestOptions::new().pre_trigger_include(vec![TRG_UPDATE_METADATA]);
            let err = collection
                .create_document(doc! { id: "a" }, &mistyped)
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TriggerNotFound);
            assert!(collection.store().is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_rejecting_pre_trigger_leaves_store_untouched() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            collection.register_trigger(Trigger::from_fn(
                "trgRequireName",
                TriggerType::Pre,
                TriggerOperation::All,
                |ctx| match ctx.request_body().and_then(|d| d.get("name")) {
                    Some(_) => Ok(()),
                    None => Err(DocketError::new("name is required", ErrorKind::ValidationError)),
                },
            ))?;
            let options = RequestOptions::new().pre_trigger_include(vec!["trgRequireName"]);

            let err = collection
                .create_document(doc! { id: "nameless" }, &options)
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TriggerRejected);
            assert_eq!(
                err.cause().map(|c| c.kind().clone()),
                Some(ErrorKind::ValidationError)
            );
            assert!(collection.store().is_empty());

            collection.create_document(doc! { id: "named", name: "n" }, &options)?;
            let err = collection
                .replace_document("named", doc! { other: 1 }, &options)
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TriggerRejected);
            assert_eq!(
                collection.read_document("named")?.get("name"),
                Some(&Value::from("n"))
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failing_post_trigger_keeps_write() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            let later_runs = Arc::new(AtomicUsize::new(0));
            collection.register_trigger(Trigger::from_fn(
                "trgFail",
                TriggerType::Post,
                TriggerOperation::Create,
                |_| Err(DocketError::new("audit sink down", ErrorKind::InternalError)),
            ))?;
            let counter = later_runs.clone();
            collection.register_trigger(Trigger::from_fn(
                "trgCount",
                TriggerType::Post,
                TriggerOperation::Create,
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            ))?;

            let options = RequestOptions::new().post_trigger_include(vec!["trgCount", "trgFail"]);
            let err = collection
                .create_document(doc! { id: "kept" }, &options)
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::PostTriggerFailed);
            assert!(collection.store().contains("kept"));
            // registration order, not request order: trgFail runs first
            assert_eq!(later_runs.load(Ordering::SeqCst), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_triggers_see_deleted_document() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            let db = ctx.db();
            let archive = db.collection(&format!("{}-archive", ctx.collection_name()))?;
            let sink = archive.store().clone();
            collection.register_trigger(Trigger::from_fn(
                "trgArchive",
                TriggerType::Post,
                TriggerOperation::Delete,
                move |ctx| match ctx.response_body() {
                    Some(deleted) => sink.create(deleted.clone()).map(|_| ()),
                    None => Ok(()),
                },
            ))?;

            collection.create_document(doc! { id: "gone", v: 1 }, &no_triggers())?;
            let options = RequestOptions::all_triggers();
            collection.delete_document("gone", &options)?;
            assert!(!collection.store().contains("gone"));
            assert_eq!(
                archive.read_document("gone")?.get("v"),
                Some(&Value::from(1))
            );

            let err = collection.delete_document("gone", &options).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_trigger_registration_rules() {
    let db = Docket::builder().register_builtins(false).open().unwrap();
    let collection = db.collection("rules").unwrap();
    assert!(collection.triggers().is_empty());

    let noop = || Trigger::from_fn("trgNoop", TriggerType::Pre, TriggerOperation::All, |_| Ok(()));
    collection.register_trigger(noop()).unwrap();
    assert_eq!(
        collection.register_trigger(noop()).unwrap_err().kind(),
        &ErrorKind::InvalidOperation
    );
    collection.deregister_trigger("trgNoop").unwrap();
    assert_eq!(
        collection.deregister_trigger("trgNoop").unwrap_err().kind(),
        &ErrorKind::TriggerNotFound
    );
}
