use docket::collection::{ContinuationToken, FeedOptions};
use docket::common::{Value, SP_SELECT_COUNT};
use docket::doc;
use docket::errors::ErrorKind;
use docket::filter::{all, field};
use docket::procedure::CountAggregator;
use docket_int_test::test_util::{
    cleanup, create_small_page_context, create_test_context, insert_test_documents, no_triggers,
    response_i64, run_test,
};
use std::collections::HashSet;
use std::str::FromStr;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_query_pages_cover_every_match_once() {
    run_test(
        create_small_page_context,
        |ctx| {
            let collection = ctx.collection()?;
            let ids = insert_test_documents(&collection, 50)?;

            let mut seen = HashSet::new();
            let mut pages = 0;
            let mut token: Option<ContinuationToken> = None;
            loop {
                let page = collection.query(&all(), &FeedOptions::new().continuation(token))?;
                pages += 1;
                assert!(page.len() <= 7);
                for document in page.documents() {
                    assert!(seen.insert(document.id().unwrap_or_default().to_string()));
                }
                token = page.continuation().cloned();
                if token.is_none() {
                    break;
                }
            }
            assert_eq!(pages, 8);
            assert_eq!(seen, ids.into_iter().collect::<HashSet<_>>());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_token_survives_string_round_trip() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            insert_test_documents(&collection, 10)?;

            let first = collection.query(&all(), &FeedOptions::new().page_size(4))?;
            let wire = first.continuation().map(|t| t.to_string()).unwrap_or_default();
            let token = ContinuationToken::from_str(&wire)?;

            let second = collection.query(
                &all(),
                &FeedOptions::new().page_size(4).continuation(Some(token)),
            )?;
            assert_eq!(
                second.documents()[0].get("seq"),
                Some(&Value::from(4))
            );

            let err = ContinuationToken::from_str("garbage").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::EncodingError);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_resume_after_concurrent_writes() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            insert_test_documents(&collection, 6)?;

            let first = collection.query(&all(), &FeedOptions::new().page_size(3))?;
            let token = first.continuation().cloned();

            collection.create_document(doc! { id: "late", name: "late" }, &no_triggers())?;
            collection.delete_document(first.documents()[0].id().unwrap_or_default(), &no_triggers())?;

            let rest = collection.query(&all(), &FeedOptions::new().page_size(10).continuation(token))?;
            let names: Vec<String> = rest
                .documents()
                .iter()
                .filter_map(|d| d.get("name").map(|v| v.to_string()))
                .collect();
            assert_eq!(names.len(), 4);
            assert_eq!(names.last().map(String::as_str), Some("late"));
            assert!(!rest.has_more());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_chained_count_sums_to_total() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.collection()?;
            insert_test_documents(&collection, 1234)?;

            for max in [1usize, 100, 600, 1234, 5000] {
                let aggregator = CountAggregator::new(collection.store().clone(), 200);
                let mut total = 0;
                let mut calls = 0;
                let mut token: Option<ContinuationToken> = None;
                loop {
                    let result = aggregator.count(&all(), max, token.as_ref())?;
                    total += result.count();
                    calls += 1;
                    token = result.continuation().cloned();
                    if token.is_none() {
                        break;
                    }
                }
                assert_eq!(total, 1234);
                assert_eq!(calls, 1234usize.div_ceil(max));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_select_count_procedure() {
    run_test(
        create_small_page_context,
        |ctx| {
            let collection = ctx.collection()?;
            insert_test_documents(&collection, 60)?;
            collection.store().create(doc! { id: "odd", name: "other" })?;

            let filter = Value::Document(doc! {
                field: "name",
                op: "startsWith",
                value: "Bulk inserted doc",
            });
            let mut total = 0;
            let mut calls = 0;
            let mut token = Value::Null;
            loop {
                let response = collection.execute_procedure(SP_SELECT_COUNT, &[filter.clone(), token])?;
                total += response_i64(&response, "count");
                calls += 1;
                token = response
                    .as_document()
                    .and_then(|d| d.get("continuationToken"))
                    .cloned()
                    .unwrap_or_default();
                if token.is_null() {
                    break;
                }
            }
            assert_eq!(total, 60);
            assert_eq!(calls, 3);
            assert_eq!(collection.count_documents(&all())?, 61);
            assert_eq!(
                collection.count_documents(&field("name").eq("other"))?,
                1
            );
            Ok(())
        },
        cleanup,
    )
}
