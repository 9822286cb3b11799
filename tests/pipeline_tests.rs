//! Ingestion pipeline integration tests
//!
//! Runs the pipeline against an in-memory store with scripted recognizer
//! and market fakes, covering merge/replace semantics, enrichment, failure
//! containment, cancellation and the spreadsheet-driven jobs.

mod helpers;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use helpers::{test_state, test_state_with, FakeMarket, FakeRecognizer, PNG_BYTES};
use stashscan::db::items::{self, NewItem};
use stashscan::models::{ImageUpload, JobKind, JobStatus, RecognizedItem};
use stashscan::services::pipeline::IngestMode;
use stashscan::services::spreadsheet::{parse_csv, HEADERS};
use stashscan::AppState;

const SESSION: &str = "pipeline-session";

fn image(file_name: &str) -> ImageUpload {
    ImageUpload {
        file_name: file_name.to_string(),
        bytes: PNG_BYTES.to_vec(),
    }
}

fn sheet(rows: &[&str]) -> Vec<u8> {
    let mut text = HEADERS.join(",");
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.into_bytes()
}

async fn run_analysis(
    state: &AppState,
    recognizer: FakeRecognizer,
    images: Vec<ImageUpload>,
    mode: IngestMode,
    seed: Option<Vec<u8>>,
) -> uuid::Uuid {
    let job = state.jobs.create(JobKind::ImageAnalysis, images.len()).await;
    let seed_rows = seed.map(|data| parse_csv(&data).unwrap());
    state
        .pipeline()
        .run_image_batch(
            job.id,
            SESSION,
            Arc::new(recognizer),
            images,
            mode,
            seed_rows,
            CancellationToken::new(),
        )
        .await;
    job.id
}

#[tokio::test]
async fn merge_adds_recognized_quantity_to_existing_row() {
    let state = test_state().await;
    items::create(&state.db, SESSION, NewItem::named("Morphic Prism").with_quantity(2))
        .await
        .unwrap();

    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("Morphic Prism", 3)]);
    let job_id = run_analysis(&state, recognizer, vec![image("one.png")], IngestMode::Merge, None).await;

    let job = state.jobs.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].quantity, 5);
    assert!(job.logs.iter().any(|l| l.contains("Merged 'Morphic Prism'")));
}

#[tokio::test]
async fn replace_overwrites_existing_quantity() {
    let state = test_state().await;
    items::create(&state.db, SESSION, NewItem::named("Morphic Prism").with_quantity(2))
        .await
        .unwrap();

    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("Morphic Prism", 3)]);
    run_analysis(&state, recognizer, vec![image("one.png")], IngestMode::Replace, None).await;

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list[0].quantity, 3);
}

#[tokio::test]
async fn merge_matches_existing_rows_by_normalized_name() {
    let state = test_state().await;
    items::create(&state.db, SESSION, NewItem::named("Morphic Prism").with_quantity(1))
        .await
        .unwrap();

    // The recognizer sees a case and spacing variant of the stored name
    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("MORPHIC   prism", 2)]);
    run_analysis(&state, recognizer, vec![image("one.png")], IngestMode::Merge, None).await;

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 1, "variant spelling must not create a second row");
    assert_eq!(list[0].quantity, 3);
    assert_eq!(list[0].name, "Morphic Prism");
}

#[tokio::test]
async fn quantities_aggregate_across_images_before_reconciling() {
    let state = test_state().await;

    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("Spark", 2)])
        .with_reply("two.png", vec![RecognizedItem::new("Spark", 3)]);
    let job_id = run_analysis(
        &state,
        recognizer,
        vec![image("one.png"), image("two.png")],
        IngestMode::Merge,
        None,
    )
    .await;

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].quantity, 5);

    // One aggregated name, both images counted
    let job = state.jobs.get(job_id).await.unwrap();
    assert_eq!(job.processed_images, 2);
    assert_eq!(job.total_items, 1);
}

#[tokio::test]
async fn new_items_are_enriched_from_the_market() {
    let market = FakeMarket::new().with_item("m-1", "Static Relay", &[10.0, 20.0], &[5.0]);
    let state = test_state_with(market, None).await;

    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("static relay", 2)]);
    let job_id = run_analysis(&state, recognizer, vec![image("one.png")], IngestMode::Merge, None).await;

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 1);
    let item = &list[0];
    assert_eq!(item.quantity, 2);
    assert_eq!(item.market_id.as_deref(), Some("m-1"));
    assert_eq!(item.market_url.as_deref(), Some("https://market.test/items/m-1"));
    assert_eq!(item.sell_prices, vec![10.0, 20.0]);
    assert_eq!(item.buy_prices, vec![5.0]);
    assert_eq!(item.avg_sell, 15.0);
    assert_eq!(item.avg_buy, 5.0);

    let job = state.jobs.get(job_id).await.unwrap();
    assert!(job.logs.iter().any(|l| l.contains("with market data")));
}

#[tokio::test]
async fn unknown_items_are_stored_without_market_data() {
    let state = test_state().await;

    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("Mystery Box", 1)]);
    let job_id = run_analysis(&state, recognizer, vec![image("one.png")], IngestMode::Merge, None).await;

    let job = state.jobs.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "a catalog miss is not a failure");

    let list = items::list(&state.db, SESSION).await.unwrap();
    let item = &list[0];
    assert!(item.market_id.is_none());
    assert!(item.market_url.is_none());
    assert!(item.sell_prices.is_empty());
    assert_eq!(item.avg_sell, 0.0);
    assert!(job.logs.iter().any(|l| l.contains("no market match")));
}

#[tokio::test]
async fn one_failing_image_does_not_sink_the_batch() {
    let state = test_state().await;

    let recognizer = FakeRecognizer::new()
        .failing_on("bad.png")
        .with_reply("good.png", vec![RecognizedItem::new("Spark", 2)]);
    let job_id = run_analysis(
        &state,
        recognizer,
        vec![image("bad.png"), image("good.png")],
        IngestMode::Merge,
        None,
    )
    .await;

    let job = state.jobs.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_images, 2, "failed image still advances the counter");
    assert!(job.logs.iter().any(|l| l.contains("recognition failed")));

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "Spark");
}

#[tokio::test]
async fn fresh_with_seed_clears_seeds_then_merges() {
    let state = test_state().await;
    items::create(&state.db, SESSION, NewItem::named("Leftover Junk"))
        .await
        .unwrap();

    let seed = sheet(&["Morphic Prism,2,not found,none,none,0.00,0.00,n/a"]);
    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("Morphic Prism", 3)]);
    let job_id = run_analysis(
        &state,
        recognizer,
        vec![image("one.png")],
        IngestMode::FreshWithSeed,
        Some(seed),
    )
    .await;

    let job = state.jobs.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.logs.iter().any(|l| l.contains("Cleared session")));
    assert!(job.logs.iter().any(|l| l.contains("Seeded 1 row(s)")));

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 1, "pre-existing rows are gone, seed remains");
    assert_eq!(list[0].name, "Morphic Prism");
    assert_eq!(list[0].quantity, 5, "seeded 2 plus recognized 3");
}

#[tokio::test]
async fn counters_settle_at_their_totals() {
    let state = test_state().await;

    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![
            RecognizedItem::new("Spark", 1),
            RecognizedItem::new("Relay", 2),
        ])
        .with_reply("two.png", vec![RecognizedItem::new("Prism", 1)]);
    let job_id = run_analysis(
        &state,
        recognizer,
        vec![image("one.png"), image("two.png")],
        IngestMode::Merge,
        None,
    )
    .await;

    let job = state.jobs.get(job_id).await.unwrap();
    assert_eq!(job.total_images, 2);
    assert_eq!(job.processed_images, job.total_images);
    assert_eq!(job.total_items, 3);
    assert_eq!(job.processed_items, job.total_items);
    assert!(job.ended_at.is_some());
}

#[tokio::test]
async fn pre_cancelled_token_cancels_before_any_work() {
    let state = test_state().await;

    let recognizer = FakeRecognizer::new()
        .with_reply("one.png", vec![RecognizedItem::new("Spark", 1)]);
    let job = state.jobs.create(JobKind::ImageAnalysis, 1).await;
    let token = CancellationToken::new();
    token.cancel();

    state
        .pipeline()
        .run_image_batch(
            job.id,
            SESSION,
            Arc::new(recognizer),
            vec![image("one.png")],
            IngestMode::Merge,
            None,
            token,
        )
        .await;

    let job = state.jobs.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.logs.iter().any(|l| l.contains("Cancelled by request")));
    assert!(items::list(&state.db, SESSION).await.unwrap().is_empty());
}

#[tokio::test]
async fn spreadsheet_load_replaces_the_session_verbatim() {
    let state = test_state().await;
    items::create(&state.db, SESSION, NewItem::named("Old Row"))
        .await
        .unwrap();

    let rows = parse_csv(&sheet(&[
        "Static Relay,4,m-7,\"10.00, 12.50\",8.00,11.25,8.00,https://market.test/items/m-7",
        "Odd Shard,1,not found,none,none,0.00,0.00,n/a",
    ]))
    .unwrap();

    let job = state.jobs.create(JobKind::SpreadsheetLoad, 0).await;
    state
        .pipeline()
        .run_spreadsheet_load(job.id, SESSION, rows, CancellationToken::new())
        .await;

    let job = state.jobs.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_items, 2);
    assert_eq!(job.processed_items, 2);

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "Static Relay");
    // Prices come from the sheet, not from any market call
    assert_eq!(list[0].sell_prices, vec![10.0, 12.5]);
    assert_eq!(list[0].market_id.as_deref(), Some("m-7"));
    assert_eq!(list[1].name, "Odd Shard");
    assert!(list[1].market_id.is_none());
}

#[tokio::test]
async fn price_refresh_rebuilds_with_live_lookups() {
    let market = FakeMarket::new().with_item("m-9", "Static Relay", &[30.0], &[25.0]);
    let state = test_state_with(market, None).await;

    // The sheet carries stale prices and an uncatalogued item
    let rows = parse_csv(&sheet(&[
        "Static Relay,4,m-9,1.00,1.00,1.00,1.00,https://stale.example",
        "Mystery Box,2,not found,none,none,0.00,0.00,n/a",
    ]))
    .unwrap();

    let job = state.jobs.create(JobKind::PriceRefresh, 0).await;
    state
        .pipeline()
        .run_price_refresh(job.id, SESSION, rows, CancellationToken::new())
        .await;

    let job = state.jobs.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 2);

    let relay = &list[0];
    assert_eq!(relay.quantity, 4, "quantity comes from the sheet");
    assert_eq!(relay.sell_prices, vec![30.0], "prices come from the market");
    assert_eq!(relay.avg_buy, 25.0);
    assert_eq!(relay.market_url.as_deref(), Some("https://market.test/items/m-9"));

    let mystery = &list[1];
    assert_eq!(mystery.quantity, 2);
    assert!(mystery.sell_prices.is_empty());
    assert!(job.logs.iter().any(|l| l.contains("not in catalog")));
}

#[tokio::test]
async fn split_caches_both_halves_and_leaves_the_store_alone() {
    let state = test_state().await;
    items::create(&state.db, SESSION, NewItem::named("Untouched"))
        .await
        .unwrap();

    let data = sheet(&[
        "Tiny,3,m,none,none,0,0,n",
        "Huge,12,m,none,none,0,0,n",
    ]);
    let job = state.jobs.create(JobKind::SpreadsheetSplit, 0).await;
    state.pipeline().run_split(job.id, SESSION, data).await;

    let job = state.jobs.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let cache = state.split_cache.read().await;
    let outputs = cache.get(SESSION).expect("split outputs cached");
    assert_eq!(outputs.low_rows, 1);
    assert_eq!(outputs.high_rows, 1);
    assert!(outputs.low.contains("Tiny"));
    assert!(outputs.high.contains("Huge"));
    drop(cache);

    // The inventory itself is untouched
    let list = items::list(&state.db, SESSION).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "Untouched");
}

#[tokio::test]
async fn storage_failure_fails_the_job_with_the_reason_logged() {
    let state = test_state().await;
    let rows = parse_csv(&sheet(&["Spark,1,not found,none,none,0.00,0.00,n/a"])).unwrap();

    // Tear the database down underneath the job
    state.db.close().await;

    let job = state.jobs.create(JobKind::SpreadsheetLoad, 0).await;
    state
        .pipeline()
        .run_spreadsheet_load(job.id, SESSION, rows, CancellationToken::new())
        .await;

    let job = state.jobs.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.logs.iter().any(|l| l.contains("Job failed")));
}
