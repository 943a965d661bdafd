use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use fp_bundle::{BundleError, DataItem, PaginationCursor};
use fp_common::{AbortOnDrop, ServiceContext};
use rstest::rstest;
use tokio::sync::mpsc;

use super::archive_fake::{item, ArchiveFake, Call, RpcFake, POOL};
use crate::{
    collect, resolve_resume_cursor, BlockSource, CollectorConfig, CollectorExit, CollectorOutcome, SyncBounds,
    SyncError,
};

fn bundles(archive: &ArchiveFake) -> BlockSource {
    BlockSource::Bundles { archive: Arc::new(archive.clone()), pool: POOL }
}

fn rpc(rpc: &RpcFake) -> BlockSource {
    BlockSource::Rpc { rpc: Arc::new(rpc.clone()), request_delay: Duration::from_millis(200) }
}

fn heights(items: &[DataItem]) -> Vec<u64> {
    items.iter().map(|item| item.height().unwrap()).collect()
}

/// Runs a collector to completion with enough channel capacity for every item.
async fn collect_all(
    source: BlockSource,
    bounds: SyncBounds,
    config: CollectorConfig,
) -> (CollectorOutcome, Vec<DataItem>, Vec<SyncError>) {
    let (item_sender, mut item_receiver) = mpsc::channel(10_000);
    let (err_sender, mut err_receiver) = mpsc::channel(1);
    let outcome = collect(item_sender, err_sender, source, bounds, config, ServiceContext::new()).await;

    let mut items = vec![];
    while let Some(item) = item_receiver.recv().await {
        items.push(item);
    }
    let mut errors = vec![];
    while let Some(err) = err_receiver.recv().await {
        errors.push(err);
    }
    (outcome, items, errors)
}

#[rstest]
#[case::from_genesis(0)]
#[case::mid_bundle(15)]
#[case::bundle_start(20)]
#[case::last_height(49)]
#[tokio::test(start_paused = true)]
async fn bundles_contiguous_until_tip(#[case] start: u64) {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19), (20, 29), (30, 39), (40, 49)]);

    let (outcome, items, errors) = collect_all(
        bundles(&archive),
        SyncBounds::new(start, 0, true),
        CollectorConfig::default().page_limit(2),
    )
    .await;

    assert_eq!(heights(&items), (start..50).collect::<Vec<_>>());
    assert_eq!(items[0], item(start));
    assert!(errors.is_empty());
    assert_eq!(outcome, CollectorOutcome { exit: CollectorExit::TipReached, continuation_height: 50 });
}

#[rstest]
#[case::mid_bundle(27)]
#[case::bundle_end(29)]
#[case::bundle_start(20)]
#[tokio::test(start_paused = true)]
async fn bundles_stop_exactly_at_target(#[case] target: u64) {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19), (20, 29), (30, 39)]);

    let (outcome, items, errors) =
        collect_all(bundles(&archive), SyncBounds::new(3, target, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), (3..=target).collect::<Vec<_>>());
    assert!(errors.is_empty());
    assert_eq!(outcome, CollectorOutcome { exit: CollectorExit::TargetReached, continuation_height: target + 1 });
    // The bundle after the target is never downloaded.
    assert_eq!(archive.payload_calls(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn target_is_ignored_without_must_exit() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19)]);
    let (item_sender, mut item_receiver) = mpsc::channel(100);
    let (err_sender, _err_receiver) = mpsc::channel(1);
    let ctx = ServiceContext::new();

    let task = AbortOnDrop::spawn(collect(
        item_sender,
        err_sender,
        bundles(&archive),
        SyncBounds::new(0, 5, false),
        CollectorConfig::default(),
        ctx.clone(),
    ));

    for height in 0..20 {
        assert_eq!(item_receiver.recv().await.unwrap().height().unwrap(), height);
    }
    ctx.cancel_local();
    assert_eq!(task.await.unwrap(), CollectorOutcome { exit: CollectorExit::Cancelled, continuation_height: 20 });
}

#[tokio::test(start_paused = true)]
async fn continuation_past_target_exits_immediately() {
    let archive = ArchiveFake::with_ranges(&[(0, 9)]);

    let (outcome, items, _) =
        collect_all(bundles(&archive), SyncBounds::new(8, 7, true), CollectorConfig::default()).await;

    assert!(items.is_empty());
    assert_eq!(outcome.exit, CollectorExit::TargetReached);
    assert!(archive.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rpc_stops_at_target() {
    let node = RpcFake::new(103);

    let (outcome, items, errors) =
        collect_all(rpc(&node), SyncBounds::new(100, 102, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), vec![100, 101, 102]);
    assert_eq!(items[0].key, "100");
    assert!(errors.is_empty());
    assert_eq!(outcome, CollectorOutcome { exit: CollectorExit::TargetReached, continuation_height: 103 });
    assert_eq!(node.calls(), vec![Call::Block(100), Call::Block(101), Call::Block(102)]);
}

#[tokio::test(start_paused = true)]
async fn rpc_requests_are_paced() {
    let node = RpcFake::new(10);
    let start = tokio::time::Instant::now();

    collect_all(rpc(&node), SyncBounds::new(0, 4, true), CollectorConfig::default()).await;

    // One pause after each of the first four blocks, none after the target.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(800) && elapsed < Duration::from_millis(810), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn bundle_pages_are_paced() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19), (20, 29), (30, 39)]);
    let start = tokio::time::Instant::now();

    let (outcome, items, errors) = collect_all(
        bundles(&archive),
        SyncBounds::new(0, 0, true),
        CollectorConfig::default().page_limit(1).inter_page_delay(Duration::from_secs(7)),
    )
    .await;

    // One pause between each of the four pages, none after the last one.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(21) && elapsed < Duration::from_millis(21_100), "{elapsed:?}");
    assert_eq!(items.len(), 40);
    assert!(errors.is_empty());
    assert_eq!(outcome, CollectorOutcome { exit: CollectorExit::TipReached, continuation_height: 40 });
    assert_eq!(archive.page_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn empty_pages_are_not_paced() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19)]);
    archive.empty_pages(3);
    let start = tokio::time::Instant::now();

    let (outcome, items, _) = collect_all(
        bundles(&archive),
        SyncBounds::new(0, 0, true),
        CollectorConfig::default().page_limit(10).inter_page_delay(Duration::from_secs(7)),
    )
    .await;

    assert!(start.elapsed() < Duration::from_secs(7), "{:?}", start.elapsed());
    assert_eq!(heights(&items), (0..20).collect::<Vec<_>>());
    assert_eq!(outcome.exit, CollectorExit::TipReached);
    assert_eq!(archive.page_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn rpc_failure_is_reported_once() {
    let node = RpcFake::new(5);

    let (outcome, items, errors) =
        collect_all(rpc(&node), SyncBounds::new(3, 0, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), vec![3, 4, 5]);
    assert_eq!(outcome, CollectorOutcome { exit: CollectorExit::Failed, continuation_height: 6 });
    assert_eq!(errors.len(), 1);
    assert_matches!(errors[0], SyncError::RpcBlock { height: 6, .. });
}

#[tokio::test]
async fn resume_cursor_for_first_bundle_is_start() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19)]);

    let cursor = resolve_resume_cursor(&archive, POOL, 5).await.unwrap();

    assert!(cursor.is_start());
    assert_eq!(archive.calls(), vec![Call::Lookup(5)]);
}

#[tokio::test]
async fn resume_cursor_comes_from_previous_bundle_listing() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19), (20, 29), (30, 39)]);

    let cursor = resolve_resume_cursor(&archive, POOL, 25).await.unwrap();

    assert_eq!(cursor, PaginationCursor::from("bundle-2"));
    assert_eq!(
        archive.calls(),
        vec![Call::Lookup(25), Call::Page { limit: 1, offset: Some(1), cursor: String::new() }]
    );
}

#[tokio::test]
async fn resume_fails_without_covering_bundle() {
    let archive = ArchiveFake::with_ranges(&[(0, 9)]);

    assert_matches!(
        resolve_resume_cursor(&archive, POOL, 10).await,
        Err(SyncError::BundleLookup { height: 10, .. })
    );
}

#[tokio::test(start_paused = true)]
async fn resumed_collection_starts_at_covering_bundle() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19), (20, 29), (30, 39)]);

    let (_, items, _) =
        collect_all(bundles(&archive), SyncBounds::new(25, 0, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), (25..40).collect::<Vec<_>>());
    assert_eq!(archive.payload_calls(), vec![2, 3]);
    assert_eq!(archive.calls()[2], Call::Page { limit: 100, offset: None, cursor: "bundle-2".into() });
}

#[tokio::test(start_paused = true)]
async fn overlapping_bundles_are_skipped_leniently() {
    // The second bundle repeats 5..=9, the third is entirely behind the cursor.
    let archive = ArchiveFake::with_ranges(&[(0, 9), (5, 14), (3, 12), (15, 19)]);

    let (outcome, items, errors) =
        collect_all(bundles(&archive), SyncBounds::new(0, 0, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), (0..20).collect::<Vec<_>>());
    assert!(errors.is_empty());
    assert_eq!(outcome.exit, CollectorExit::TipReached);
    assert_eq!(archive.payload_calls(), vec![0, 1, 3]);
}

#[tokio::test(start_paused = true)]
async fn empty_bundle_is_skipped() {
    let archive = ArchiveFake::with_ranges(&[(0, 9)]);
    archive.publish_items(10, 19, &[]);
    archive.publish(10, 19);

    let (_, items, errors) =
        collect_all(bundles(&archive), SyncBounds::new(0, 0, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), (0..20).collect::<Vec<_>>());
    assert!(errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn download_failure_is_reported_once() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19), (20, 29)]);
    archive.fail_payload(1);

    let (outcome, items, errors) =
        collect_all(bundles(&archive), SyncBounds::new(0, 0, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), (0..10).collect::<Vec<_>>());
    assert_eq!(outcome, CollectorOutcome { exit: CollectorExit::Failed, continuation_height: 10 });
    assert_eq!(errors.len(), 1);
    assert_matches!(&errors[0], SyncError::BundleDownload { bundle_id: 1, storage_id, .. } if storage_id == "storage-1");
    assert!(!errors[0].is_integrity_failure());
}

#[tokio::test(start_paused = true)]
async fn tampered_payload_is_an_integrity_failure() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19)]);
    archive.tamper(1);

    let (outcome, items, errors) =
        collect_all(bundles(&archive), SyncBounds::new(0, 0, true), CollectorConfig::default()).await;

    assert_eq!(items.len(), 10);
    assert_eq!(outcome.exit, CollectorExit::Failed);
    assert_eq!(errors.len(), 1);
    assert_matches!(
        &errors[0],
        SyncError::BundlePayload { bundle_id: 1, source: BundleError::ChecksumMismatch { .. }, .. }
    );
    assert!(errors[0].is_integrity_failure());
}

#[tokio::test(start_paused = true)]
async fn invalid_item_key_is_an_integrity_failure() {
    let archive = ArchiveFake::with_ranges(&[(0, 9)]);
    archive.publish_items(10, 11, &[item(10), DataItem::new("eleven", "{}")]);

    let (outcome, items, errors) =
        collect_all(bundles(&archive), SyncBounds::new(0, 0, true), CollectorConfig::default()).await;

    assert_eq!(heights(&items), (0..=10).collect::<Vec<_>>());
    assert_eq!(outcome.continuation_height, 11);
    assert_matches!(
        errors.as_slice(),
        [SyncError::BundlePayload { bundle_id: 1, source: BundleError::InvalidHeightKey { .. }, .. }]
    );
}

#[tokio::test(start_paused = true)]
async fn tip_is_polled_with_the_same_cursor() {
    let archive = ArchiveFake::with_ranges(&[(0, 9), (10, 19)]);
    let (item_sender, mut item_receiver) = mpsc::channel(100);
    let (err_sender, _err_receiver) = mpsc::channel(1);
    let ctx = ServiceContext::new();

    let task = AbortOnDrop::spawn(collect(
        item_sender,
        err_sender,
        bundles(&archive),
        SyncBounds::new(12, 0, false),
        CollectorConfig::default(),
        ctx.clone(),
    ));

    for height in 12..20 {
        assert_eq!(item_receiver.recv().await.unwrap().height().unwrap(), height);
    }
    let before_publish = tokio::time::Instant::now();
    archive.publish(20, 29);
    for height in 20..30 {
        assert_eq!(item_receiver.recv().await.unwrap().height().unwrap(), height);
    }
    let waited = before_publish.elapsed();
    assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31), "{waited:?}");

    ctx.cancel_local();
    assert_eq!(task.await.unwrap(), CollectorOutcome { exit: CollectorExit::Cancelled, continuation_height: 30 });

    // Height 12 is in bundle 1, the tip page is the one starting there.
    let tip_pages = archive
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Page { offset: None, cursor, .. } if cursor == "bundle-1"))
        .count();
    assert!(tip_pages >= 2, "the tip page is requested again");
    // Bundles already delivered are not downloaded again.
    assert_eq!(archive.payload_calls(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start() {
    let archive = ArchiveFake::with_ranges(&[(0, 9)]);
    let (item_sender, mut item_receiver) = mpsc::channel(100);
    let (err_sender, mut err_receiver) = mpsc::channel(1);
    let ctx = ServiceContext::new();
    ctx.cancel_local();

    let outcome = collect(
        item_sender,
        err_sender,
        bundles(&archive),
        SyncBounds::new(4, 0, true),
        CollectorConfig::default(),
        ctx,
    )
    .await;

    assert_eq!(outcome, CollectorOutcome { exit: CollectorExit::Cancelled, continuation_height: 4 });
    assert!(item_receiver.recv().await.is_none());
    assert!(err_receiver.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropped_consumer_stops_the_collector() {
    let node = RpcFake::new(100);
    let (item_sender, mut item_receiver) = mpsc::channel(1);
    let (err_sender, _err_receiver) = mpsc::channel(1);

    let task = AbortOnDrop::spawn(collect(
        item_sender,
        err_sender,
        rpc(&node),
        SyncBounds::new(0, 0, false),
        CollectorConfig::default(),
        ServiceContext::new(),
    ));

    assert_eq!(item_receiver.recv().await.unwrap().height().unwrap(), 0);
    drop(item_receiver);

    let outcome = task.await.unwrap();
    assert_eq!(outcome.exit, CollectorExit::ConsumerClosed);
    // Only items accepted by the channel move the cursor.
    assert!(outcome.continuation_height <= 2);
}
