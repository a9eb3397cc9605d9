//! End-to-end render orchestration against a scripted grid.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{render_error, rendered, rendering, test_client, MockGrid, StaticFetcher};
use gridshot_core::{
    CancelSignal, Digest, GridClient, GridConfig, GridError, Offset, Region, RenderResult,
    RenderSettings, RenderStatus, ResourceCache, Snapshot,
};

fn page_snapshot(url: &str, resources: &[&str]) -> Snapshot {
    Snapshot {
        url: url.to_string(),
        document_tree: serde_json::json!([0, [1, 2], "body"]),
        resource_urls: resources.iter().map(|r| r.to_string()).collect(),
        ..Snapshot::default()
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_resolves_uploads_and_renders() {
    let grid = MockGrid::new();
    let fetcher = StaticFetcher::new();
    let client = test_client(grid.clone(), fetcher.clone());

    let snapshot = page_snapshot("https://aut.example/page.html", &["https://aut.example/a.png"]);
    let result = client
        .render_snapshot(&snapshot, RenderSettings::default(), CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(result.image_location.as_deref(), Some("https://grid.test/images/1"));

    // The submitted request carries the flattened mapping with the one
    // declared resource, addressed by its content hash.
    let started = grid.started_requests.lock().unwrap();
    assert_eq!(started.len(), 1);
    let mapping = &started[0].resources;
    assert_eq!(mapping.len(), 1);
    let expected_hash = Digest::compute("https://aut.example/a.png".as_bytes());
    assert_eq!(
        mapping["https://aut.example/a.png"].hash(),
        Some(expected_hash)
    );

    // Both the asset and the serialized document were uploaded.
    let uploads = grid.uploads();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.contains(&expected_hash.to_hex()));
}

#[tokio::test(start_paused = true)]
async fn poll_resolves_only_on_terminal_status() {
    let grid = MockGrid::new();
    let client = test_client(grid.clone(), StaticFetcher::new());

    let url = "https://aut.example/slow.html";
    grid.script(url, vec![rendering(), rendering(), rendered()]);

    let snapshot = page_snapshot(url, &[]);
    client
        .render_snapshot(&snapshot, RenderSettings::default(), CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(grid.polls_for(url), 3);
}

#[tokio::test(start_paused = true)]
async fn unrecognized_status_keeps_the_render_polling() {
    let grid = MockGrid::new();
    let client = test_client(grid.clone(), StaticFetcher::new());

    let url = "https://aut.example/queued.html";
    grid.script(
        url,
        vec![
            RenderResult {
                status: RenderStatus::Unknown,
                ..rendered()
            },
            rendering(),
            rendered(),
        ],
    );

    client
        .render_snapshot(&page_snapshot(url, &[]), RenderSettings::default(), CancelSignal::new())
        .await
        .unwrap();

    // The unknown status re-enters the poll loop instead of settling.
    assert_eq!(grid.polls_for(url), 3);
}

#[tokio::test(start_paused = true)]
async fn selector_regions_become_image_relative() {
    let grid = MockGrid::new();
    let client = test_client(grid.clone(), StaticFetcher::new());

    let url = "https://aut.example/regions.html";
    let mut terminal = rendered();
    terminal.selector_regions = Some(vec![
        Region { x: 120, y: 90, width: 30, height: 20 },
        Region { x: 10, y: 10, width: 5, height: 5 },
    ]);
    terminal.image_position_in_active_frame = Some(Offset { x: 50, y: 40 });
    grid.script(url, vec![terminal]);

    let result = client
        .render_snapshot(&page_snapshot(url, &[]), RenderSettings::default(), CancelSignal::new())
        .await
        .unwrap();

    let regions = result.selector_regions.unwrap();
    assert_eq!(regions[0], Region { x: 70, y: 50, width: 30, height: 20 });
    // Negative translations clamp at zero.
    assert_eq!(regions[1], Region { x: 0, y: 0, width: 5, height: 5 });
}

#[tokio::test(start_paused = true)]
async fn need_more_resources_is_fatal_for_that_render() {
    let grid = MockGrid::new();
    let client = test_client(grid.clone(), StaticFetcher::new());

    let url = "https://aut.example/starved.html";
    grid.starve(url);

    let err = client
        .render_snapshot(&page_snapshot(url, &[]), RenderSettings::default(), CancelSignal::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GridError::NeedMoreResources(id) if id == url));
    // The render never entered the poll loop.
    assert_eq!(grid.polls_for(url), 0);
}

#[tokio::test(start_paused = true)]
async fn server_error_message_passes_through_verbatim() {
    let grid = MockGrid::new();
    let client = test_client(grid.clone(), StaticFetcher::new());

    let url = "https://aut.example/broken.html";
    grid.script(url, vec![rendering(), render_error("renderer crashed: oom")]);

    let err = client
        .render_snapshot(&page_snapshot(url, &[]), RenderSettings::default(), CancelSignal::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GridError::RenderFailed(msg) if msg == "renderer crashed: oom"));
}

#[tokio::test(start_paused = true)]
async fn abort_settles_one_render_and_leaves_siblings_polling() {
    let grid = MockGrid::new();
    let client = Arc::new(test_client(grid.clone(), StaticFetcher::new()));

    let stuck_url = "https://aut.example/stuck.html";
    let fine_url = "https://aut.example/fine.html";
    grid.never_finish(stuck_url);
    grid.script(fine_url, vec![rendering(), rendered()]);

    let cancel = CancelSignal::new();
    let stuck = {
        let client = client.clone();
        let cancel = cancel.clone();
        let snapshot = page_snapshot(stuck_url, &[]);
        tokio::spawn(async move {
            client
                .render_snapshot(&snapshot, RenderSettings::default(), cancel)
                .await
        })
    };
    let fine = {
        let client = client.clone();
        let snapshot = page_snapshot(fine_url, &[]);
        tokio::spawn(async move {
            client
                .render_snapshot(&snapshot, RenderSettings::default(), CancelSignal::new())
                .await
        })
    };

    // Let both renders get a few poll cycles in, then abort one.
    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();

    let err = stuck.await.unwrap().unwrap_err();
    assert!(matches!(err, GridError::RenderAborted));
    fine.await.unwrap().unwrap();

    // The aborted render drops out of subsequent poll batches.
    let polls_at_abort = grid.polls_for(stuck_url);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(grid.polls_for(stuck_url), polls_at_abort);
}

#[tokio::test(start_paused = true)]
async fn deadline_settles_render_as_timed_out() {
    let grid = MockGrid::new();
    let config = GridConfig::new("https://grid.test", "test-key")
        .with_render_deadline(Duration::from_secs(2));
    let client = GridClient::with_components(
        config,
        grid.clone(),
        StaticFetcher::new(),
        ResourceCache::new(),
    )
    .unwrap();

    let url = "https://aut.example/forever.html";
    grid.never_finish(url);

    let err = client
        .render_snapshot(&page_snapshot(url, &[]), RenderSettings::default(), CancelSignal::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GridError::RenderTimedOut(_)));

    // Absent from any further poll batch.
    let polls_at_timeout = grid.polls_for(url);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(grid.polls_for(url), polls_at_timeout);
}

#[tokio::test(start_paused = true)]
async fn bookings_batch_within_window_and_cache_after() {
    let grid = MockGrid::new();
    let client = Arc::new(test_client(grid.clone(), StaticFetcher::new()));

    let first = {
        let client = client.clone();
        let snapshot = page_snapshot("https://aut.example/one.html", &[]);
        tokio::spawn(async move {
            client
                .render_snapshot(&snapshot, RenderSettings::default(), CancelSignal::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let client = client.clone();
        let snapshot = page_snapshot("https://aut.example/two.html", &[]);
        tokio::spawn(async move {
            client
                .render_snapshot(&snapshot, RenderSettings::default(), CancelSignal::new())
                .await
        })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // Identical settings 10ms apart coalesce into one booking call.
    assert_eq!(grid.book_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(*grid.book_batch_sizes.lock().unwrap(), vec![2]);

    // Their submissions also share one startRenders call.
    assert_eq!(grid.start_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // A later render under the same fingerprint reuses the cached
    // booking without another grid round-trip.
    client
        .render_snapshot(
            &page_snapshot("https://aut.example/three.html", &[]),
            RenderSettings::default(),
            CancelSignal::new(),
        )
        .await
        .unwrap();
    assert_eq!(grid.book_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn device_catalogs_are_fetched_once() {
    let grid = MockGrid::new();
    let client = test_client(grid.clone(), StaticFetcher::new());

    let first = client.chrome_emulation_devices().await.unwrap();
    let second = client.chrome_emulation_devices().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(grid.device_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    client.ios_devices().await.unwrap();
    client.android_devices().await.unwrap();
    assert_eq!(grid.device_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}
