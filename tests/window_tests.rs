use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use gridkit::state::column::ColumnType;
use gridkit::state::sort::SortSpec;
use gridkit::state::value::CellValue;
use gridkit::state::window::{
    self, FetchError, QuerySignature, RowWindowManager, WindowEvent, WindowPage, WindowRequest,
    WindowSource,
};

struct FakeSource {
    total: usize,
    delay: Duration,
    fail: AtomicBool,
    requests: Mutex<Vec<WindowRequest>>,
}

impl FakeSource {
    fn new(total: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            total,
            delay,
            fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl WindowSource for FakeSource {
    fn fetch(
        &self,
        request: WindowRequest,
    ) -> impl Future<Output = Result<WindowPage, FetchError>> + Send {
        self.requests.lock().unwrap().push(request.clone());
        let total = self.total;
        let delay = self.delay;
        let fail = self.fail.load(Ordering::SeqCst);
        async move {
            tokio::time::sleep(delay).await;
            if fail {
                return Err(FetchError::Failed("server unavailable".into()));
            }
            let end = (request.offset + request.limit).min(total);
            let rows = (request.offset..end).map(|i| vec![json!(i)]).collect();
            Ok(WindowPage {
                offset: request.offset,
                rows,
                index: None,
                positions: None,
                total_rows: total,
            })
        }
    }
}

fn sorted_query() -> QuerySignature {
    QuerySignature {
        sorts: vec![SortSpec::asc("n")],
        ..QuerySignature::default()
    }
}

async fn loaded_manager(source: &Arc<FakeSource>) -> RowWindowManager<FakeSource> {
    let mut manager =
        RowWindowManager::new(source.clone(), "src-1", vec![ColumnType::Integer], 300);
    let request = manager.set_query(sorted_query()).unwrap();
    assert_eq!((request.offset, request.limit), (0, 300));
    let event = manager.settle().await.unwrap();
    assert_eq!(
        event,
        WindowEvent::Applied {
            offset: 0,
            len: 300,
            total_rows: 5000
        }
    );
    manager
}

#[tokio::test(start_paused = true)]
async fn test_scroll_past_window_fetches_ahead() {
    let source = FakeSource::new(5000, Duration::from_millis(50));
    let mut manager = loaded_manager(&source).await;
    assert_eq!(manager.loaded_range(), 0..300);

    let request = manager.ensure_visible(950..1000).unwrap();
    assert!(request.offset <= 800);
    assert!(request.offset + request.limit >= 1150);
    assert_eq!(request.query, sorted_query());

    let event = manager.settle().await.unwrap();
    assert!(matches!(event, WindowEvent::Applied { offset: 800, .. }));
    assert_eq!(manager.offset(), 800);
    assert_eq!(manager.row_at(950).unwrap().cells[0], CellValue::Integer(950));
    assert_eq!(manager.row_at(950).unwrap().original_position, 950);
    assert!(manager.row_at(10).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_covered_range_does_not_refetch() {
    let source = FakeSource::new(5000, Duration::from_millis(50));
    let mut manager = loaded_manager(&source).await;
    let before = source.request_count();

    assert!(manager.ensure_visible(10..60).is_none());
    assert!(manager.ensure_visible(250..300).is_none());
    assert_eq!(source.request_count(), before);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_request_is_not_duplicated() {
    let source = FakeSource::new(5000, Duration::from_millis(50));
    let mut manager = loaded_manager(&source).await;

    assert!(manager.ensure_visible(2000..2020).is_some());
    assert!(manager.is_loading());
    assert!(manager.ensure_visible(2005..2025).is_none());
    assert_eq!(manager.in_flight_request().map(|r| r.offset), Some(1850));

    manager.settle().await.unwrap();
    assert_eq!(source.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_newer_request_supersedes_older() {
    let source = FakeSource::new(5000, Duration::from_millis(100));
    let mut manager =
        RowWindowManager::new(source.clone(), "src-1", vec![ColumnType::Integer], 300);

    manager.ensure_visible(0..20).unwrap();
    // The first fetch completes before the second one is issued, but is
    // never applied.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = manager.ensure_visible(3000..3020).unwrap();

    let event = manager.settle().await.unwrap();
    assert_eq!(
        event,
        WindowEvent::Applied {
            offset: second.offset,
            len: second.limit,
            total_rows: 5000
        }
    );
    assert_eq!(manager.offset(), 2850);
    assert!(!manager.is_loading());
    assert!(manager.settle().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_aborted_fetch_never_lands() {
    let source = FakeSource::new(5000, Duration::from_millis(100));
    let mut manager =
        RowWindowManager::new(source.clone(), "src-1", vec![ColumnType::Integer], 300);

    manager.ensure_visible(0..20).unwrap();
    manager.cancel();
    assert!(!manager.is_loading());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(manager.poll().is_empty());
    assert!(manager.rows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_previous_window_and_retries() {
    let source = FakeSource::new(5000, Duration::from_millis(50));
    let mut manager = loaded_manager(&source).await;

    source.fail.store(true, Ordering::SeqCst);
    manager.ensure_visible(1000..1020).unwrap();
    let event = manager.settle().await.unwrap();
    assert!(matches!(event, WindowEvent::Failed(FetchError::Failed(_))));
    assert_eq!(manager.loaded_range(), 0..300);
    assert_eq!(manager.total_rows(), Some(5000));

    source.fail.store(false, Ordering::SeqCst);
    assert!(manager.ensure_visible(1000..1020).is_some());
    assert!(matches!(
        manager.settle().await,
        Some(WindowEvent::Applied { offset: 850, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_query_change_resets_window() {
    let source = FakeSource::new(5000, Duration::from_millis(50));
    let mut manager = loaded_manager(&source).await;
    manager.ensure_visible(1000..1020).unwrap();
    manager.settle().await.unwrap();

    assert!(manager.set_query(sorted_query()).is_none());

    let query = QuerySignature {
        search: "7".into(),
        ..sorted_query()
    };
    let request = manager.set_query(query.clone()).unwrap();
    assert_eq!(request.offset, 0);
    assert!(manager.rows().is_empty());
    assert_eq!(manager.total_rows(), None);
    assert_eq!(manager.query(), &query);

    manager.settle().await.unwrap();
    assert_eq!(manager.loaded_range(), 0..300);
}

#[tokio::test(start_paused = true)]
async fn test_window_clamps_to_total_rows() {
    let source = FakeSource::new(320, Duration::from_millis(10));
    let mut manager = loaded_manager_small(&source).await;
    assert_eq!(manager.total_rows(), Some(320));

    let request = manager.ensure_visible(300..400).unwrap();
    assert_eq!(request.offset, 150);
    assert_eq!(request.limit, 300);
    manager.settle().await.unwrap();
    assert_eq!(manager.loaded_range(), 150..320);
    assert!(manager.ensure_visible(310..400).is_none());
}

async fn loaded_manager_small(source: &Arc<FakeSource>) -> RowWindowManager<FakeSource> {
    let mut manager =
        RowWindowManager::new(source.clone(), "src-1", vec![ColumnType::Integer], 300);
    manager.set_query(sorted_query()).unwrap();
    manager.settle().await.unwrap();
    manager
}

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_in_flight_fetch() {
    let source = FakeSource::new(5000, Duration::from_millis(100));
    let mut manager =
        RowWindowManager::new(source.clone(), "src-1", vec![ColumnType::Integer], 300);
    manager.ensure_visible(0..10).unwrap();
    manager.teardown();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(manager.poll().is_empty());
    assert!(!manager.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_all_reads_in_chunks() {
    let source = FakeSource::new(2500, Duration::from_millis(5));
    let rows = window::fetch_all(
        source.as_ref(),
        "src-1",
        &QuerySignature::default(),
        &[ColumnType::Integer],
        1000,
    )
    .await
    .unwrap();

    assert_eq!(rows.len(), 2500);
    assert_eq!(source.request_count(), 3);
    assert_eq!(rows[2499].cells[0], CellValue::Integer(2499));
    assert_eq!(rows[1200].original_position, 1200);
}
