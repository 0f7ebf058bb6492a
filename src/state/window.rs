use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::state::column::ColumnType;
use crate::state::filter::FilterSpec;
use crate::state::row::{self, Row};
use crate::state::sort::SortSpec;
use crate::state::view_state::ViewState;

/// The part of the view state a server-side source must apply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySignature {
    pub search: String,
    pub sorts: Vec<SortSpec>,
    pub filters: Vec<FilterSpec>,
}

impl QuerySignature {
    pub fn from_view(view: &ViewState) -> Self {
        Self {
            search: view.search.clone(),
            sorts: view.sorts.clone(),
            filters: view.filters.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WindowRequest {
    pub source_id: String,
    pub offset: usize,
    pub limit: usize,
    pub query: QuerySignature,
}

impl WindowRequest {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.limit
    }
}

/// A window of rows as returned by the server collaborator.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowPage {
    pub offset: usize,
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub index: Option<Vec<Value>>,
    #[serde(default)]
    pub positions: Option<Vec<usize>>,
    pub total_rows: usize,
}

impl WindowPage {
    /// Converts the raw page into rows. Positions default to `offset + i`.
    pub fn into_rows(self, types: &[ColumnType]) -> Vec<Row> {
        let offset = self.offset;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let position = self
                    .positions
                    .as_ref()
                    .and_then(|p| p.get(i).copied())
                    .unwrap_or(offset + i);
                let index_value = self
                    .index
                    .as_ref()
                    .and_then(|idx| idx.get(i))
                    .map(row::index_cell);
                Row::from_values(position, values, types).with_index(index_value)
            })
            .collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("window fetch failed: {0}")]
    Failed(String),
    #[error("window fetch cancelled")]
    Cancelled,
}

/// Server-backed row source.
pub trait WindowSource: Send + Sync + 'static {
    fn fetch(
        &self,
        request: WindowRequest,
    ) -> impl Future<Output = Result<WindowPage, FetchError>> + Send;
}

/// Outcome of a settled window fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum WindowEvent {
    Applied {
        offset: usize,
        len: usize,
        total_rows: usize,
    },
    Failed(FetchError),
}

struct Completion {
    generation: u64,
    result: Result<WindowPage, FetchError>,
}

struct InFlight {
    generation: u64,
    request: WindowRequest,
    handle: JoinHandle<()>,
}

/// Keeps a materialized window of a server-backed source around the rows
/// currently visible. At most one fetch is in flight; a newer request aborts
/// the older one and late results are dropped by generation.
pub struct RowWindowManager<S: WindowSource> {
    source: Arc<S>,
    source_id: String,
    window_size: usize,
    types: Vec<ColumnType>,
    query: QuerySignature,
    offset: usize,
    rows: Vec<Row>,
    total_rows: Option<usize>,
    generation: u64,
    in_flight: Option<InFlight>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<S: WindowSource> RowWindowManager<S> {
    pub fn new(
        source: Arc<S>,
        source_id: impl Into<String>,
        types: Vec<ColumnType>,
        window_size: usize,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            source,
            source_id: source_id.into(),
            window_size: window_size.max(1),
            types,
            query: QuerySignature::default(),
            offset: 0,
            rows: Vec::new(),
            total_rows: None,
            generation: 0,
            in_flight: None,
            completions_tx,
            completions_rx,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn total_rows(&self) -> Option<usize> {
        self.total_rows
    }

    pub fn query(&self) -> &QuerySignature {
        &self.query
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight_request(&self) -> Option<&WindowRequest> {
        self.in_flight.as_ref().map(|f| &f.request)
    }

    /// Row at a display index, if it is inside the local window.
    pub fn row_at(&self, index: usize) -> Option<&Row> {
        index
            .checked_sub(self.offset)
            .and_then(|local| self.rows.get(local))
    }

    pub fn loaded_range(&self) -> Range<usize> {
        self.offset..self.offset + self.rows.len()
    }

    /// Decides the `(offset, limit)` to fetch for `visible`, or `None` when the
    /// local window (or the fetch already in flight) covers it.
    pub fn plan(&self, visible: Range<usize>) -> Option<(usize, usize)> {
        let visible = match self.total_rows {
            Some(total) => visible.start.min(total)..visible.end.min(total),
            None => visible,
        };
        if visible.is_empty() && self.total_rows.is_some() {
            return None;
        }
        if covers(&self.loaded_range(), &visible) {
            return None;
        }
        if let Some(in_flight) = self.in_flight.as_ref() {
            if in_flight.request.query == self.query && covers(&in_flight.request.range(), &visible)
            {
                return None;
            }
        }

        let page = self.window_size;
        let need_start = visible.start.saturating_sub(page / 2);
        let mut need_end = visible.end + page + page / 2;
        if let Some(total) = self.total_rows {
            need_end = need_end.min(total);
        }
        let limit = page.max(need_end.saturating_sub(need_start));
        Some((need_start, limit))
    }

    /// Issues a fetch when `visible` is not covered locally.
    pub fn ensure_visible(&mut self, visible: Range<usize>) -> Option<WindowRequest> {
        let (offset, limit) = self.plan(visible)?;
        Some(self.issue(offset, limit))
    }

    /// Switches to a new query. A changed signature resets the window to
    /// offset 0 and fetches the first page.
    pub fn set_query(&mut self, query: QuerySignature) -> Option<WindowRequest> {
        if query == self.query {
            return None;
        }
        self.query = query;
        Some(self.restart())
    }

    pub fn set_source(&mut self, source_id: impl Into<String>) -> Option<WindowRequest> {
        let source_id = source_id.into();
        if source_id == self.source_id {
            return None;
        }
        self.source_id = source_id;
        Some(self.restart())
    }

    /// Aborts the in-flight fetch, if any. Prior window data is kept.
    pub fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!(
                generation = in_flight.generation,
                offset = in_flight.request.offset,
                "aborting superseded window fetch"
            );
            in_flight.handle.abort();
        }
    }

    pub fn teardown(&mut self) {
        self.cancel();
        while self.completions_rx.try_recv().is_ok() {}
    }

    /// Waits for the current fetch to settle and applies it.
    /// Returns `None` when nothing is in flight.
    pub async fn settle(&mut self) -> Option<WindowEvent> {
        while self.in_flight.is_some() {
            let completion = self.completions_rx.recv().await?;
            if let Some(event) = self.accept(completion) {
                return Some(event);
            }
        }
        None
    }

    /// Applies any completions that already arrived, without waiting.
    pub fn poll(&mut self) -> Vec<WindowEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            if let Some(event) = self.accept(completion) {
                events.push(event);
            }
        }
        events
    }

    fn restart(&mut self) -> WindowRequest {
        self.cancel();
        self.offset = 0;
        self.rows.clear();
        self.total_rows = None;
        self.issue(0, self.window_size)
    }

    fn issue(&mut self, offset: usize, limit: usize) -> WindowRequest {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let request = WindowRequest {
            source_id: self.source_id.clone(),
            offset,
            limit,
            query: self.query.clone(),
        };
        tracing::debug!(generation, offset, limit, "requesting row window");

        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        let task_request = request.clone();
        let handle = tokio::spawn(async move {
            let result = source.fetch(task_request).await;
            let _ = tx.send(Completion { generation, result });
        });

        self.in_flight = Some(InFlight {
            generation,
            request: request.clone(),
            handle,
        });
        request
    }

    fn accept(&mut self, completion: Completion) -> Option<WindowEvent> {
        let current = self.in_flight.as_ref().map(|f| f.generation);
        if current != Some(completion.generation) {
            tracing::debug!(
                generation = completion.generation,
                "ignoring stale window result"
            );
            return None;
        }
        self.in_flight = None;

        match completion.result {
            Ok(page) => {
                let total_rows = page.total_rows;
                self.offset = page.offset;
                self.rows = page.into_rows(&self.types);
                self.total_rows = Some(total_rows);
                Some(WindowEvent::Applied {
                    offset: self.offset,
                    len: self.rows.len(),
                    total_rows,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "window fetch failed, keeping previous rows");
                Some(WindowEvent::Failed(err))
            }
        }
    }
}

impl<S: WindowSource> Drop for RowWindowManager<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn covers(outer: &Range<usize>, inner: &Range<usize>) -> bool {
    !outer.is_empty() && outer.start <= inner.start && inner.end <= outer.end
}

/// Fetches every row of `source` for `query` in `chunk_size` pages, until
/// `total_rows` is reached or the source returns an empty page.
pub async fn fetch_all<S: WindowSource>(
    source: &S,
    source_id: &str,
    query: &QuerySignature,
    types: &[ColumnType],
    chunk_size: usize,
) -> Result<Vec<Row>, FetchError> {
    let chunk_size = chunk_size.max(1);
    let mut rows = Vec::new();
    let mut offset = 0;

    loop {
        let page = source
            .fetch(WindowRequest {
                source_id: source_id.to_string(),
                offset,
                limit: chunk_size,
                query: query.clone(),
            })
            .await?;
        let total = page.total_rows;
        let received = page.rows.len();
        rows.extend(page.into_rows(types));
        offset += received;
        if received == 0 || offset >= total {
            break;
        }
    }

    Ok(rows)
}
