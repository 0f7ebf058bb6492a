//! Tabular data grid engine: column resolution, client-side search, filter
//! and sort, row virtualization, server-side windowed paging, selection,
//! persisted view state, cell editing and CSV export.

pub mod config;
pub mod io;
pub mod logging;
pub mod state;
