use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::io::atomic_write_bytes;
use crate::state::column::Column;
use crate::state::layout::ResolvedColumn;
use crate::state::row::{self, Row};
use crate::state::window::{self, FetchError, QuerySignature, WindowSource};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Receives the exported bytes under a suggested file name.
pub trait SaveBytes {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError>;
}

/// Writes exports into a directory, by default the user's downloads folder.
#[derive(Clone, Debug)]
pub struct DownloadsDir {
    dir: PathBuf,
}

impl DownloadsDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The user's downloads folder, or the current directory when the
    /// platform has none.
    pub fn user_default() -> Self {
        Self::new(dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SaveBytes for DownloadsDir {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        atomic_write_bytes(&path, bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "exported CSV");
        Ok(path)
    }
}

/// `<prefix>-<YYYYMMDD-HHMMSS>.csv`
pub fn export_filename(prefix: &str, now: DateTime<Local>) -> String {
    format!("{prefix}-{}.csv", now.format("%Y%m%d-%H%M%S"))
}

/// Serializes `rows` under the given columns. The header row holds the
/// column labels; fields are quoted only when they contain a comma, a quote
/// or a line break.
pub fn rows_to_csv<'a>(
    columns: &[ResolvedColumn],
    rows: impl IntoIterator<Item = &'a Row>,
) -> Result<String, ExportError> {
    let mut out = Vec::new();
    write_record(&mut out, columns.iter().map(|c| c.column.label.clone()))?;
    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| {
                row.cell(c.original_index)
                    .map(|cell| cell.canonical_string())
                    .unwrap_or_default()
            })
            .collect();
        write_record(&mut out, record)?;
    }

    let mut text = String::from_utf8_lossy(&out).into_owned();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

fn write_record<I>(out: &mut Vec<u8>, fields: I) -> Result<(), ExportError>
where
    I: IntoIterator<Item = String>,
{
    let fields: Vec<String> = fields.into_iter().collect();
    // csv quotes a lone empty field as `""`; an empty line is the unquoted form.
    if let [only] = fields.as_slice() {
        if only.is_empty() {
            out.push(b'\n');
            return Ok(());
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    writer.write_record(&fields)?;
    writer.flush()?;
    Ok(())
}

/// Re-fetches every row of a server-backed source in `chunk_size` pages and
/// serializes it. Columns keep their original order.
pub async fn export_remote<S: WindowSource>(
    source: &S,
    source_id: &str,
    query: &QuerySignature,
    columns: &[ResolvedColumn],
    all_columns: &[Column],
    chunk_size: usize,
) -> Result<String, ExportError> {
    let types = row::column_types(all_columns);
    let rows = window::fetch_all(source, source_id, query, &types, chunk_size).await?;
    tracing::debug!(rows = rows.len(), source_id, "fetched rows for export");
    rows_to_csv(columns, &rows)
}
