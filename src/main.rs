use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde_json::Value;

use gridkit::config::GridConfig;
use gridkit::io::csv_export::{DownloadsDir, SaveBytes};
use gridkit::io::json_io;
use gridkit::io::storage::{FileStorage, MemoryStorage, ViewStorage};
use gridkit::state::column::ColumnConfig;
use gridkit::state::filter::{FilterOp, FilterSpec};
use gridkit::state::grid::{DataGrid, GridOptions, NoEvents};
use gridkit::state::sort::{SortDirection, SortSpec};
use gridkit::state::view_state::GridInstance;

/// Load a JSON array of objects, apply a grid view and export it as CSV
#[derive(Parser, Debug)]
#[command(name = "gridkit", version, about)]
struct Cli {
    /// JSON file holding an array of objects
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Grid configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Per-column overrides keyed by column name (JSON)
    #[arg(long, value_name = "FILE")]
    columns: Option<PathBuf>,

    /// Global search term
    #[arg(long)]
    search: Option<String>,

    /// Sort key as `column[:asc|desc]`, repeatable
    #[arg(long, value_name = "SPEC")]
    sort: Vec<String>,

    /// Filter as `column:op[:value]`, repeatable
    #[arg(long, value_name = "SPEC")]
    filter: Vec<String>,

    /// Hide a column, repeatable
    #[arg(long, value_name = "COLUMN")]
    hide: Vec<String>,

    /// Persist the view state under this directory
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Grid instance id used for persisted view state
    #[arg(long, default_value = "cli")]
    instance: String,

    /// Write the CSV to this path instead of stdout
    #[arg(short, long, value_name = "PATH", conflicts_with = "downloads")]
    output: Option<PathBuf>,

    /// Save the CSV into the downloads folder
    #[arg(long)]
    downloads: bool,
}

fn main() -> Result<()> {
    gridkit::logging::init();
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => GridConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GridConfig::default(),
    };
    let overrides = load_column_config(cli.columns.as_deref())?;

    let table = json_io::load_json(&cli.input)
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    let (columns, rows) = table.into_grid(&overrides)?;

    let storage: Arc<dyn ViewStorage> = match cli.state_dir.as_ref() {
        Some(dir) => Arc::new(FileStorage::new(dir)),
        None => Arc::new(MemoryStorage::new()),
    };
    let mut grid = DataGrid::new(
        GridInstance::new(cli.instance.clone(), "dataframe"),
        columns,
        rows,
        storage,
        config,
        GridOptions::default(),
        NoEvents,
    );

    if let Some(search) = cli.search.as_deref() {
        grid.set_search(search);
    }
    if !cli.sort.is_empty() {
        let sorts = cli
            .sort
            .iter()
            .map(|raw| parse_sort(raw))
            .collect::<Result<Vec<_>>>()?;
        grid.set_sorts(sorts);
    }
    for raw in &cli.filter {
        let filter = parse_filter(raw)?;
        if !grid.add_filter(filter) {
            tracing::warn!(filter = %raw, "filter not applied");
        }
    }
    for column in &cli.hide {
        grid.set_column_hidden(column, true);
    }

    if cli.downloads {
        let sink = DownloadsDir::user_default();
        let path = grid.export_csv(&sink, chrono::Local::now())?;
        eprintln!("saved {}", path.display());
        return Ok(());
    }

    let csv = grid.to_csv()?;
    match cli.output.as_ref() {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let sink = DownloadsDir::new(dir.unwrap_or_else(|| Path::new(".")));
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("invalid output path {}", path.display()))?;
            sink.save(name, csv.as_bytes())?;
        }
        None => println!("{csv}"),
    }
    Ok(())
}

fn load_column_config(path: Option<&Path>) -> Result<BTreeMap<String, ColumnConfig>> {
    let Some(path) = path else {
        return Ok(BTreeMap::new());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid column config {}", path.display()))
}

fn parse_sort(raw: &str) -> Result<SortSpec> {
    let (column, direction) = match raw.rsplit_once(':') {
        Some((column, "asc")) => (column, SortDirection::Asc),
        Some((column, "desc")) => (column, SortDirection::Desc),
        Some((_, other)) => bail!("unknown sort direction '{other}' in '{raw}'"),
        None => (raw, SortDirection::Asc),
    };
    Ok(SortSpec::new(column, direction))
}

fn parse_filter(raw: &str) -> Result<FilterSpec> {
    let mut parts = raw.splitn(3, ':');
    let column = parts.next().filter(|c| !c.is_empty());
    let op = parts.next();
    let (Some(column), Some(op)) = (column, op) else {
        bail!("filter must be column:op[:value], got '{raw}'");
    };
    let op = FilterOp::parse(op).ok_or_else(|| anyhow!("unknown filter operator '{op}'"))?;
    let value = match parts.next() {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.into())),
        None => Value::Null,
    };
    Ok(FilterSpec::new(column, op, value))
}
