//! Subcommand implementations
//!
//! Each command writes its output to a caller-supplied writer so it can be
//! driven from tests as well as from `main`.

use crate::args::FilterArgs;
use anyhow::{Context, Result};
use specdb_store::{
    translate, BulkWriteReport, BulkWriter, CancellationToken, Dialect, Error, FieldType, Filter,
    Projection, Reading, Tables,
};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};

/// Options for `import`
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub auto_commit: bool,
    pub dedicated: bool,
}

/// Readings parsed from a JSON-lines file
#[derive(Debug, Default)]
pub struct ParsedReadings {
    pub readings: Vec<Reading>,
    /// 1-based line numbers that could not be parsed
    pub rejected_lines: Vec<usize>,
}

/// Parse one reading per non-blank line; unparseable lines are logged and skipped
pub fn read_jsonl(path: &Path) -> Result<ParsedReadings> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut parsed = ParsedReadings::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Reading>(&line) {
            Ok(reading) => parsed.readings.push(reading),
            Err(e) => {
                warn!(line = index + 1, "Skipping malformed reading: {}", e);
                parsed.rejected_lines.push(index + 1);
            }
        }
    }
    Ok(parsed)
}

/// Bulk-write the readings in `path`
pub async fn import(
    tables: &Tables,
    path: &Path,
    options: &ImportOptions,
    cancel: &CancellationToken,
    out: &mut dyn Write,
) -> Result<BulkWriteReport> {
    let parsed = read_jsonl(path)?;
    info!(
        readings = parsed.readings.len(),
        rejected = parsed.rejected_lines.len(),
        "Parsed import file"
    );

    let mut report = BulkWriter::new(&tables.readings)
        .batch_size(options.batch_size)
        .auto_commit(options.auto_commit)
        .dedicated_connection(options.dedicated)
        .write(&parsed.readings, cancel)
        .await;
    report.failed += parsed.rejected_lines.len();

    writeln!(
        out,
        "staged {} committed {} failed {}{}",
        report.staged,
        report.committed,
        report.failed,
        if report.stopped { " (stopped)" } else { "" }
    )?;
    Ok(report)
}

/// Build the filter from an optional JSON document plus overrides
pub fn load_filter(args: &FilterArgs) -> Result<Filter> {
    let mut filter = match &args.filter {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read filter {}", path.display()))?;
            serde_json::from_str::<Filter>(&content)
                .with_context(|| format!("Invalid filter document {}", path.display()))?
        }
        None => Filter::new(),
    };

    if let Some(limit) = args.limit {
        filter = filter.with_limit(limit);
    }
    if args.latest {
        filter = filter.latest(true);
    }
    Ok(filter)
}

/// Stream matching readings (or just their ids) as JSON lines
///
/// Returns the number of lines written.
pub async fn query(
    tables: &Tables,
    filter: &Filter,
    ids_only: bool,
    dedicated: bool,
    out: &mut dyn Write,
) -> Result<usize> {
    if ids_only {
        let ids = tables.readings.query_ids(filter).await?;
        for id in &ids {
            writeln!(out, "{}", id)?;
        }
        return Ok(ids.len());
    }

    let mut cursor = tables.readings.stream(filter, dedicated).await?;
    info!(row_count = cursor.row_count(), dedicated = cursor.is_dedicated(), "Streaming readings");

    let mut written = 0;
    let result: Result<()> = async {
        while cursor.has_next().await? {
            let reading = cursor.next()?;
            serde_json::to_writer(&mut *out, &reading)?;
            writeln!(out)?;
            written += 1;
        }
        Ok(())
    }
    .await;
    cursor.close().await;

    result?;
    Ok(written)
}

/// SQL for `filter` rendered in `dialect`
pub fn preview_sql(filter: &Filter, dialect: &dyn Dialect, ids_only: bool) -> Result<String> {
    let projection = if ids_only { Projection::Ids } else { Projection::Rows };
    let parts = translate(filter, projection, dialect)?;
    Ok(parts.to_sql())
}

pub async fn fields(tables: &Tables, out: &mut dyn Write) -> Result<()> {
    for (name, field_type) in tables.metadata.field_names().await? {
        writeln!(out, "{}\t{}", name, type_name(field_type))?;
    }
    Ok(())
}

pub async fn values(tables: &Tables, field: &str, out: &mut dyn Write) -> Result<()> {
    for value in tables.metadata.field_values(field).await? {
        writeln!(out, "{}", value)?;
    }
    Ok(())
}

pub async fn show(tables: &Tables, external_id: &str, format: &str, out: &mut dyn Write) -> Result<()> {
    let reading = tables
        .readings
        .load_by_external_id(external_id, format)
        .await?
        .ok_or_else(|| Error::NotFound(format!("reading {} ({})", external_id, format)))?;

    serde_json::to_writer_pretty(&mut *out, &reading)?;
    writeln!(out)?;
    Ok(())
}

pub async fn delete(tables: &Tables, id: i64, cascade: bool, out: &mut dyn Write) -> Result<()> {
    if !tables.readings.delete(id, cascade).await? {
        return Err(Error::NotFound(format!("reading id {}", id)).into());
    }
    writeln!(out, "deleted {}{}", id, if cascade { " (with metadata)" } else { "" })?;
    Ok(())
}

fn type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "string",
        FieldType::Number => "number",
        FieldType::Boolean => "boolean",
    }
}
