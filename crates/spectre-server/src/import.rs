//! Startup bulk import.
//!
//! `--import <path>` accepts a single file or a directory. Files are
//! discriminated by extension: `.json` is a JSON event batch, `.bin` an
//! export container, `.seg` a raw segment file; anything else is sniffed.

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use spectre_index::Indexer;
use spectre_log::{CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON, ImportReport};

/// Imports a file or every importable file in a directory, logging a
/// per-file report. Individual file failures are logged and skipped; the
/// startup continues.
pub fn import_path(indexer: &mut Indexer, path: &Path) -> Result<ImportReport> {
    let mut total = ImportReport::default();

    if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .with_context(|| format!("reading import directory {}", path.display()))?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("json" | "bin" | "seg")
                )
            })
            .collect();
        entries.sort();

        for file in entries {
            match import_file(indexer, &file) {
                Ok(report) => absorb(&mut total, report),
                Err(e) => {
                    tracing::error!(file = %file.display(), error = %e, "import failed, skipping file");
                }
            }
        }
    } else {
        absorb(&mut total, import_file(indexer, path)?);
    }

    tracing::info!(
        total_events = total.total_events,
        imported = total.imported,
        replaced = total.replaced,
        skipped = total.skipped,
        invalid = total.invalid,
        "startup import complete"
    );
    Ok(total)
}

fn import_file(indexer: &mut Indexer, path: &Path) -> Result<ImportReport> {
    let data = Bytes::from(
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
    );

    let report = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => indexer.import(&data, Some(CONTENT_TYPE_JSON), true, false)?,
        Some("bin") => indexer.import(&data, Some(CONTENT_TYPE_BINARY), true, false)?,
        Some("seg") => {
            // A raw segment file: decode its events and run them through
            // the normal per-event import path.
            let reader = spectre_log::segment::SegmentReader::from_bytes(data, path)?;
            let events = reader.events()?;
            indexer.import_events(events, true, false)?
        }
        _ => indexer.import(&data, None, true, false)?,
    };

    tracing::info!(file = %path.display(), report = %report, "imported file");
    Ok(report)
}

fn absorb(total: &mut ImportReport, report: ImportReport) {
    total.total_events += report.total_events;
    total.imported += report.imported;
    total.replaced += report.replaced;
    total.skipped += report.skipped;
    total.invalid += report.invalid;
}
