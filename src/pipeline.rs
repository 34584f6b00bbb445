use tracing::{info, info_span};

use crate::client::Fetch;
use crate::error::{Error, Result};
use crate::export::{ExportOptions, export};
use crate::query::QuerySpec;
use crate::table::{ResultTable, transform};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Report {
    /// The table as exported (re-read from disk when verification is on).
    pub table: ResultTable,
    /// Data rows the API returned.
    pub fetched_rows: usize,
}

/// Runs fetch, transform and export in order.
///
/// The output file is only written once the fetch and transform stages have
/// succeeded; any earlier error returns without touching it.
pub fn run<F: Fetch + ?Sized>(
    fetcher: &F,
    spec: &QuerySpec,
    opts: &ExportOptions,
) -> Result<Report> {
    let _span = info_span!(
        "saipe",
        year = spec.year(),
        state = spec.region().state,
        county = spec.region().county
    )
    .entered();

    let raw = fetcher.fetch(spec)?;
    let fetched_rows = raw.data_rows().len();

    let table = transform(&raw);
    info!(
        columns = ?table.labels().collect::<Vec<_>>(),
        rows = table.row_count(),
        "table reshaped"
    );
    if table.columns().is_empty() {
        return Err(Error::format(
            spec.request_url().as_str(),
            "response has no reportable columns",
        ));
    }

    let table = export(&table, opts)?;
    Ok(Report {
        table,
        fetched_rows,
    })
}
