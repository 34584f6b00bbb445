use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::table::ResultTable;

/// Default output file name.
pub const DEFAULT_OUTPUT: &str = "harrisco_2018_census.csv";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub path: PathBuf,
    /// Re-read the written file and compare it with the table.
    pub verify: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_OUTPUT),
            verify: true,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Export {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_io_err(path: &Path, err: csv::Error) -> Error {
    Error::Export {
        path: path.to_path_buf(),
        source: std::io::Error::other(err),
    }
}

/// Writes `table` as CSV to `path`, replacing any existing file.
///
/// The data goes to a temporary file next to `path` first, so a failed write
/// never leaves a truncated export behind.
#[instrument(skip_all, fields(path = %path.display(), rows = table.row_count()))]
pub fn write_csv(table: &ResultTable, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => {
            std::fs::create_dir_all(p).map_err(io_err(p))?;
            p
        }
        _ => Path::new("."),
    };

    let tmp = NamedTempFile::new_in(dir).map_err(io_err(path))?;
    {
        let mut writer = WriterBuilder::new().from_writer(tmp.as_file());
        writer
            .write_record(table.labels())
            .map_err(|e| csv_io_err(path, e))?;
        for row in table.rows() {
            writer.write_record(&row).map_err(|e| csv_io_err(path, e))?;
        }
        writer.flush().map_err(io_err(path))?;
    }
    tmp.as_file().sync_all().map_err(io_err(path))?;
    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;

    debug!("csv written");
    Ok(())
}

/// Reads a CSV file written by [`write_csv`] back into a table.
pub fn read_csv(path: &Path) -> Result<ResultTable> {
    let file = File::open(path).map_err(io_err(path))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    let malformed = |e: csv::Error| Error::ExportVerification {
        path: path.to_path_buf(),
        detail: format!("file does not parse as CSV: {e}"),
    };

    let labels: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(ResultTable::from_rows(&labels, &rows))
}

/// Re-reads `path` and checks it holds exactly `expected`.
///
/// Returns the table as read from disk.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn verify_csv(expected: &ResultTable, path: &Path) -> Result<ResultTable> {
    let actual = read_csv(path)?;
    let mismatch = |detail: String| Error::ExportVerification {
        path: path.to_path_buf(),
        detail,
    };

    let want: Vec<&str> = expected.labels().collect();
    let got: Vec<&str> = actual.labels().collect();
    if want != got {
        return Err(mismatch(format!("header {got:?}, expected {want:?}")));
    }
    if actual.row_count() != expected.row_count() {
        return Err(mismatch(format!(
            "{} data rows, expected {}",
            actual.row_count(),
            expected.row_count()
        )));
    }
    if let Some((idx, _)) = expected
        .rows()
        .zip(actual.rows())
        .enumerate()
        .find(|(_, (a, b))| a != b)
    {
        return Err(mismatch(format!("row {idx} differs")));
    }

    debug!("round trip verified");
    Ok(actual)
}

/// Writes the table and, if requested, verifies the round trip.
///
/// Returns the table as it should now be on disk.
pub fn export(table: &ResultTable, opts: &ExportOptions) -> Result<ResultTable> {
    write_csv(table, &opts.path)?;
    let written = if opts.verify {
        verify_csv(table, &opts.path)?
    } else {
        table.clone()
    };
    info!(
        path = %opts.path.display(),
        rows = written.row_count(),
        verified = opts.verify,
        "export complete"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{RawResponse, transform};
    use tempfile::tempdir;

    fn sample() -> ResultTable {
        ResultTable::from_rows(
            &[
                "LOCATION",
                "EST._CHILDREN_IN_POVERTY",
                "EST_ALL_RESIDENTS_IN_POVERTY",
                "EST_MEDIAN_HOUSEHOLD_INCOME",
            ],
            &[vec![
                "Harris County, Texas".into(),
                "306893".into(),
                "767367".into(),
                "60241".into(),
            ]],
        )
    }

    #[test]
    fn writes_header_then_rows() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&sample(), &path)?;

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "LOCATION,EST._CHILDREN_IN_POVERTY,EST_ALL_RESIDENTS_IN_POVERTY,EST_MEDIAN_HOUSEHOLD_INCOME\n\
             \"Harris County, Texas\",306893,767367,60241\n"
        );
        Ok(())
    }

    #[test]
    fn round_trip_reproduces_table() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let table = sample();

        let written = export(
            &table,
            &ExportOptions {
                path: path.clone(),
                verify: true,
            },
        )?;
        assert_eq!(written, table);
        assert_eq!(read_csv(&path)?, table);
        Ok(())
    }

    #[test]
    fn round_trip_survives_quoting_and_empty_cells() -> Result<()> {
        let body = r#"[
            ["NAME","SAEPOV0_17_PT","SAEPOVALL_PT","SAEMHI_PT","state","county"],
            ["Harris County, Texas","306893","767367","60241","48","201"],
            ["The \"Big\" County","12","34",null,"48","999"],
            ["Line\nBreak Parish","","7","41000","22","001"]
        ]"#;
        let raw = RawResponse::from_json(body, "https://example.test/saipe")?;
        let table = transform(&raw);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column("EST_MEDIAN_HOUSEHOLD_INCOME").unwrap()[1], "");

        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let written = export(
            &table,
            &ExportOptions {
                path: path.clone(),
                verify: true,
            },
        )?;
        assert_eq!(written, table);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"The \"\"Big\"\" County\",12,34,\n"), "{text}");
        assert!(text.contains("\"Line\nBreak Parish\",,7,41000"), "{text}");
        Ok(())
    }

    #[test]
    fn overwrites_existing_file() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale contents that are longer than the new export\n".repeat(20)).unwrap();

        write_csv(&sample(), &path)?;
        assert_eq!(read_csv(&path)?, sample());
        Ok(())
    }

    #[test]
    fn empty_table_keeps_header() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = ResultTable::from_rows(&["LOCATION"], &[]);

        export(
            &table,
            &ExportOptions {
                path: path.clone(),
                verify: true,
            },
        )?;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "LOCATION\n");
        Ok(())
    }

    #[test]
    fn verification_detects_tampering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&sample(), &path).unwrap();

        std::fs::write(
            &path,
            "LOCATION,EST._CHILDREN_IN_POVERTY,EST_ALL_RESIDENTS_IN_POVERTY,EST_MEDIAN_HOUSEHOLD_INCOME\n\
             \"Harris County, Texas\",1,767367,60241\n",
        )
        .unwrap();
        let err = verify_csv(&sample(), &path).unwrap_err();
        assert!(matches!(err, Error::ExportVerification { .. }), "{err:?}");

        std::fs::write(&path, "LOCATION\n").unwrap();
        let err = verify_csv(&sample(), &path).unwrap_err();
        assert!(matches!(err, Error::ExportVerification { .. }), "{err:?}");
    }
}
