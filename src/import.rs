//! Purpose: Parse comma-separated text into rows for `rowstore import`.
//! Exports: `ErrorPolicy`, `ImportConfig`, `ImportOutcome`, `ImportFailure`, `import`.
//! Role: Line-oriented import engine used by the CLI; isolates parsing from main.
//! Invariants: Skip mode only continues at line boundaries.
//! Invariants: Fields are split on the delimiter and trimmed; there is no quoting.
use std::io::{self, BufRead, BufReader, Read};

use bstr::ByteSlice;
use rowstore::api::{Error, ErrorKind};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorPolicy {
    Stop,
    Skip,
}

#[derive(Copy, Clone, Debug)]
pub struct ImportConfig {
    pub errors: ErrorPolicy,
    pub has_header: bool,
    pub delimiter: char,
    pub max_snippet_bytes: usize,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ImportOutcome {
    pub records_total: u64,
    pub ok: u64,
    pub failed: u64,
}

#[derive(Clone, Debug)]
pub struct ImportFailure {
    pub line: u64,
    pub message: String,
    pub error_kind: String,
    pub snippet: Option<String>,
}

fn io_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to read import input")
        .with_source(err)
}

/// Feeds every data line of `reader` to `on_row` as a vector of trimmed fields.
///
/// Per-row failures (invalid UTF-8, or an `Encoding`/`Usage` error from
/// `on_row`) stop the import or are reported through `on_failure` depending on
/// `config.errors`. Any other error from `on_row` always stops the import.
pub fn import<R, F, N>(
    reader: R,
    config: ImportConfig,
    mut on_row: F,
    mut on_failure: N,
) -> Result<ImportOutcome, Error>
where
    R: Read,
    F: FnMut(Vec<String>) -> Result<(), Error>,
    N: FnMut(ImportFailure),
{
    let mut outcome = ImportOutcome::default();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut line_no = 0u64;

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(io_error)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        if config.has_header && line_no == 1 {
            continue;
        }
        let line = buf.trim_end_with(|c| c == '\n' || c == '\r');
        if line.trim().is_empty() {
            continue;
        }
        outcome.records_total += 1;

        let result = match line.to_str() {
            Ok(text) => on_row(split_fields(text, config.delimiter)),
            Err(err) => Err(Error::new(ErrorKind::Encoding)
                .with_message("line is not valid UTF-8")
                .with_source(err)),
        };
        match result {
            Ok(()) => outcome.ok += 1,
            Err(err) if is_row_error(&err) => match config.errors {
                ErrorPolicy::Stop => return Err(stop_error(err, line_no)),
                ErrorPolicy::Skip => {
                    outcome.failed += 1;
                    on_failure(ImportFailure {
                        line: line_no,
                        message: err.to_string(),
                        error_kind: format!("{:?}", err.kind()),
                        snippet: Some(truncate_snippet(
                            &line.to_str_lossy(),
                            config.max_snippet_bytes,
                        )),
                    });
                }
            },
            Err(err) => return Err(err),
        }
    }
    Ok(outcome)
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|field| field.trim().to_string())
        .collect()
}

fn is_row_error(err: &Error) -> bool {
    matches!(err.kind(), ErrorKind::Encoding | ErrorKind::Usage)
}

fn stop_error(err: Error, line_no: u64) -> Error {
    let message = match err.message() {
        Some(message) => format!("line {line_no}: {message}"),
        None => format!("line {line_no}: invalid row"),
    };
    let err = err.with_message(message);
    if err.hint().is_some() {
        return err;
    }
    err.with_hint("Fix the line, or use --errors skip to continue past bad rows.")
}

fn truncate_snippet(input: &str, max: usize) -> String {
    if input.len() <= max {
        return input.to_string();
    }
    let suffix = "...";
    let mut take = max.saturating_sub(suffix.len());
    while take > 0 && !input.is_char_boundary(take) {
        take -= 1;
    }
    format!("{}{suffix}", &input[..take])
}
