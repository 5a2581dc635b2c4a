//! CSV ingest: builds a table from a delimited file, serially or by
//! fanning newline-aligned byte chunks across a thread pool.
//!
//! Parallel ingest is deterministic: chunks are parsed independently but
//! merged in file order, and ids are assigned densely in merge order, so
//! the result is identical to a serial load of the same file.

use crate::error::{DbError, DbResult};
use crate::record::RecordData;
use crate::table::Table;
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// How a CSV column's text is cast into a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Parsed as `i64`.
    Integer,
    /// Parsed as `f64`.
    Float,
    /// `true`/`false` (case-insensitive) or `1`/`0`.
    Boolean,
    /// Stored verbatim.
    Text,
}

impl ColumnType {
    fn cast(self, raw: &str) -> DbResult<Value> {
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        match self {
            Self::Text => Ok(Value::String(raw.to_string())),
            Self::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| DbError::invalid_format(format!("not an integer: {raw:?}"))),
            Self::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| DbError::invalid_format(format!("not a float: {raw:?}"))),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(DbError::invalid_format(format!("not a boolean: {raw:?}"))),
            },
        }
    }
}

/// Options for [`table_from_csv`].
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Whether the first row is a header naming the columns.
    pub headers: bool,
    /// Field delimiter.
    pub delimiter: u8,
    /// Column names when the file has no header (or to override it).
    pub column_names: Option<Vec<String>>,
    /// Per-column casts; columns beyond this list are text.
    pub column_types: Option<Vec<ColumnType>>,
    /// Split the file into chunks and parse them in parallel.
    pub parallel: bool,
    /// Upper bound on chunk size in bytes for parallel parsing.
    pub max_chunk_size: usize,
    /// Worker threads for parallel parsing; 0 uses the global pool.
    pub workers: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            headers: true,
            delimiter: b',',
            column_names: None,
            column_types: None,
            parallel: false,
            max_chunk_size: 4 << 20,
            workers: 0,
        }
    }
}

/// Reads a CSV file into a new table with dense ids starting at 1.
pub fn table_from_csv(
    path: impl AsRef<Path>,
    table_name: &str,
    options: &CsvOptions,
) -> DbResult<Table> {
    let bytes = fs::read(path.as_ref())?;
    let (columns, body) = split_header(&bytes, options)?;

    let rows = if options.parallel {
        parse_parallel(body, &columns, options)?
    } else {
        parse_chunk(body, &columns, options)?
    };

    let mut table = Table::new(table_name, columns);
    for data in rows {
        table.insert(data)?;
    }
    Ok(table)
}

/// Resolves the column list and returns the record rows as a byte slice.
fn split_header<'a>(bytes: &'a [u8], options: &CsvOptions) -> DbResult<(Vec<String>, &'a [u8])> {
    if !options.headers {
        let columns = options
            .column_names
            .clone()
            .ok_or_else(|| DbError::invalid_format("no header row and no column names given"))?;
        return Ok((columns, bytes));
    }

    let header_end = bytes
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| p + 1);
    let header_line = std::str::from_utf8(&bytes[..header_end])
        .map_err(|_| DbError::invalid_format("header row is not valid UTF-8"))?
        .trim_end_matches(['\n', '\r']);

    let columns = match &options.column_names {
        Some(names) => names.clone(),
        None => header_line
            .split(options.delimiter as char)
            .map(|s| s.trim().to_string())
            .collect(),
    };
    Ok((columns, &bytes[header_end..]))
}

/// Parses one newline-terminated region of record rows.
fn parse_chunk(
    chunk: &[u8],
    columns: &[String],
    options: &CsvOptions,
) -> DbResult<Vec<RecordData>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(chunk);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DbError::invalid_format(format!("bad CSV row: {e}")))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let mut data = RecordData::new();
        for (i, field) in record.iter().enumerate() {
            let Some(column) = columns.get(i) else {
                break;
            };
            let ty = options
                .column_types
                .as_ref()
                .and_then(|types| types.get(i).copied())
                .unwrap_or(ColumnType::Text);
            data.insert(column.clone(), ty.cast(field)?);
        }
        rows.push(data);
    }
    Ok(rows)
}

/// Splits the body on newline-aligned boundaries and parses chunks in
/// parallel, merging results in file order.
fn parse_parallel(
    body: &[u8],
    columns: &[String],
    options: &CsvOptions,
) -> DbResult<Vec<RecordData>> {
    let chunks = chunk_boundaries(body, options.max_chunk_size);

    let parse_all = || -> DbResult<Vec<Vec<RecordData>>> {
        chunks
            .par_iter()
            .map(|&(start, end)| parse_chunk(&body[start..end], columns, options))
            .collect()
    };

    let parsed = if options.workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .map_err(|e| DbError::invalid_operation(format!("thread pool: {e}")))?;
        pool.install(parse_all)?
    } else {
        parse_all()?
    };

    Ok(parsed.into_iter().flatten().collect())
}

/// Newline-aligned `(start, end)` ranges covering the whole body. Every
/// boundary except possibly the last falls just after a `\n`, so no row
/// straddles two chunks.
fn chunk_boundaries(body: &[u8], max_chunk_size: usize) -> Vec<(usize, usize)> {
    let max = max_chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < body.len() {
        let tentative = (start + max).min(body.len());
        let end = if tentative == body.len() {
            tentative
        } else {
            match body[tentative..].iter().position(|&b| b == b'\n') {
                Some(offset) => tentative + offset + 1,
                None => body.len(),
            }
        };
        ranges.push((start, end));
        start = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn serial_load_with_header() {
        let file = write_csv("name,age\nada,36\nbob,28\n");
        let options = CsvOptions {
            column_types: Some(vec![ColumnType::Text, ColumnType::Integer]),
            ..CsvOptions::default()
        };
        let table = table_from_csv(file.path(), "people", &options).unwrap();
        assert_eq!(table.columns(), ["name", "age"]);
        assert_eq!(table.len(), 2);
        let ids: Vec<_> = table.records().iter().map(Record::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(table.get(1).unwrap().get_or_null("age"), json!(36));
        assert_eq!(table.next_id(), 3);
    }

    #[test]
    fn headerless_load_needs_column_names() {
        let file = write_csv("ada,36\n");
        let mut options = CsvOptions {
            headers: false,
            ..CsvOptions::default()
        };
        assert!(table_from_csv(file.path(), "t", &options).is_err());

        options.column_names = Some(vec!["name".into(), "age".into()]);
        let table = table_from_csv(file.path(), "t", &options).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1).unwrap().get_or_null("name"), json!("ada"));
    }

    #[test]
    fn custom_delimiter_and_types() {
        let file = write_csv("name;paid;score\nada;true;1.5\nbob;0;\n");
        let options = CsvOptions {
            delimiter: b';',
            column_types: Some(vec![
                ColumnType::Text,
                ColumnType::Boolean,
                ColumnType::Float,
            ]),
            ..CsvOptions::default()
        };
        let table = table_from_csv(file.path(), "t", &options).unwrap();
        assert_eq!(table.get(1).unwrap().get_or_null("paid"), json!(true));
        assert_eq!(table.get(1).unwrap().get_or_null("score"), json!(1.5));
        assert_eq!(table.get(2).unwrap().get_or_null("paid"), json!(false));
        // empty field casts to null regardless of declared type
        assert_eq!(table.get(2).unwrap().get_or_null("score"), Value::Null);
    }

    #[test]
    fn bad_cast_errors() {
        let file = write_csv("age\nnot-a-number\n");
        let options = CsvOptions {
            column_types: Some(vec![ColumnType::Integer]),
            ..CsvOptions::default()
        };
        let err = table_from_csv(file.path(), "t", &options).unwrap_err();
        assert!(matches!(err, DbError::InvalidFormat { .. }));
    }

    #[test]
    fn parallel_matches_serial() {
        let mut content = String::from("n\n");
        for i in 0..500 {
            content.push_str(&format!("{i}\n"));
        }
        let file = write_csv(&content);
        let types = Some(vec![ColumnType::Integer]);

        let serial = table_from_csv(
            file.path(),
            "t",
            &CsvOptions {
                column_types: types.clone(),
                ..CsvOptions::default()
            },
        )
        .unwrap();

        // tiny chunks force many splits
        let parallel = table_from_csv(
            file.path(),
            "t",
            &CsvOptions {
                column_types: types,
                parallel: true,
                max_chunk_size: 7,
                workers: 3,
                ..CsvOptions::default()
            },
        )
        .unwrap();

        assert_eq!(serial.len(), parallel.len());
        for (a, b) in serial.records().iter().zip(parallel.records()) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.data(), b.data());
        }
        assert_eq!(parallel.next_id(), 501);
    }

    #[test]
    fn chunk_boundaries_cover_and_align() {
        let body = b"aa\nbbbb\nc\n";
        let ranges = chunk_boundaries(body, 3);
        assert_eq!(ranges.first().map(|r| r.0), Some(0));
        assert_eq!(ranges.last().map(|r| r.1), Some(body.len()));
        for window in ranges.windows(2) {
            assert_eq!(window[0].1, window[1].0);
            // every interior boundary sits just after a newline
            assert_eq!(body[window[0].1 - 1], b'\n');
        }
    }
}
