//! Row source: delimited text files, optionally gzip-compressed

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;

use crate::config::FileSchema;
use crate::error::Result;

/// One input row with its 1-based source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line: u64,
    pub fields: Vec<String>,
}

impl Row {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }
}

/// Boxed row iterator handed to the pipeline's producer stage
pub type RowSource = Box<dyn Iterator<Item = Result<Row>> + Send>;

pub struct RowReader {
    inner: csv::Reader<Box<dyn Read + Send>>,
    header: Option<Vec<String>>,
    record: StringRecord,
}

impl RowReader {
    /// Open `schema.filename`; `.gz` files are decompressed on the fly.
    pub fn open(schema: &FileSchema) -> Result<Self> {
        let path = Path::new(&schema.filename);
        let file = File::open(path)?;
        let reader: Box<dyn Read + Send> = if path.extension().and_then(|s| s.to_str()) == Some("gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::from_reader(reader, schema)
    }

    pub fn from_reader(reader: Box<dyn Read + Send>, schema: &FileSchema) -> Result<Self> {
        let mut inner = ReaderBuilder::new()
            .delimiter(schema.delimiter()?)
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut record = StringRecord::new();
        let header = if schema.header {
            if inner.read_record(&mut record)? {
                Some(record.iter().map(|s| s.trim().to_string()).collect())
            } else {
                Some(Vec::new())
            }
        } else {
            None
        };

        tracing::debug!("opened {} (header: {:?})", schema.filename, header);
        Ok(Self { inner, header, record })
    }

    /// Header row, when the schema declares one
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn into_source(self) -> RowSource {
        Box::new(self)
    }
}

impl Iterator for RowReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_record(&mut self.record) {
            Ok(true) => {
                let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                let fields = self.record.iter().map(str::to_string).collect();
                Some(Ok(Row::new(line, fields)))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// In-memory rows, numbered from 1
pub fn rows_from_vec(rows: Vec<Vec<String>>) -> RowSource {
    Box::new(
        rows.into_iter()
            .enumerate()
            .map(|(i, fields)| Ok(Row::new(i as u64 + 1, fields))),
    )
}
