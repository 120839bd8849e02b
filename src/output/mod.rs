//! Writers: consumers that format the record stream.
//!
//! Every output format implements [`RecordWriter`]: `open` is called exactly
//! once with the record meta, then batches of records arrive via
//! `write_records`, and `close` (which implies a final `flush`) ends the
//! stream. Writers must not reorder records.
//!
//! Formats and their encodings:
//!
//! | Format | Encoding notes |
//! |--------|----------------|
//! | `table` | aligned text grid, null as empty cell |
//! | `markdown`, `html` | tabular markup, escaped |
//! | `json` | array of objects; `jsona` array rows; `jsonl` object lines |
//! | `csv`, `tsv` | RFC-4180-style, quoting only as required |
//! | `xlsx` | one worksheet |
//! | `xml` | `<records><record>…</record></records>` |
//! | `raw` | values concatenated with no delimiters |
//!
//! Times are ISO-8601 in UTC; the column kind picks the precision
//! (`datetime`, `date`, or `time`).

mod csv;
mod html;
mod json;
mod markdown;
mod raw;
mod table;
mod xlsx;
mod xml;

use std::io::Write;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::record::{Record, RecordMeta, Value};

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S";

/// A consumer of the record stream that renders to an output stream.
pub trait RecordWriter: Send {
    /// Called exactly once, before any records. Subsequent records match
    /// `meta` positionally.
    fn open(&mut self, meta: &RecordMeta) -> Result<()>;

    fn write_records(&mut self, recs: &[Record]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Ends the output. Implies a final flush.
    fn close(&mut self) -> Result<()>;
}

/// The output formats the query command can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Jsona,
    Jsonl,
    Table,
    Raw,
    Html,
    Markdown,
    Xlsx,
    Xml,
    Csv,
    Tsv,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Jsona => "jsona",
            Format::Jsonl => "jsonl",
            Format::Table => "table",
            Format::Raw => "raw",
            Format::Html => "html",
            Format::Markdown => "markdown",
            Format::Xlsx => "xlsx",
            Format::Xml => "xml",
            Format::Csv => "csv",
            Format::Tsv => "tsv",
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "jsona" => Ok(Format::Jsona),
            "jsonl" => Ok(Format::Jsonl),
            "table" => Ok(Format::Table),
            "raw" => Ok(Format::Raw),
            "html" => Ok(Format::Html),
            "markdown" | "md" => Ok(Format::Markdown),
            "xlsx" => Ok(Format::Xlsx),
            "xml" => Ok(Format::Xml),
            "csv" => Ok(Format::Csv),
            "tsv" => Ok(Format::Tsv),
            other => Err(Error::InvalidOption(format!("unknown format: {other}"))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation options shared by the writers.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Include a header row where the format supports one.
    pub header: bool,
    /// Pretty-print where the format supports it.
    pub pretty: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            header: true,
            pretty: false,
        }
    }
}

/// Constructs the writer for `format` over `out`.
pub fn new_writer(
    format: Format,
    out: Box<dyn Write + Send>,
    opts: WriterOptions,
) -> Box<dyn RecordWriter + Send> {
    match format {
        Format::Json => Box::new(json::JsonWriter::new(json::Mode::Objects, out, opts)),
        Format::Jsona => Box::new(json::JsonWriter::new(json::Mode::Arrays, out, opts)),
        Format::Jsonl => Box::new(json::JsonWriter::new(json::Mode::Lines, out, opts)),
        Format::Table => Box::new(table::TableWriter::new(out, opts)),
        Format::Raw => Box::new(raw::RawWriter::new(out)),
        Format::Html => Box::new(html::HtmlWriter::new(out)),
        Format::Markdown => Box::new(markdown::MarkdownWriter::new(out)),
        Format::Xlsx => Box::new(xlsx::XlsxWriter::new(out, opts)),
        Format::Xml => Box::new(xml::XmlWriter::new(out, opts)),
        Format::Csv => Box::new(csv::CsvWriter::new(out, b',', opts)),
        Format::Tsv => Box::new(csv::CsvWriter::new(out, b'\t', opts)),
    }
}

/// Plain-text rendering of a value for the tabular family: nulls become the
/// empty string, times format by the column's kind, bytes become base64.
pub(crate) fn format_value(val: &Value, kind: Kind) -> String {
    match val {
        Value::Null => String::new(),
        Value::Text(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
        Value::Datetime(dt) => match kind {
            Kind::Date => dt.format(DATE_FORMAT).to_string(),
            Kind::Time => dt.format(TIME_FORMAT).to_string(),
            _ => dt.format(DATETIME_FORMAT).to_string(),
        },
        Value::Date(d) => d.format(DATE_FORMAT).to_string(),
        Value::Time(t) => t.format(TIME_FORMAT).to_string(),
    }
}
