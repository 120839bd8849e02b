//! Aligned text-grid writer.
//!
//! Column alignment needs the full result set, so rows buffer until close
//! and render in one pass.

use std::io::Write;

use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

use crate::error::Result;
use crate::output::{format_value, RecordWriter, WriterOptions};
use crate::record::{Record, RecordMeta};

pub(crate) struct TableWriter {
    out: Box<dyn Write + Send>,
    header: bool,
    meta: RecordMeta,
    rows: Vec<Vec<String>>,
}

impl TableWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>, opts: WriterOptions) -> Self {
        Self {
            out,
            header: opts.header,
            meta: RecordMeta::default(),
            rows: Vec::new(),
        }
    }
}

impl RecordWriter for TableWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        Ok(())
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        for rec in recs {
            let row = self
                .meta
                .iter()
                .enumerate()
                .map(|(i, f)| format_value(&rec[i], f.kind))
                .collect();
            self.rows.push(row);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if self.header {
            table.set_header(self.meta.iter().map(|f| f.name.clone()));
        }
        for row in self.rows.drain(..) {
            table.add_row(row);
        }
        writeln!(self.out, "{table}")?;
        self.flush()
    }
}
