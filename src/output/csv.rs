//! CSV and TSV writers. Quoting is left to the encoder, which quotes only
//! when the field requires it.

use std::io::Write;

use csv::WriterBuilder;

use crate::error::{Error, Result};
use crate::output::{format_value, RecordWriter, WriterOptions};
use crate::record::{Record, RecordMeta};

pub(crate) struct CsvWriter {
    inner: csv::Writer<Box<dyn Write + Send>>,
    header: bool,
    meta: RecordMeta,
}

impl CsvWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>, delimiter: u8, opts: WriterOptions) -> Self {
        Self {
            inner: WriterBuilder::new().delimiter(delimiter).from_writer(out),
            header: opts.header,
            meta: RecordMeta::default(),
        }
    }
}

impl RecordWriter for CsvWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        if self.header {
            self.inner
                .write_record(self.meta.iter().map(|f| f.name.as_str()))
                .map_err(|e| Error::Write(e.to_string()))?;
        }
        Ok(())
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        for rec in recs {
            let fields: Vec<String> = self
                .meta
                .iter()
                .enumerate()
                .map(|(i, f)| format_value(&rec[i], f.kind))
                .collect();
            self.inner
                .write_record(&fields)
                .map_err(|e| Error::Write(e.to_string()))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}
