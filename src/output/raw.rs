//! Raw writer: values concatenated with no delimiters. Intended for
//! single-column byte output, e.g. extracting a blob to a file.

use std::io::Write;

use crate::error::Result;
use crate::output::{format_value, RecordWriter};
use crate::record::{Record, RecordMeta, Value};

pub(crate) struct RawWriter {
    out: Box<dyn Write + Send>,
    meta: RecordMeta,
}

impl RawWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            meta: RecordMeta::default(),
        }
    }
}

impl RecordWriter for RawWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        Ok(())
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        for rec in recs {
            for (i, field) in self.meta.iter().enumerate() {
                match &rec[i] {
                    Value::Null => {}
                    Value::Bytes(b) => self.out.write_all(b)?,
                    other => self
                        .out
                        .write_all(format_value(other, field.kind).as_bytes())?,
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}
