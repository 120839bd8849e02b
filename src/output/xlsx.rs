//! XLSX workbook writer. Builds one worksheet in memory and saves the
//! workbook on close.

use std::io::Write;

use rust_xlsxwriter::Workbook;

use crate::error::{Error, Result};
use crate::output::{format_value, RecordWriter, WriterOptions};
use crate::record::{Record, RecordMeta, Value};

pub(crate) struct XlsxWriter {
    out: Box<dyn Write + Send>,
    header: bool,
    meta: RecordMeta,
    workbook: Workbook,
    next_row: u32,
}

impl XlsxWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>, opts: WriterOptions) -> Self {
        Self {
            out,
            header: opts.header,
            meta: RecordMeta::default(),
            workbook: Workbook::new(),
            next_row: 0,
        }
    }
}

fn write_err(e: rust_xlsxwriter::XlsxError) -> Error {
    Error::Write(e.to_string())
}

impl RecordWriter for XlsxWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        let sheet = self.workbook.add_worksheet();
        if self.header {
            for (col, field) in meta.iter().enumerate() {
                sheet
                    .write_string(0, col as u16, field.name.as_str())
                    .map_err(write_err)?;
            }
            self.next_row = 1;
        }
        Ok(())
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        let sheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(write_err)?;
        for rec in recs {
            for (i, field) in self.meta.iter().enumerate() {
                let col = i as u16;
                match &rec[i] {
                    Value::Null => {}
                    Value::Int(n) => {
                        sheet
                            .write_number(self.next_row, col, *n as f64)
                            .map_err(write_err)?;
                    }
                    Value::Float(f) => {
                        sheet
                            .write_number(self.next_row, col, *f)
                            .map_err(write_err)?;
                    }
                    Value::Bool(b) => {
                        sheet
                            .write_boolean(self.next_row, col, *b)
                            .map_err(write_err)?;
                    }
                    other => {
                        sheet
                            .write_string(self.next_row, col, format_value(other, field.kind))
                            .map_err(write_err)?;
                    }
                }
            }
            self.next_row += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let bytes = self.workbook.save_to_buffer().map_err(write_err)?;
        self.out.write_all(&bytes)?;
        self.out.flush()?;
        Ok(())
    }
}
