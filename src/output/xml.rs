//! XML writer: `<records>` wrapping one `<record>` element per row, with a
//! child element per column. Column names are sanitized into valid element
//! names; nulls render as empty elements.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};
use crate::output::{format_value, RecordWriter, WriterOptions};
use crate::record::{Record, RecordMeta};

pub(crate) struct XmlWriter {
    inner: quick_xml::Writer<Box<dyn Write + Send>>,
    meta: RecordMeta,
    names: Vec<String>,
}

impl XmlWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>, opts: WriterOptions) -> Self {
        let inner = if opts.pretty {
            quick_xml::Writer::new_with_indent(out, b' ', 2)
        } else {
            quick_xml::Writer::new(out)
        };
        Self {
            inner,
            meta: RecordMeta::default(),
            names: Vec::new(),
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<()> {
        self.inner
            .write_event(event)
            .map_err(|e| Error::Write(e.to_string()))
    }
}

impl RecordWriter for XmlWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        self.names = meta.iter().map(|f| element_name(&f.name)).collect();
        self.emit(Event::Start(BytesStart::new("records")))
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        for rec in recs {
            self.emit(Event::Start(BytesStart::new("record")))?;
            for i in 0..self.meta.len() {
                let name = self.names[i].clone();
                let text = format_value(&rec[i], self.meta[i].kind);
                self.emit(Event::Start(BytesStart::new(name.as_str())))?;
                if !text.is_empty() {
                    self.emit(Event::Text(BytesText::new(&text)))?;
                }
                self.emit(Event::End(BytesEnd::new(name.as_str())))?;
            }
            self.emit(Event::End(BytesEnd::new("record")))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.get_mut().flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.emit(Event::End(BytesEnd::new("records")))?;
        self.inner.get_mut().write_all(b"\n")?;
        self.flush()
    }
}

/// Column name as a valid XML element name: anything outside
/// `[A-Za-z0-9_-]` becomes `_`, and a leading digit is prefixed.
fn element_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) || out.starts_with('-') {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_names_are_sanitized() {
        assert_eq!(element_name("first name"), "first_name");
        assert_eq!(element_name("2nd"), "_2nd");
        assert_eq!(element_name(""), "_");
    }
}
