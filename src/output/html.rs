//! HTML `<table>` writer.

use std::io::Write;

use crate::error::Result;
use crate::output::{format_value, RecordWriter};
use crate::record::{Record, RecordMeta};

pub(crate) struct HtmlWriter {
    out: Box<dyn Write + Send>,
    meta: RecordMeta,
}

impl HtmlWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            meta: RecordMeta::default(),
        }
    }
}

impl RecordWriter for HtmlWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        let mut buf = String::from("<table>\n  <thead>\n    <tr>");
        for field in &self.meta {
            buf.push_str("<th>");
            buf.push_str(&escape_html(&field.name));
            buf.push_str("</th>");
        }
        buf.push_str("</tr>\n  </thead>\n  <tbody>\n");
        self.out.write_all(buf.as_bytes())?;
        Ok(())
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        let mut buf = String::new();
        for rec in recs {
            buf.clear();
            buf.push_str("    <tr>");
            for (i, field) in self.meta.iter().enumerate() {
                buf.push_str("<td>");
                buf.push_str(&escape_html(&format_value(&rec[i], field.kind)));
                buf.push_str("</td>");
            }
            buf.push_str("</tr>\n");
            self.out.write_all(buf.as_bytes())?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.out.write_all(b"  </tbody>\n</table>\n")?;
        self.flush()
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
