//! Markdown table writer. Streams: the header goes out on open, each record
//! as one `| … |` row.

use std::io::Write;

use crate::error::Result;
use crate::output::{format_value, RecordWriter};
use crate::record::{Record, RecordMeta};

pub(crate) struct MarkdownWriter {
    out: Box<dyn Write + Send>,
    meta: RecordMeta,
}

impl MarkdownWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            meta: RecordMeta::default(),
        }
    }
}

impl RecordWriter for MarkdownWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        let mut buf = String::new();
        for field in &self.meta {
            buf.push_str("| ");
            buf.push_str(&escape_markdown(&field.name));
            buf.push(' ');
        }
        buf.push_str("|\n");
        for _ in &self.meta {
            buf.push_str("| --- ");
        }
        buf.push_str("|\n");
        self.out.write_all(buf.as_bytes())?;
        Ok(())
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        let mut buf = String::new();
        for rec in recs {
            buf.clear();
            for (i, field) in self.meta.iter().enumerate() {
                buf.push_str("| ");
                buf.push_str(&escape_markdown(&format_value(&rec[i], field.kind)));
                buf.push(' ');
            }
            buf.push_str("|\n");
            self.out.write_all(buf.as_bytes())?;
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

fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("<br>"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_pipes_and_markup() {
        assert_eq!(escape_markdown("a|b"), "a\\|b");
        assert_eq!(escape_markdown("<i>&</i>"), "&lt;i&gt;&amp;&lt;/i&gt;");
    }
}
