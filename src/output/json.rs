//! JSON-family writers: `json` (array of objects), `jsona` (array rows),
//! and `jsonl` (one object per line).
//!
//! The encoder is hand-rolled because the contract is stricter than a stock
//! serializer: `<`, `>`, and `&` are always `\u00XX`-escaped, U+2028 and
//! U+2029 are always escaped (they are legal JSON but break JavaScript
//! embedding), and bytes are base64 strings. Numbers pass through
//! unquoted; non-finite floats encode as null.

use std::io::Write;

use base64::Engine;

use crate::error::Result;
use crate::kind::Kind;
use crate::output::{RecordWriter, WriterOptions, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use crate::record::{Record, RecordMeta, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// `json`: one array containing one object per record.
    Objects,
    /// `jsona`: one line per record, each an array of values.
    Arrays,
    /// `jsonl`: one line per record, each an object.
    Lines,
}

pub(crate) struct JsonWriter {
    mode: Mode,
    out: Box<dyn Write + Send>,
    pretty: bool,
    meta: RecordMeta,
    /// Pre-encoded field names, including the quotes.
    keys: Vec<String>,
    written: u64,
}

impl JsonWriter {
    pub(crate) fn new(mode: Mode, out: Box<dyn Write + Send>, opts: WriterOptions) -> Self {
        Self {
            mode,
            out,
            pretty: opts.pretty,
            meta: RecordMeta::default(),
            keys: Vec::new(),
            written: 0,
        }
    }

    fn encode_record(&self, buf: &mut String, rec: &Record) {
        match self.mode {
            Mode::Arrays => {
                buf.push('[');
                for (i, field) in self.meta.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(", ");
                    }
                    encode_value(buf, rec.get(i).unwrap_or(&Value::Null), field.kind);
                }
                buf.push(']');
            }
            Mode::Objects | Mode::Lines => {
                let (open, sep, close) = if self.pretty && self.mode == Mode::Objects {
                    ("{\n", ",\n", "\n  }")
                } else {
                    ("{", ", ", "}")
                };
                buf.push_str(open);
                for (i, field) in self.meta.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(sep);
                    }
                    if self.pretty && self.mode == Mode::Objects {
                        buf.push_str("    ");
                    }
                    buf.push_str(&self.keys[i]);
                    buf.push_str(": ");
                    encode_value(buf, rec.get(i).unwrap_or(&Value::Null), field.kind);
                }
                buf.push_str(close);
            }
        }
    }
}

impl RecordWriter for JsonWriter {
    fn open(&mut self, meta: &RecordMeta) -> Result<()> {
        self.meta = meta.clone();
        self.keys = meta
            .iter()
            .map(|f| {
                let mut k = String::new();
                encode_string(&mut k, &f.name);
                k
            })
            .collect();
        if self.mode == Mode::Objects {
            self.out.write_all(b"[")?;
        }
        Ok(())
    }

    fn write_records(&mut self, recs: &[Record]) -> Result<()> {
        let mut buf = String::new();
        for rec in recs {
            buf.clear();
            match self.mode {
                Mode::Objects => {
                    if self.written > 0 {
                        buf.push(',');
                    }
                    if self.pretty {
                        buf.push_str("\n  ");
                    }
                    self.encode_record(&mut buf, rec);
                }
                Mode::Arrays | Mode::Lines => {
                    self.encode_record(&mut buf, rec);
                    buf.push('\n');
                }
            }
            self.out.write_all(buf.as_bytes())?;
            self.written += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.mode == Mode::Objects {
            if self.pretty && self.written > 0 {
                self.out.write_all(b"\n")?;
            }
            self.out.write_all(b"]\n")?;
        }
        self.flush()
    }
}

fn encode_value(buf: &mut String, val: &Value, kind: Kind) {
    match val {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => buf.push_str(&n.to_string()),
        Value::Float(f) if f.is_finite() => buf.push_str(&f.to_string()),
        Value::Float(_) => buf.push_str("null"),
        Value::Decimal(d) => buf.push_str(&d.to_string()),
        Value::Bytes(b) => {
            buf.push('"');
            buf.push_str(&base64::engine::general_purpose::STANDARD.encode(b));
            buf.push('"');
        }
        Value::Datetime(dt) => {
            let fmt = match kind {
                Kind::Date => DATE_FORMAT,
                Kind::Time => TIME_FORMAT,
                _ => DATETIME_FORMAT,
            };
            buf.push('"');
            buf.push_str(&dt.format(fmt).to_string());
            buf.push('"');
        }
        Value::Date(d) => {
            buf.push('"');
            buf.push_str(&d.format(DATE_FORMAT).to_string());
            buf.push('"');
        }
        Value::Time(t) => {
            buf.push('"');
            buf.push_str(&t.format(TIME_FORMAT).to_string());
            buf.push('"');
        }
        Value::Text(s) => encode_string(buf, s),
    }
}

/// JSON string encoding with unconditional escaping of `<`, `>`, `&`,
/// U+2028, and U+2029.
fn encode_string(buf: &mut String, s: &str) {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '<' | '>' | '&' => {
                let b = c as u32;
                buf.push_str("\\u00");
                buf.push(HEX[(b >> 4) as usize] as char);
                buf.push(HEX[(b & 0xf) as usize] as char);
            }
            c if (c as u32) < 0x20 => {
                let b = c as u32;
                buf.push_str("\\u00");
                buf.push(HEX[(b >> 4) as usize] as char);
                buf.push(HEX[(b & 0xf) as usize] as char);
            }
            '\u{2028}' => buf.push_str("\\u2028"),
            '\u{2029}' => buf.push_str("\\u2029"),
            c => buf.push(c),
        }
    }
    buf.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldMeta;

    fn encode(s: &str) -> String {
        let mut buf = String::new();
        encode_string(&mut buf, s);
        buf
    }

    #[test]
    fn escapes_html_and_line_separators() {
        assert_eq!(encode("a<b>&c"), "\"a\\u003cb\\u003e\\u0026c\"");
        assert_eq!(encode("x\u{2028}y\u{2029}"), "\"x\\u2028y\\u2029\"");
        for forbidden in ['<', '>', '&', '\u{2028}', '\u{2029}'] {
            assert!(!encode(&format!("a{forbidden}b")).contains(forbidden));
        }
    }

    #[test]
    fn round_trips_through_a_decoder() {
        let cases = [
            "plain",
            "with \"quotes\" and \\slashes\\",
            "tabs\tnewlines\nand\rreturns",
            "html <tag> & entity",
            "unicode \u{2028}\u{2029} päronträd",
        ];
        for case in cases {
            let decoded: String = serde_json::from_str(&encode(case)).unwrap();
            assert_eq!(decoded, case, "{case:?}");
        }
    }

    #[test]
    fn scalar_values_round_trip() {
        let meta = [
            FieldMeta::new("i", Kind::Int),
            FieldMeta::new("f", Kind::Float),
            FieldMeta::new("b", Kind::Bool),
            FieldMeta::new("s", Kind::Text),
        ];
        let rec = [
            Value::Int(-3),
            Value::Float(1.25),
            Value::Bool(true),
            Value::Text("x".to_string()),
        ];
        let mut buf = String::new();
        buf.push('[');
        for (i, (v, m)) in rec.iter().zip(&meta).enumerate() {
            if i > 0 {
                buf.push(',');
            }
            encode_value(&mut buf, v, m.kind);
        }
        buf.push(']');
        let parsed: serde_json::Value = serde_json::from_str(&buf).unwrap();
        assert_eq!(parsed[0], serde_json::json!(-3));
        assert_eq!(parsed[1], serde_json::json!(1.25));
        assert_eq!(parsed[2], serde_json::json!(true));
        assert_eq!(parsed[3], serde_json::json!("x"));
    }

    #[test]
    fn jsonl_emits_one_object_per_line() {
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut w = JsonWriter::new(
            Mode::Lines,
            Box::new(SharedBuf(sink.clone())),
            WriterOptions::default(),
        );
        let meta = vec![FieldMeta::new("n", Kind::Int)];
        w.open(&meta).unwrap();
        w.write_records(&[vec![Value::Int(1)], vec![Value::Int(2)]])
            .unwrap();
        w.close().unwrap();

        let out = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, [r#"{"n": 1}"#, r#"{"n": 2}"#]);
    }

    struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
