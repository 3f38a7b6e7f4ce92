//! Access-log line tokenizer.
//!
//! A record is a run of fields terminated by `\n`. Fields are separated by
//! spaces or tabs and come in three shapes:
//!
//! * bare: `REST.GET.OBJECT`
//! * bracketed: `[06/Feb/2019:00:00:38 +0000]`
//! * quoted: `"GET /bucket?versioning HTTP/1.1"`
//!
//! Delimiters are stripped and there is no escape handling. Bracketed and
//! quoted content is taken verbatim up to the matching closer, newlines
//! included, so an unterminated field swallows the rest of the input and is
//! reported as [`Error::MalformedField`] for the final record.

use std::io::{self, BufRead};

use crate::{Error, Result};

/// One tokenized log record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogLine {
    fields: Vec<String>,
}

impl LogLine {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}

impl<S: Into<String>> FromIterator<S> for LogLine {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Single forward pass over a byte stream, yielding one [`LogLine`] per
/// non-empty record.
///
/// The iterator fuses after the first error: an I/O failure or a malformed
/// field leaves nothing meaningful to read.
pub struct Scanner<R> {
    reader: R,
    records: usize,
    finished: bool,
}

/// Tokenize an in-memory buffer.
pub fn tokenize(input: &[u8]) -> Scanner<&[u8]> {
    Scanner::new(input)
}

impl<R: BufRead> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            records: 0,
            finished: false,
        }
    }

    /// Number of records emitted so far.
    pub fn records(&self) -> usize {
        self.records
    }

    fn scan_record(&mut self) -> Result<Option<LogLine>> {
        let mut fields = Vec::new();
        loop {
            match self.peek()? {
                None => {
                    return Ok((!fields.is_empty()).then(|| LogLine::new(fields)));
                }
                Some(byte) if is_separator(byte) => self.reader.consume(1),
                Some(b'\n') => {
                    self.reader.consume(1);
                    if !fields.is_empty() {
                        return Ok(Some(LogLine::new(fields)));
                    }
                }
                Some(open @ (b'"' | b'[')) => {
                    self.reader.consume(1);
                    let close = if open == b'"' { b'"' } else { b']' };
                    let mut content = Vec::new();
                    match self.read_until(|byte| byte == close, &mut content)? {
                        Some(_) => {
                            self.reader.consume(1);
                            fields.push(into_field(content));
                        }
                        None => {
                            return Err(Error::MalformedField {
                                record: self.records + 1,
                                partial: into_field(content),
                            });
                        }
                    }
                }
                Some(_) => {
                    let mut content = Vec::new();
                    self.read_until(|byte| is_separator(byte) || byte == b'\n', &mut content)?;
                    fields.push(into_field(content));
                }
            }
        }
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Append bytes to `out` until `stop` matches. The stop byte is left
    /// unconsumed and returned; `None` means end of input.
    fn read_until(
        &mut self,
        stop: impl Fn(u8) -> bool,
        out: &mut Vec<u8>,
    ) -> io::Result<Option<u8>> {
        loop {
            let (used, found) = {
                let available = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                };
                if available.is_empty() {
                    return Ok(None);
                }
                match available.iter().position(|&byte| stop(byte)) {
                    Some(index) => {
                        out.extend_from_slice(&available[..index]);
                        (index, Some(available[index]))
                    }
                    None => {
                        out.extend_from_slice(available);
                        (available.len(), None)
                    }
                }
            };
            self.reader.consume(used);
            if found.is_some() {
                return Ok(found);
            }
        }
    }
}

impl<R: BufRead> Iterator for Scanner<R> {
    type Item = Result<LogLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.scan_record() {
            Ok(Some(line)) => {
                self.records += 1;
                Some(Ok(line))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

// `\r` is folded into the separators so CRLF logs tokenize like LF logs.
fn is_separator(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r')
}

fn into_field(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(field) => field,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &str) -> Vec<Vec<String>> {
        tokenize(input.as_bytes())
            .map(|line| line.expect("line").into_fields())
            .collect()
    }

    #[test]
    fn splits_bare_bracketed_and_quoted_fields() {
        let input = r#"owner bucket [06/Feb/2019:00:00:38 +0000] 192.0.2.3 "GET /bucket?acl HTTP/1.1" 200 "-""#;
        assert_eq!(
            lines(input),
            vec![vec![
                "owner",
                "bucket",
                "06/Feb/2019:00:00:38 +0000",
                "192.0.2.3",
                "GET /bucket?acl HTTP/1.1",
                "200",
                "-",
            ]]
        );
    }

    #[test]
    fn collapses_separator_runs_and_skips_blank_lines() {
        let input = "\n\n  a\t\tb   c\n\t \n d\n";
        assert_eq!(lines(input), vec![vec!["a", "b", "c"], vec!["d"]]);
    }

    #[test]
    fn final_record_without_newline_keeps_last_field() {
        assert_eq!(lines("a b\nc d"), vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn crlf_terminated_records() {
        assert_eq!(lines("a b\r\nc\r\n"), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn quoted_content_is_verbatim() {
        let input = "\"a [b] c\" [x \"y\" z]\n";
        assert_eq!(lines(input), vec![vec!["a [b] c", "x \"y\" z"]]);
    }

    #[test]
    fn empty_quotes_yield_empty_field() {
        assert_eq!(lines("a \"\" b\n"), vec![vec!["a", "", "b"]]);
    }

    #[test]
    fn unterminated_quote_is_malformed() {
        let mut scanner = tokenize(b"a b\nc \"never closed\nd e");
        assert_eq!(
            scanner.next().expect("first").expect("ok").into_fields(),
            vec!["a", "b"]
        );
        match scanner.next() {
            Some(Err(Error::MalformedField { record, partial })) => {
                assert_eq!(record, 2);
                assert_eq!(partial, "never closed\nd e");
            }
            other => panic!("expected malformed field, got {other:?}"),
        }
        assert!(scanner.next().is_none());
    }

    #[test]
    fn unterminated_bracket_is_malformed() {
        let result: Vec<_> = tokenize(b"[06/Feb/2019").collect();
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Err(Error::MalformedField { record: 1, .. })));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert_eq!(tokenize(b"").count(), 0);
        assert_eq!(tokenize(b" \n\t\n").count(), 0);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let fields = tokenize(b"ok \xff\xfe\n")
            .next()
            .expect("line")
            .expect("ok")
            .into_fields();
        assert_eq!(fields[0], "ok");
        assert_eq!(fields[1], "\u{fffd}\u{fffd}");
    }

    #[test]
    fn small_buffer_reads_match_whole_reads() {
        let input = "alpha [b r a c k e t] \"q u o t e\" omega\nsecond line\n";
        let reader = std::io::BufReader::with_capacity(3, input.as_bytes());
        let chunked: Vec<_> = Scanner::new(reader)
            .map(|line| line.expect("line").into_fields())
            .collect();
        assert_eq!(chunked, lines(input));
    }

    #[test]
    fn counts_emitted_records() {
        let mut scanner = tokenize(b"a\nb\n\nc");
        while scanner.next().is_some() {}
        assert_eq!(scanner.records(), 3);
    }
}
