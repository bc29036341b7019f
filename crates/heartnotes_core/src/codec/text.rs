//! Tab-delimited text backup format.
//!
//! # Responsibility
//! - Encode entries as `<count>/<total>\t<date>\t<escaped comment>` lines.
//! - Parse such lines back, stopping at the first malformed record.
//!
//! # Invariants
//! - Encoded comments never contain a raw newline or tab.
//! - Escaping is not reversible for comments that already hold the literal
//!   text `<br>` or `<tab>`; those come back as a newline or tab.
//! - Lines are emitted in caller order; parsing preserves file order.
//! - Dates use `MMM dd, yyyy HH:mm:ss Z` with whole-second precision.
//! - The reader yields nothing after its first error.

use crate::model::entry::{Entry, EntryDraft, EntryValidationError};
use chrono::{DateTime, FixedOffset, Local, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, BufRead, Write};

/// `MMM dd, yyyy HH:mm:ss Z`, e.g. `Jan 01, 2024 08:00:00 -0600`.
pub const DATE_FORMAT: &str = "%b %d, %Y %H:%M:%S %z";

const NEWLINE_TOKEN: &str = "<br>";
const TAB_TOKEN: &str = "<tab>";
const FIELD_COUNT: usize = 3;

/// Offset used when rendering `observed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateZone {
    /// The host's local offset at each instant.
    #[default]
    Local,
    Fixed(FixedOffset),
}

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    TokenCount { found: usize },
    /// Token 1 lacks a `/` or ends with it.
    CountTotal { field: String },
    Number { field: String },
    Date { field: String },
    Validation(EntryValidationError),
    /// The line could not be read as UTF-8 text.
    Unreadable(String),
}

/// Fatal error for one line of a text backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let line = self.line;
        match &self.kind {
            ParseErrorKind::TokenCount { found } => write!(
                f,
                "found {found} tokens for line {line}, should be {FIELD_COUNT} tokens"
            ),
            ParseErrorKind::CountTotal { field } => {
                write!(f, "count/total field is invalid on line {line}: |{field}|")
            }
            ParseErrorKind::Number { field } => {
                write!(f, "invalid number on line {line}: |{field}|")
            }
            ParseErrorKind::Date { field } => write!(f, "invalid date on line {line}: |{field}|"),
            ParseErrorKind::Validation(err) => write!(f, "invalid values on line {line}: {err}"),
            ParseErrorKind::Unreadable(message) => {
                write!(f, "cannot read line {line}: {message}")
            }
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            ParseErrorKind::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// One decoded backup line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub count: i64,
    pub total: i64,
    pub observed_at: i64,
    pub comment: String,
}

impl TextRecord {
    /// Draft for re-creating this record; imported rows are always edited.
    pub fn into_draft(self) -> EntryDraft {
        EntryDraft {
            observed_at: self.observed_at,
            count: self.count,
            total: self.total,
            edited: true,
            comment: self.comment,
        }
    }
}

/// Result of parsing a whole backup in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    pub records: Vec<TextRecord>,
    /// Physical lines read, comments and blanks included.
    pub lines_consumed: usize,
}

pub fn escape_comment(comment: &str) -> String {
    comment.replace('\n', NEWLINE_TOKEN).replace('\t', TAB_TOKEN)
}

pub fn unescape_comment(field: &str) -> String {
    field.replace(NEWLINE_TOKEN, "\n").replace(TAB_TOKEN, "\t")
}

/// Renders epoch milliseconds; `None` when outside the calendar range.
pub fn format_observed_at(epoch_ms: i64, zone: DateZone) -> Option<String> {
    let utc = DateTime::<Utc>::from_timestamp_millis(epoch_ms)?;
    let text = match zone {
        DateZone::Local => utc.with_timezone(&Local).format(DATE_FORMAT).to_string(),
        DateZone::Fixed(offset) => utc.with_timezone(&offset).format(DATE_FORMAT).to_string(),
    };
    Some(text)
}

/// Parses a rendered date back to epoch milliseconds.
pub fn parse_observed_at(text: &str) -> Option<i64> {
    DateTime::parse_from_str(text.trim(), DATE_FORMAT)
        .ok()
        .map(|date| date.timestamp_millis())
}

/// Encodes one entry as a line, without the trailing newline.
pub fn encode_line(entry: &Entry, zone: DateZone) -> Option<String> {
    let date = format_observed_at(entry.observed_at, zone)?;
    Some(format!(
        "{}/{}\t{}\t{}",
        entry.count,
        entry.total,
        date,
        escape_comment(&entry.comment)
    ))
}

/// Parses one physical line.
///
/// Returns `Ok(None)` for blank lines and `#` comment lines.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<TextRecord>, ParseError> {
    let fail = |kind: ParseErrorKind| ParseError {
        line: line_no,
        kind,
    };

    if line.trim().is_empty() {
        return Ok(None);
    }
    let tokens: Vec<&str> = line.split('\t').collect();
    if tokens[0].trim().starts_with('#') {
        return Ok(None);
    }
    let [count_total, date, comment] = tokens.as_slice() else {
        return Err(fail(ParseErrorKind::TokenCount {
            found: tokens.len(),
        }));
    };

    let count_total = count_total.trim();
    let slash = match count_total.find('/') {
        Some(index) if index + 1 < count_total.len() => index,
        _ => {
            return Err(fail(ParseErrorKind::CountTotal {
                field: count_total.to_string(),
            }));
        }
    };
    let count = parse_number(&count_total[..slash]).map_err(&fail)?;
    let total = parse_number(&count_total[slash + 1..]).map_err(&fail)?;
    let observed_at = parse_observed_at(date).ok_or_else(|| {
        fail(ParseErrorKind::Date {
            field: date.trim().to_string(),
        })
    })?;

    let record = TextRecord {
        count,
        total,
        observed_at,
        comment: unescape_comment(comment),
    };
    record
        .clone()
        .into_draft()
        .validate()
        .map_err(|err| fail(ParseErrorKind::Validation(err)))?;
    Ok(Some(record))
}

fn parse_number(field: &str) -> Result<i64, ParseErrorKind> {
    field
        .trim()
        .parse::<i64>()
        .map_err(|_| ParseErrorKind::Number {
            field: field.trim().to_string(),
        })
}

/// Streaming line-by-line reader over a text backup.
///
/// Yields `(line_no, record)` for every data line and stops for good after
/// the first error.
pub struct TextReader<R> {
    reader: R,
    buffer: String,
    lines_read: usize,
    done: bool,
}

impl<R: BufRead> TextReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            lines_read: 0,
            done: false,
        }
    }

    /// Physical lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}

impl<R: BufRead> Iterator for TextReader<R> {
    type Item = Result<(usize, TextRecord), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buffer.clear();
            let read = match self.reader.read_line(&mut self.buffer) {
                Ok(read) => read,
                Err(err) => {
                    self.done = true;
                    return Some(Err(ParseError {
                        line: self.lines_read + 1,
                        kind: ParseErrorKind::Unreadable(err.to_string()),
                    }));
                }
            };
            if read == 0 {
                self.done = true;
                break;
            }
            self.lines_read += 1;

            let line = self.buffer.trim_end_matches('\n').trim_end_matches('\r');
            match parse_line(line, self.lines_read) {
                Ok(Some(record)) => return Some(Ok((self.lines_read, record))),
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

/// Parses a complete in-memory backup.
pub fn parse_text(text: &str) -> Result<ParsedText, ParseError> {
    let mut reader = TextReader::new(text.as_bytes());
    let mut records = Vec::new();
    for item in reader.by_ref() {
        let (_, record) = item?;
        records.push(record);
    }
    Ok(ParsedText {
        records,
        lines_consumed: reader.lines_read(),
    })
}

/// Line writer for text backups.
pub struct TextWriter<W: Write> {
    writer: W,
    zone: DateZone,
    lines_written: usize,
}

impl<W: Write> TextWriter<W> {
    pub fn new(writer: W, zone: DateZone) -> Self {
        Self {
            writer,
            zone,
            lines_written: 0,
        }
    }

    pub fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
        let line = encode_line(entry, self.zone).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry {} has an unrepresentable date", entry.id),
            )
        })?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.lines_written += 1;
        Ok(())
    }

    /// Flushes and returns the number of lines written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.lines_written)
    }
}

/// Writes `entries` in iteration order and returns the line count.
pub fn write_entries<'a, W, I>(writer: W, entries: I, zone: DateZone) -> io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Entry>,
{
    let mut text = TextWriter::new(writer, zone);
    for entry in entries {
        text.write_entry(entry)?;
    }
    text.finish()
}
