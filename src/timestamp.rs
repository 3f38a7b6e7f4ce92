//! Chronological ordering of log lines.

use time::macros::format_description;
use time::OffsetDateTime;

use crate::scanner::LogLine;
use crate::{Error, Result};

/// Field holding the request time, e.g. `06/Feb/2019:00:00:38 +0000`.
pub const TIMESTAMP_FIELD: usize = 2;

pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime> {
    let format = format_description!(
        "[day]/[month repr:short]/[year]:[hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
    );
    OffsetDateTime::parse(value, &format).map_err(|err| Error::Timestamp {
        value: value.to_string(),
        reason: err.to_string(),
    })
}

/// Timestamp of one line. `index` is only used to report a missing field.
pub fn line_timestamp(line: &LogLine, index: usize) -> Result<OffsetDateTime> {
    let value = line
        .get(TIMESTAMP_FIELD)
        .ok_or(Error::MissingTimestamp { line: index })?;
    parse_timestamp(value)
}

/// Sort lines by instant.
///
/// Every timestamp is parsed before anything moves, so one bad line fails
/// the whole batch instead of leaving it half ordered.
pub fn sort_lines(lines: Vec<LogLine>) -> Result<Vec<LogLine>> {
    let mut keyed = Vec::with_capacity(lines.len());
    for (index, line) in lines.into_iter().enumerate() {
        let instant = line_timestamp(&line, index)?;
        keyed.push((instant, line));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, line)| line).collect())
}
