//! Output sinks receiving one sorted day at a time.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::scanner::LogLine;
use crate::{Error, Result};

/// Persists a fully sorted day.
pub trait DaySink {
    /// Write `lines` for `day` and return where they went.
    fn write_day(&mut self, day: &str, lines: &[LogLine]) -> Result<String>;
}

/// Writes `<dir>/<day>.csv.gz`, one CSV record per log line.
///
/// The archive is written to `<day>.csv.gz.tmp` and renamed into place, so
/// a crashed run never leaves a truncated archive under the final name.
#[derive(Debug, Clone)]
pub struct GzipCsvSink {
    dir: PathBuf,
    level: Compression,
}

impl GzipCsvSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            level: Compression::default(),
        })
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    pub fn path_for(&self, day: &str) -> PathBuf {
        self.dir.join(format!("{day}.csv.gz"))
    }

    fn write_archive(&self, tmp: &Path, lines: &[LogLine]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp)?;
        let encoder = GzEncoder::new(BufWriter::new(file), self.level);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(encoder);
        for line in lines {
            writer.write_record(line.fields()).map_err(csv_error)?;
        }
        let encoder = writer
            .into_inner()
            .map_err(|err| Error::Sink(format!("flush csv: {err}")))?;
        let buffered = encoder.finish()?;
        let file = buffered
            .into_inner()
            .map_err(|err| Error::Io(err.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

impl DaySink for GzipCsvSink {
    fn write_day(&mut self, day: &str, lines: &[LogLine]) -> Result<String> {
        if day.is_empty() || day.contains(['/', '\\']) || day == "." || day == ".." {
            return Err(Error::Sink(format!("day token {day:?} is not a file name")));
        }
        let path = self.path_for(day);
        let tmp = path.with_file_name(format!("{day}.csv.gz.tmp"));
        let _ = std::fs::remove_file(&tmp);

        if let Err(err) = self.write_archive(&tmp, lines) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        std::fs::rename(&tmp, &path)?;
        File::open(&self.dir)?.sync_all()?;
        Ok(path.display().to_string())
    }
}

fn csv_error(err: csv::Error) -> Error {
    match err.into_kind() {
        csv::ErrorKind::Io(err) => Error::Io(err),
        other => Error::Sink(format!("csv: {other:?}")),
    }
}

/// Keeps every written day in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    days: Vec<(String, Vec<LogLine>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn days(&self) -> &[(String, Vec<LogLine>)] {
        &self.days
    }

    pub fn into_days(self) -> Vec<(String, Vec<LogLine>)> {
        self.days
    }
}

impl DaySink for MemorySink {
    fn write_day(&mut self, day: &str, lines: &[LogLine]) -> Result<String> {
        self.days.push((day.to_string(), lines.to_vec()));
        Ok(format!("memory:{day}"))
    }
}
