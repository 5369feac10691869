// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! File logger for the `log` facade.
//!
//! Every record is written as `<timestamp> <LEVEL> <message>` to an append-only
//! file and optionally mirrored to stderr. When the file would grow past
//! `max_size` it is rotated: the current segment is compressed into a zip
//! archive next to it and a fresh file is started.

use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("opening log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("a global logger is already installed")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub path: PathBuf,
    pub level: LevelFilter,
    /// Rotate once the file would exceed this many bytes. Zero disables rotation.
    pub max_size: u64,
    pub stderr: bool,
}

impl LogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            level: LevelFilter::Info,
            max_size: DEFAULT_MAX_SIZE,
            stderr: true,
        }
    }
}

/// Install a [`FileLogger`] as the global logger.
pub fn init(config: LogConfig) -> Result<(), InitError> {
    let level = config.level;
    let logger = FileLogger::open(config)?;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    Ok(())
}

pub struct FileLogger {
    level: LevelFilter,
    stderr: bool,
    file: Mutex<RotatingFile>,
}

impl FileLogger {
    pub fn open(config: LogConfig) -> Result<Self, InitError> {
        let file = RotatingFile::open(&config.path, config.max_size).map_err(|source| {
            InitError::Open {
                path: config.path.clone(),
                source,
            }
        })?;
        Ok(Self {
            level: config.level,
            stderr: config.stderr,
            file: Mutex::new(file),
        })
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), &record.args().to_string());
        if self.stderr {
            eprintln!("{line}");
        }
        if let Ok(mut file) = self.file.lock()
            && let Err(e) = file.write_line(&line)
        {
            eprintln!("log write failed: {e}");
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.file.flush();
        }
    }
}

pub fn format_line(level: log::Level, message: &str) -> String {
    format!("{} {level} {message}", timestamp(OffsetDateTime::now_utc()))
}

fn timestamp(now: OffsetDateTime) -> String {
    now.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    ))
    .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

fn rotation_suffix(now: OffsetDateTime) -> String {
    now.format(format_description!(
        "[year]-[month]-[day]_[hour]-[minute]-[second]_[subsecond digits:6]"
    ))
    .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Append-only file with size-based rotation.
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_size: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_size,
            file,
            written,
        })
    }

    /// A failed rotation is reported only after `line` has been written.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        let full = self.max_size > 0 && self.written > 0 && self.written + len > self.max_size;
        let rotated = if full {
            self.rotate().map(|_| ())
        } else {
            Ok(())
        };
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.written += len;
        rotated
    }

    /// Compress the current segment to `<stem>.<time>.<ext>.zip` and start a new one.
    pub fn rotate(&mut self) -> io::Result<PathBuf> {
        self.file.flush()?;
        let segment = self.segment_name(&rotation_suffix(OffsetDateTime::now_utc()));
        let segment_path = self.path.with_file_name(&segment);
        fs::rename(&self.path, &segment_path)?;

        let archive = self.archive_path(&segment);
        let compressed = compress(&segment_path, &segment, &archive);
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        compressed?;
        fs::remove_file(&segment_path)?;
        Ok(archive)
    }

    fn segment_name(&self, suffix: &str) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        match self.path.extension() {
            Some(ext) => format!("{stem}.{suffix}.{}", ext.to_string_lossy()),
            None => format!("{stem}.{suffix}"),
        }
    }

    fn archive_path(&self, segment: &str) -> PathBuf {
        let first = self.path.with_file_name(format!("{segment}.zip"));
        if !first.exists() {
            return first;
        }
        (1u32..)
            .map(|n| self.path.with_file_name(format!("{segment}-{n}.zip")))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

fn compress(src: &Path, entry_name: &str, dst: &Path) -> io::Result<()> {
    let mut zip = zip::ZipWriter::new(File::create(dst)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(entry_name, options).map_err(io::Error::other)?;
    io::copy(&mut File::open(src)?, &mut zip)?;
    zip.finish().map_err(io::Error::other)?;
    Ok(())
}
