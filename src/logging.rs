//! Logging handle: console output plus an optional size-rotated log file.
//!
//! Nothing here installs a global subscriber. Callers build a [`LogHandle`]
//! once and run work inside [`LogHandle::in_scope`], so building a second
//! handle never stacks sinks onto the first.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Clone)]
pub struct LogHandle {
    dispatch: Dispatch,
    log_file: Option<PathBuf>,
}

impl LogHandle {
    pub fn new(config: &LoggingConfig) -> Result<Self> {
        let file_layer = if config.file {
            let path = config.dir.join(&config.file_name);
            let writer = RotatingFile::open(&path, config.max_bytes, config.backups)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(writer)),
            )
        } else {
            None
        };

        let subscriber = tracing_subscriber::registry()
            .with(default_filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr)
                    .compact(),
            )
            .with(file_layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            log_file: config.file.then(|| config.dir.join(&config.file_name)),
        })
    }

    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            log_file: None,
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Run `f` with this handle as the active subscriber on the current thread.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Append-only log file that rolls over to `name.1 .. name.N` once it would exceed `max_bytes`.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = open_append(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let written = file.metadata().map(|m| m.len()).unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
            backups,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = File::create(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.backup_path(self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backups).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                fs::rename(&from, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0
            && self.written > 0
            && self.written + buf.len() as u64 > self.max_bytes
        {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
