// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Level used when `RUST_LOG` is not set.
pub const DEFAULT_LOGLEVEL: LevelFilter = LevelFilter::INFO;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
}

static CURRENT: ArcSwapOption<LogFile> = ArcSwapOption::const_empty();

/// Install the global subscriber, writing through [`SinkWriter`].
///
/// `RUST_LOG` takes precedence over `default_level`. Returns false if a global subscriber was
/// already installed, in which case nothing changes.
pub fn init(default_level: LevelFilter) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(SinkWriter)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Send all further output to `path`, appending to it.
///
/// Installs the subscriber with [`DEFAULT_LOGLEVEL`] if none was installed yet. A file that
/// was already open is flushed and replaced.
pub fn open(path: impl AsRef<Path>) -> Result<(), SinkError> {
    init(DEFAULT_LOGLEVEL);
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let previous = CURRENT.swap(Some(Arc::new(LogFile {
        path: path.to_path_buf(),
        file: Mutex::new(file),
    })));
    if let Some(previous) = previous {
        let _ = previous.file.lock().flush();
    }
    info!("log file {} opened", path.display());
    Ok(())
}

/// Flush and detach the log file. Output goes back to stderr.
pub fn close() {
    if let Some(current) = CURRENT.load_full() {
        info!("closing log file {}", current.path.display());
    }
    if let Some(previous) = CURRENT.swap(None) {
        let _ = previous.file.lock().flush();
    }
}

/// Returns true while a log file is open.
#[must_use]
pub fn is_open() -> bool {
    CURRENT.load().is_some()
}

/// Path of the open log file.
#[must_use]
pub fn path() -> Option<PathBuf> {
    CURRENT.load_full().map(|current| current.path.clone())
}

/// Emit `message` at `level`.
pub fn log(level: Level, message: &str) {
    match level {
        Level::ERROR => error!("{message}"),
        Level::WARN => warn!("{message}"),
        Level::INFO => info!("{message}"),
        Level::DEBUG => debug!("{message}"),
        _ => trace!("{message}"),
    }
}

/// [`MakeWriter`] for the log file, or stderr when none is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkWriter;

pub struct SinkHandle(Option<Arc<LogFile>>);

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkHandle;

    fn make_writer(&'a self) -> Self::Writer {
        SinkHandle(CURRENT.load_full())
    }
}

impl Write for SinkHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.0 {
            Some(current) => match current.file.lock().write(buf) {
                Ok(written) => Ok(written),
                Err(_) => io::stderr().write(buf),
            },
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.0 {
            Some(current) => current.file.lock().flush(),
            None => io::stderr().flush(),
        }
    }
}
