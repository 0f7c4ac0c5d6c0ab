//! Per-run log file for the editor core and the batch binary.
//!
//! [`init`] opens `EpiGimp/epigimp.log` under the platform data directory,
//! dropping whatever the previous run left there. Layer edits, filters,
//! history eviction, exports and font fallbacks are recorded through the
//! exported macros:
//!
//! ```ignore
//! crate::log_info!("applied {} to layer '{}'", spec, name);
//! ```
//!
//! The macros expand to a unit expression, so they also work as match arms.
//! Without `init` nothing is written, which keeps library callers and tests
//! off the filesystem.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

struct Sink {
    file: Mutex<File>,
    path: PathBuf,
}

static SINK: OnceLock<Sink> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        })
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Where this run is logging, once [`init`] succeeded.
pub fn log_path() -> Option<&'static PathBuf> {
    SINK.get().map(|s| &s.path)
}

pub fn is_enabled() -> bool {
    SINK.get().is_some()
}

/// Append `[HH:MM:SS] [LEVEL] msg`. Write failures are dropped.
pub fn write(level: Level, msg: &str) {
    let Some(sink) = SINK.get() else {
        return;
    };
    if let Ok(mut file) = sink.file.lock() {
        let _ = writeln!(file, "{}", format_line(level, msg));
    }
}

fn format_line(level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", clock(unix_seconds()), level, msg)
}

/// Open the log file and hook panics into it. A second call is ignored.
pub fn init() {
    if is_enabled() {
        return;
    }
    let path = data_dir().join("EpiGimp").join("epigimp.log");
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("epigimp: cannot open log file {}: {}", path.display(), e);
            return;
        }
    };
    let _ = SINK.set(Sink {
        file: Mutex::new(file),
        path,
    });

    write(
        Level::Info,
        &format!("EpiGimp {} started (unix {})", env!("CARGO_PKG_VERSION"), unix_seconds()),
    );

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        previous(info);
    }));
}

fn data_dir() -> PathBuf {
    let env_dir = |key: &str| std::env::var_os(key).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    {
        if let Some(dir) = env_dir("APPDATA") {
            return dir;
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = env_dir("HOME") {
            return home.join("Library").join("Application Support");
        }
    }

    env_dir("XDG_DATA_HOME")
        .or_else(|| env_dir("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// UTC wall clock for a unix timestamp.
fn clock(secs: u64) -> String {
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, (day % 3600) / 60, day % 60)
}
