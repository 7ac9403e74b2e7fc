use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::{Context, Result};
use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

struct Logger {
    file: File,
    path: PathBuf,
    file_level: Level,
    console_level: Level,
    prefixes: HashMap<String, u8>, // prefix -> ANSI color
}

pub const COLOR_GRAY: u8 = 90;
pub const COLOR_BLUE: u8 = 34;
pub const COLOR_YELLOW: u8 = 33;

/// Initialize the global logger. Clears the log file.
/// Verbose lowers the file threshold to TRACE and the console threshold to DEBUG.
pub fn init(log_dir: &Path, verbose: bool) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let path = log_dir.join("vtpc.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let logger = Logger {
        file,
        path: path.clone(),
        file_level: if verbose { Level::Trace } else { Level::Debug },
        console_level: if verbose { Level::Debug } else { Level::Info },
        prefixes: HashMap::new(),
    };
    LOGGER.set(Mutex::new(logger)).ok();
    Ok(path)
}

/// Path of the active log file, if initialized.
pub fn log_path() -> Option<PathBuf> {
    LOGGER.get().and_then(|l| l.lock().ok()).map(|l| l.path.clone())
}

/// Register a component prefix with a console color.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut l) = logger.lock() {
            l.prefixes.insert(prefix.to_string(), color);
        }
    }
}

fn write_log(level: Level, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let Ok(mut l) = logger.lock() else { return };

    let ts = Local::now().format("%H:%M:%S%.3f").to_string();

    if level >= l.file_level {
        let line = if prefix.is_empty() {
            format!("[{}] [{}] {}", ts, level.label(), msg)
        } else {
            format!("[{}] [{}] [{}] {}", ts, level.label(), prefix, msg)
        };
        writeln!(l.file, "{}", line).ok();
    }

    // TRACE is file-only
    if level > Level::Trace && level >= l.console_level {
        let color = l.prefixes.get(prefix).copied().unwrap_or(0);
        let line = match (prefix.is_empty(), level) {
            (true, Level::Info) => msg.to_string(),
            (true, _) => format!("{}: {}", level.label(), msg),
            (false, _) => format!("\x1b[{}m[{}]\x1b[0m {}", color, prefix, msg),
        };
        eprintln!("{}", line);
    }
}

pub fn debug(msg: &str) {
    write_log(Level::Debug, "", msg);
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

/// Log with a registered component prefix.
pub fn trace_p(prefix: &str, msg: &str) {
    write_log(Level::Trace, prefix, msg);
}

pub fn debug_p(prefix: &str, msg: &str) {
    write_log(Level::Debug, prefix, msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log(Level::Error, prefix, msg);
}
