use crate::{flags::Flags, kernel_metadata::errno_name, util::running_under_rd};
pub use backtrace::Backtrace;
use nix::errno::errno;
use std::{
    collections::HashMap,
    env,
    env::var_os,
    fs::{File, OpenOptions},
    io::{self, BufWriter, Result, Write},
    path::Path,
    sync::{Mutex, MutexGuard},
};

#[derive(Clone)]
struct LogModule {
    name: String,
    level: LogLevel,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum LogLevel {
    LogFatal,
    LogError,
    LogWarn,
    LogInfo,
    LogDebug,
}

pub use LogLevel::*;

struct LogGlobals {
    level_map: HashMap<String, LogLevel>,
    log_modules_cache: HashMap<String, LogModule>,
    /// Possibly buffered
    log_file: Box<dyn Write + Send>,
    default_level: LogLevel,
}

extern "C" fn flush_log_buffer() {
    let mut maybe_log_lock = LOG_GLOBALS.lock();
    match &mut maybe_log_lock {
        Ok(lock) => {
            lock.log_file.flush().unwrap_or(());
        }
        Err(e) => panic!(
            "Could not obtain lock on rd log. Can't flush log buffer: {:?}",
            e
        ),
    };
}

lazy_static! {
    static ref LOG_GLOBALS: Mutex<LogGlobals> = {
        let maybe_filename = var_os("RD_LOG_FILE");
        let maybe_append_filename = var_os("RD_APPEND_LOG_FILE");
        let mut f: Box<dyn Write + Send>;
        if let Some(filename) = maybe_filename {
            f = Box::new(File::create(&filename).unwrap_or_else(|e| panic!("Error. Could not create filename `{:?}' specified in environment variable RD_LOG_FILE: {}", filename, e)));
        } else if let Some(append_filename) = maybe_append_filename {
            f = Box::new(OpenOptions::new().append(true).create(true).open(&append_filename).unwrap_or_else(|e| panic!("Error. Could not append to filename `{:?}' specified in env variable RD_APPEND_LOG_FILE: {}", append_filename, e)));
        } else {
            f = Box::new(io::stderr());
        }

        if let Ok(buf_size) = env::var("RD_LOG_BUFFER") {
            let log_buffer_size = buf_size.parse::<usize>().unwrap_or_else(|_| panic!("Error. Could not parse `{:?}' in environment var `RD_LOG_BUFFER' as a number", buf_size));
            f = Box::new(BufWriter::with_capacity(log_buffer_size, f));
        }

        let ret = unsafe {
            libc::atexit(flush_log_buffer)
        };
        assert_eq!(ret, 0);

        let env = if running_under_rd() {
            env::var("RD_UNDER_RD_LOG")
        } else {
            env::var("RD_LOG")
        };

        let (default_level, level_map) = match env {
            Ok(rd_log) => init_log_levels(&rd_log),
            Err(_) => (LogError, HashMap::new())
        };

        Mutex::new(LogGlobals {
            level_map,
            log_modules_cache: HashMap::new(),
            log_file: f,
            default_level,
        })
    };
}

fn log_level_string_to_level(log_level_string: &str) -> LogLevel {
    match log_level_string {
        "fatal" => LogFatal,
        "error" => LogError,
        "warn" => LogWarn,
        "info" => LogInfo,
        "debug" => LogDebug,
        _ => LogWarn,
    }
}

/// Parse `module:level[,module:level]*`. The pseudo module `all` sets the
/// default level.
fn init_log_levels(rd_log: &str) -> (LogLevel, HashMap<String, LogLevel>) {
    let mut hm: HashMap<String, LogLevel> = HashMap::new();
    let mut default_level = LogDebug;
    for mod_colon_level in rd_log.split(',') {
        let res: Vec<&str> = mod_colon_level.splitn(2, ':').collect();
        if res.len() == 2 {
            let mod_name = res[0].trim();
            let log_level_string = res[1].trim();
            if mod_name == "all" {
                default_level = log_level_string_to_level(log_level_string);
            } else {
                hm.insert(
                    mod_name.to_owned(),
                    log_level_string_to_level(log_level_string),
                );
            }
        }
    }
    (default_level, hm)
}

fn get_log_level(module_name: &str, l: &MutexGuard<LogGlobals>) -> LogLevel {
    // We DONT lowercase here as filenames are usually case sensitive on Linux.
    match l.level_map.get(module_name) {
        Some(log_level) => *log_level,
        None => l.default_level,
    }
}

fn filename_to_module_name(filename: &str) -> String {
    let path = Path::new(filename);
    match path.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => filename.to_owned(),
    }
}

fn get_log_module(filename: &str, l: &mut MutexGuard<LogGlobals>) -> LogModule {
    if let Some(log_module) = l.log_modules_cache.get(filename) {
        log_module.to_owned()
    } else {
        let name = filename_to_module_name(filename);
        let level = get_log_level(&name, l);
        let m = LogModule { level, name };
        l.log_modules_cache.insert(filename.to_owned(), m.clone());
        m
    }
}

fn log_name(level: LogLevel) -> &'static str {
    match level {
        LogFatal => "FATAL",
        LogError => "ERROR",
        LogWarn => "WARN",
        LogInfo => "INFO",
        LogDebug => "DEBUG",
    }
}

pub struct NewLineTerminatingOstream {
    enabled: bool,
    /// Abort once the message has been written out.
    fatal_on_drop: bool,
    message: Vec<u8>,
    lock: MutexGuard<'static, LogGlobals>,
}

impl NewLineTerminatingOstream {
    fn new(
        level: LogLevel,
        filename: &str,
        line: u32,
        module_path: &str,
        always_enabled: bool,
    ) -> Option<NewLineTerminatingOstream> {
        let mut lock = LOG_GLOBALS.lock().unwrap();
        let m = get_log_module(filename, &mut lock);
        let enabled = always_enabled || level <= m.level;
        if enabled {
            // LogFatal callers abort on their own.
            let fatal_on_drop = level != LogFatal
                && level <= LogWarn
                && Flags::get().fatal_errors_and_warnings;
            let mut stream = NewLineTerminatingOstream {
                message: Vec::new(),
                enabled,
                fatal_on_drop,
                lock,
            };
            if level == LogDebug {
                write!(stream, "[{}] ", m.name).unwrap_or(());
            } else {
                write_prefix(&mut stream, level, filename, line, module_path);
            }

            Some(stream)
        } else {
            None
        }
    }
}

/// Low level. Use is_logging!() macro instead.
pub fn is_logging(level: LogLevel, filename: &str, _line: u32, _func_name: &str) -> bool {
    let mut lock = LOG_GLOBALS.lock().unwrap();
    let m = get_log_module(filename, &mut lock);
    level <= m.level
}

impl Drop for NewLineTerminatingOstream {
    fn drop(&mut self) {
        if self.enabled {
            self.write(b"\n").unwrap_or(0);
            // This flushes self.message *to* the log file but does NOT flush
            // the log file itself.
            self.flush().unwrap_or(());
            if self.fatal_on_drop {
                // We still hold the log lock so flush_log_buffer() would deadlock.
                self.lock.log_file.flush().unwrap_or(());
                dump_rd_stack(Backtrace::new());
                std::process::abort();
            }
        }
    }
}

impl Write for NewLineTerminatingOstream {
    /// Write the text stored in the `message` member to the log file.
    fn flush(&mut self) -> Result<()> {
        if !self.message.is_empty() && self.enabled {
            self.lock.log_file.write_all(&self.message)?;
        }
        self.message.clear();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.enabled {
            self.message.extend_from_slice(buf);
        }

        // Need to pretend these were written even if buffer was not enabled.
        // Otherwise we get a `Err` value
        // Custom { kind: WriteZero, error: "failed to write whole buffer" }
        Ok(buf.len())
    }
}

pub fn write_prefix(
    stream: &mut dyn Write,
    level: LogLevel,
    filename: &str,
    line: u32,
    _module_path: &str,
) {
    write!(stream, "[{} {}:{}", log_name(level), filename, line).unwrap_or(());

    let err = errno();
    if level <= LogWarn && err != 0 {
        write!(stream, " errno: {}", errno_name(err)).unwrap_or(());
    }
    write!(stream, "] ").unwrap_or(());
}

/// This is almost always not the method you want. Use log!() macro instead
pub fn log(
    log_level: LogLevel,
    filename: &str,
    line: u32,
    module_path: &str,
    always_enabled: bool,
) -> Option<NewLineTerminatingOstream> {
    NewLineTerminatingOstream::new(log_level, filename, line, module_path, always_enabled)
}

/// Outputs to (possibly write buffered) log file (or stderr if no log file was specified)
/// After this program continues normally.
#[macro_export]
macro_rules! log {
    ($log_level:expr, $($args:tt)+) => {
        {
            use std::io::Write;
            let maybe_stream = $crate::log::log(
                $log_level,
                file!(),
                line!(),
                module_path!(),
                false
            );
            if let Some(mut stream) = maybe_stream {
                write!(stream, $($args)+).unwrap_or(());
            }
        }
    };
}

#[macro_export]
macro_rules! is_logging {
    ($log_level:expr) => {
        $crate::log::is_logging($log_level, file!(), line!(), module_path!())
    };
}

/// Outputs to (possibly write buffered) log file (or stderr if no log file was specified)
/// Prints out the backtrace to stderr and aborts.
#[macro_export]
macro_rules! fatal {
    ($($args:tt)+) => {
        {
            {
                use std::io::Write;
                let maybe_stream = $crate::log::log(
                    $crate::log::LogFatal,
                    file!(),
                    line!(),
                    module_path!(),
                    true
                );
                if let Some(mut stream) = maybe_stream {
                    write!(stream, $($args)+).unwrap_or(());
                }
            }
            $crate::log::notifying_abort($crate::log::Backtrace::new());
        }
    };
}

/// If asserting fails, report the task and abort.
#[macro_export]
macro_rules! ed_assert {
    ($task:expr, $cond:expr) => {
        {
            if !$cond {
                $crate::log::task_assertion_failed(
                    &*$task,
                    file!(),
                    line!(),
                    module_path!(),
                    stringify!($cond),
                    format_args!(""),
                );
            }
        }
    };
    ($task:expr, $cond:expr, $($args:tt)+) => {
        {
            if !$cond {
                $crate::log::task_assertion_failed(
                    &*$task,
                    file!(),
                    line!(),
                    module_path!(),
                    stringify!($cond),
                    format_args!($($args)+),
                );
            }
        }
    };
}

/// Low level. Use ed_assert!() instead.
pub fn task_assertion_failed<T: crate::task::Task + ?Sized>(
    t: &T,
    filename: &str,
    line: u32,
    module_path: &str,
    cond: &str,
    args: std::fmt::Arguments<'_>,
) -> ! {
    if let Some(mut stream) = log(LogFatal, filename, line, module_path, true) {
        write!(stream, "\n (task {} arch {})\n", t.tid(), t.arch()).unwrap_or(());
        write!(stream, " -> Assertion `{}' failed to hold. ", cond).unwrap_or(());
        stream.write_fmt(args).unwrap_or(());
    }
    notifying_abort(Backtrace::new())
}

/// Dump the stacktrace and abort.
pub fn notifying_abort(bt: Backtrace) -> ! {
    flush_log_buffer();
    dump_rd_stack(bt);
    std::process::abort();
}

/// Write the backtrace to stderr.
fn dump_rd_stack(bt: Backtrace) {
    eprintln!("=== Start rd backtrace:");
    eprintln!("{:?}", bt);
    eprintln!("=== End rd backtrace");
}
