use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use chrono::Local;
use env_logger::{Builder, Env, Target};

/// Filter used with `--verbose` when `RUST_LOG` is not set.
const VERBOSE_FILTER: &str = "info,surtidor_monitor=debug,station_monitor=debug,notification_services=debug";

/// Writes every log line to stderr and appends it to the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialize the global logger.
///
/// `RUST_LOG` wins over both defaults. With a log file every line also lands
/// in that file.
pub fn init(verbose: bool, log_file: Option<&str>) -> io::Result<()> {
    let default_filter = if verbose { VERBOSE_FILTER } else { "info" };
    let mut builder = Builder::from_env(Env::new().default_filter_or(default_filter));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(TeeWriter { file })));
    }

    builder.init();
    Ok(())
}
