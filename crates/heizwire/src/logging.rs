use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use clap::ValueEnum;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;

        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Open `path` for appending, creating it and any missing parent directories.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Where log events are written: always stderr, plus `file` when given.
/// Stdout stays reserved for message output.
pub fn log_writer(file: Option<File>) -> BoxMakeWriter {
    match file {
        Some(file) => BoxMakeWriter::new(io::stderr.and(Mutex::new(file))),
        None => BoxMakeWriter::new(io::stderr),
    }
}

/// Install the global subscriber.
pub fn init_logging(format: LogFormat, level: LogLevel, file: Option<File>) {
    let builder = tracing_subscriber::fmt()
        .with_writer(log_writer(file))
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().with_current_span(true).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("heizwire-log-{tag}-{}", std::process::id()))
    }

    #[test]
    fn log_file_is_appended_and_parents_created() {
        let dir = temp_path("append");
        let path = dir.join("nested").join("heizwire.log");
        let _ = std::fs::remove_dir_all(&dir);

        open_log_file(&path).unwrap().write_all(b"first\n").unwrap();
        open_log_file(&path).unwrap().write_all(b"second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn writer_tees_into_log_file() {
        let dir = temp_path("tee");
        let path = dir.join("heizwire.log");
        let _ = std::fs::remove_dir_all(&dir);

        let writer = log_writer(Some(open_log_file(&path).unwrap()));
        writer.make_writer().write_all(b"session started\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "session started\n");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
