/// Structured logging setup using tracing
///
/// stderr always gets a layer: ANSI text on a terminal, JSON lines when piped.
/// stdout is never written to, it carries the CLI's JSON results.
/// When `log_file` is set, a second JSON layer appends to that file through a
/// non-blocking writer.

use std::io::{self, IsTerminal};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};
use crate::config::Config;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Level comes from `config.log_level`; RUST_LOG overrides it. The returned
/// guard must be held for the life of the process when a log file is in use,
/// dropping it flushes and stops the file writer.
pub fn init_logging(config: &Config) -> io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    if io::stderr().is_terminal() {
        layers.push(fmt::layer().with_writer(io::stderr).with_ansi(true).boxed());
    } else {
        layers.push(fmt::layer().with_writer(io::stderr).json().boxed());
    }

    let guard = match config.log_file.as_deref() {
        Some(path) => {
            let (writer, guard) = file_writer(Path::new(path))?;
            layers.push(fmt::layer().with_writer(writer).with_ansi(false).json().boxed());
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    if let Some(path) = &config.log_file {
        tracing::debug!(log_file = %path, "File logging enabled");
    }
    Ok(guard)
}

/// Non-blocking appender for a single, never-rotated log file.
///
/// Missing parent directories are created.
fn file_writer(path: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log_file has no file name: {}", path.display()),
            )
        })?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(io::Error::other)?;
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_writer_creates_parent_and_appends() {
        let dir = std::env::temp_dir().join(format!("ragfuse-log-{}", std::process::id()));
        let path = dir.join("nested").join("ragfuse.log");
        let _ = std::fs::remove_dir_all(&dir);

        let (mut writer, guard) = file_writer(&path).unwrap();
        writer.write_all(b"{\"message\":\"hello\"}\n").unwrap();
        // Dropping the guard flushes the background worker
        drop(writer);
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("hello"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_writer_rejects_path_without_file_name() {
        let err = file_writer(Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
