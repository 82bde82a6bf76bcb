use std::{fs, io::Write, path::PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use docbatch::paths;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Clone, Copy, Debug)]
pub enum JsonLogFormat {
    Pretty,
    Compact,
}

/// Installs the global subscriber:
/// 1. Stdout, shaped by `log_json` and `verbose`.
/// 2. A JSON debug log at `~/.docbatch/logs/run-<id>.log` when `run_id` is given.
///
/// The returned guard flushes the file writer on drop; keep it alive until exit.
pub fn init(
    verbose: bool,
    log_json: bool,
    json_format: JsonLogFormat,
    run_id: Option<&str>,
) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_env_filter(verbose));
    let (file_layer, guard) = match run_id.map(run_log_file) {
        Some(Ok((dir, name))) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(Targets::new().with_default(tracing::Level::DEBUG));
            (Some(layer), Some(guard))
        }
        Some(Err(err)) => {
            eprintln!("Warning: run log disabled: {err}");
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer(verbose, log_json, json_format, filter))
        .with(file_layer)
        .init();

    guard
}

fn run_log_file(run_id: &str) -> std::io::Result<(PathBuf, String)> {
    let dir = paths::logs_dir();
    fs::create_dir_all(&dir)?;
    Ok((dir, format!("run-{run_id}.log")))
}

fn stdout_layer(
    verbose: bool,
    log_json: bool,
    json_format: JsonLogFormat,
    filter: EnvFilter,
) -> BoxedLayer {
    match (log_json, json_format) {
        (true, JsonLogFormat::Pretty) => Box::new(
            fmt::layer()
                .json()
                .with_writer(|| PrettyJsonWriter::new(std::io::stdout()))
                .with_filter(filter),
        ),
        (true, JsonLogFormat::Compact) => Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .with_filter(filter),
        ),
        (false, _) if verbose => Box::new(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(filter),
        ),
        // Progress lines read like plain console output.
        (false, _) => Box::new(
            fmt::layer()
                .with_writer(std::io::stdout)
                .without_time()
                .with_target(false)
                .with_level(true)
                .with_filter(filter),
        ),
    }
}

/// Re-indents each JSON record emitted by the formatter.
struct PrettyJsonWriter<W: Write> {
    inner: W,
}

impl<W: Write> PrettyJsonWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for PrettyJsonWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let record = std::str::from_utf8(buf)
            .ok()
            .map(str::trim)
            .filter(|s| s.starts_with('{') && s.ends_with('}'))
            .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok());
        if let Some(value) = record
            && serde_json::to_writer_pretty(&mut self.inner, &value).is_ok()
        {
            self.inner.write_all(b"\n")?;
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn default_env_filter(verbose: bool) -> EnvFilter {
    let spec = if verbose {
        "docbatch=debug,info"
    } else {
        "docbatch=info,warn"
    };
    EnvFilter::new(spec)
}
