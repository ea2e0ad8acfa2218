use crate::config::*;
use tracing_subscriber::{
    prelude::*,
    filter::filter_fn,
    Layer,
    registry::LookupSpan,
};
use tracing::Subscriber;

use std::{
    io::Error as IoError,
    path::Path,
};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Where one target's output goes. File targets roll daily under `log_dir`.
fn output_layer<S>(target: &LogTarget, log_dir: &Path) -> BoxedLayer<S>
    where S: Subscriber + Send + Sync,
          for<'span> S: LookupSpan<'span>,
{
    let output = tracing_subscriber::fmt::layer();

    match target
    {
        LogTarget::File { filename } => output.with_writer(tracing_appender::rolling::daily(log_dir, filename))
                                              .with_ansi(false)
                                              .boxed(),
        LogTarget::Builtin(BuiltinLogTarget::Stdout) => output.with_writer(std::io::stdout).boxed(),
        LogTarget::Builtin(BuiltinLogTarget::Stderr) => output.with_writer(std::io::stderr).boxed(),
    }
}

/// Build the subscriber for a bot process: the configured global filter,
/// then one output per log target with its own level and modules.
///
/// The log directory is created if any target writes to a file.
pub fn build_subscriber(conf: LoggingConfig) -> Result<impl Subscriber + Send + Sync, IoError>
{
    if conf.uses_files()
    {
        std::fs::create_dir_all(&conf.dir)?;
    }

    let global_filter = conf.global_filter();
    let mut outputs = Vec::new();

    for entry in conf.targets
    {
        let level = entry.level_filter();
        let layer = output_layer(&entry.target, &conf.dir);

        outputs.push(layer.with_filter(filter_fn(move |metadata| {
            metadata.level() <= &level && entry.covers_module(metadata.module_path())
        })).boxed());
    }

    Ok(tracing_subscriber::registry()
            .with(global_filter)
            .with(outputs))
}
