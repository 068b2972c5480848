use crate::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from the config's logging
/// section. Tolerates being called twice (later calls are no-ops) so
/// tests can each try to install a subscriber.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match &cfg.filename {
        Some(path) => {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("cannot open log file {}: {}, logging to stderr", path, e);
                    init_stderr(filter, &cfg.format);
                    install_panic_hook();
                    return;
                }
            };
            let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false).with_writer(Mutex::new(file));
            let _ = match cfg.format.as_str() {
                "json" => builder.json().try_init(),
                "compact" => builder.compact().try_init(),
                _ => builder.try_init(),
            };
        }
        None => init_stderr(filter, &cfg.format),
    }

    install_panic_hook();
}

fn init_stderr(filter: EnvFilter, format: &str) {
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let _ = match format {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    };
}

fn install_panic_hook() {
    // report panics to stderr without requiring tracing macros
    std::panic::set_hook(Box::new(|pi| {
        eprintln!("panic: {}", pi);
    }));
}
