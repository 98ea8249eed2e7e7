//! Logging setup for applications and tests that embed the IPC layer.
//!
//! The codec itself only talks to the `log` facade. Nothing is printed unless the
//! host installs a logger, either its own or the one configured here.

use std::fs::OpenOptions;
use std::sync::Once;

use log::LevelFilter;

use crate::error::IpcError;

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` at `Debug` level, writing `[LEVEL] message` lines to
/// stderr or, when `log_file` is given, appending to that file.
///
/// Only the first successful call has any effect; later calls return `Ok` without
/// touching `log_file`. Returns an error if the log file cannot be opened, in which
/// case no logger is installed.
pub fn enable_verbose_logging(log_file: Option<String>) -> Result<(), IpcError> {
    if INIT_LOGGER.is_completed() {
        return Ok(());
    }

    let target = match log_file {
        Some(filename) => Some(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(filename)?,
        ),
        None => None,
    };

    INIT_LOGGER.call_once(move || {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Debug);

        // Custom formatter: just print the level and message
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(file) = target {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test, because every call shares the process-wide `INIT_LOGGER`.
    #[test]
    fn test_enable_verbose_logging_lifecycle() {
        let result = enable_verbose_logging(Some("/nonexistent-dir/ipc.log".to_string()));
        assert!(matches!(result, Err(IpcError::Io(_))));

        assert!(enable_verbose_logging(None).is_ok());
        assert!(enable_verbose_logging(None).is_ok());
        log::debug!("logging initialised twice without panicking");

        let late = std::env::temp_dir().join(format!("tambak-ipc-late-{}.log", std::process::id()));
        assert!(enable_verbose_logging(Some(late.to_string_lossy().into_owned())).is_ok());
        assert!(!late.exists(), "a later call must not create its log file");
    }
}
