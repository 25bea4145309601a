//! Diagnostic logging setup.
//!
//! Enable with `kestrel --log` to write to ~/.kestrel/kestrel.log

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Log file used by `--log`, under the home directory.
pub fn log_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kestrel").join("kestrel.log"))
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// default level.
///
/// With `to_file`, output goes to a fresh log file at `debug` level and the
/// path is returned. Otherwise warnings go to stderr.
pub fn init(to_file: bool) -> std::io::Result<Option<PathBuf>> {
    if !to_file {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter("warn"))
            .with_writer(std::io::stderr)
            .try_init();
        return Ok(None);
    }

    let Some(path) = log_file_path() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no home directory for the log file",
        ));
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Truncated per session.
    let file = File::create(&path)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    tracing::info!("=== kestrel debug logging enabled ===");
    Ok(Some(path))
}
