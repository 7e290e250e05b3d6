//! ログ出力の初期化
//!
//! `RUST_LOG` が設定されていればそれを優先し、なければ `info`（`verbose` 時は `debug`）。

use std::sync::OnceLock;

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// ログ初期化のエラー
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// グローバルなtracing subscriberを設定する（2回目以降は何もしない）
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let subscriber = Registry::default().with(env_filter).with(stderr_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = INITIALIZED.set(());

    tracing::debug!("Logging initialized (default level: {})", default_level);
    Ok(())
}
