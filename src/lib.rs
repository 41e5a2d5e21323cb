pub mod config;
pub mod error;
pub mod portal;

pub use config::{config_from_env, default_config, load_config, PortalConfig};
pub use error::{ErrorKind, PortalError};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
