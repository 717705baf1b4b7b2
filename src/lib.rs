//! Faculty attendance capture.
//!
//! Camera capture, remote face recognition and roster reconciliation for a
//! classroom attendance page. The [`attendance::SessionController`] drives
//! the whole flow; [`commands`] exposes it to an outer surface.

pub mod attendance;
pub mod capture;
pub mod commands;
pub mod config;
pub mod export;
pub mod recognition;
pub mod utils;

#[cfg(test)]
mod testing;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "faculty_attendance=debug,reqwest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
