// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Third-party targets that flood debug-level output during normal operation.
const NOISY_TARGETS: &[&str] = &[
    "h2=info",
    "hyper=info",
    "hyper_util=info",
    "reqwest=info",
    "sqlx=warn",
    "alloy_transport_http=info",
];

pub fn setup_logging(log_level: &str, json_format: bool) {
    // RUST_LOG wins outright. Otherwise a bare level (e.g. "debug") gets the
    // noisy-module defaults appended; directive strings pass through as-is.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let normalized = log_level.trim();
        let spec = if normalized.contains(',') || normalized.contains('=') {
            normalized.to_string()
        } else {
            let mut parts = vec![normalized.to_string()];
            parts.extend(NOISY_TARGETS.iter().map(|s| s.to_string()));
            parts.join(",")
        };
        EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let subscriber = tracing_subscriber::registry().with(filter);
    if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        subscriber.with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        subscriber.with(fmt_layer).init();
    }

    tracing::info!(
        target: "config",
        base = %log_level,
        format = if json_format { "json" } else { "compact" },
        "Logging initialized"
    );
}
