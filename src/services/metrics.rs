// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Scheduler counters, bumped per tick and per order outcome.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub ticks: AtomicU64,
    pub examined: AtomicU64,
    pub spawned: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    pub quote_errors: AtomicU64,
    pub last_tick_ms: AtomicU64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "ticks": self.ticks.load(Ordering::Relaxed),
            "ordersExamined": self.examined.load(Ordering::Relaxed),
            "childrenSpawned": self.spawned.load(Ordering::Relaxed),
            "completed": self.completed.load(Ordering::Relaxed),
            "failed": self.failed.load(Ordering::Relaxed),
            "skipped": self.skipped.load(Ordering::Relaxed),
            "quoteErrors": self.quote_errors.load(Ordering::Relaxed),
            "lastTickMs": self.last_tick_ms.load(Ordering::Relaxed),
        })
    }
}

/// Serve the counters over a bare TCP listener: Prometheus text at `/`,
/// JSON at `/stats`. Returns the bound address, or `None` if the bind failed
/// (the daemon runs on without observability rather than aborting).
pub async fn spawn_stats_server(port: u16, stats: Arc<SchedulerStats>) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(target: "stats", error = %e, "Stats server failed to bind");
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!(target: "stats", %addr, "Stats server listening");
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let mut buf = [0u8; 1024];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let req = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = req
                        .lines()
                        .next()
                        .and_then(|l| l.split_whitespace().nth(1))
                        .unwrap_or("/");

                    let (content_type, body) = if path.starts_with("/stats") {
                        ("application/json", stats.snapshot().to_string())
                    } else {
                        ("text/plain", render_prometheus(&stats))
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
                        content_type,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!(target: "stats", error = %e, "Stats accept error");
                    continue;
                }
            }
        }
    });

    local
}

fn render_prometheus(stats: &Arc<SchedulerStats>) -> String {
    format!(
        concat!(
            "# TYPE keeper_ticks counter\nkeeper_ticks {}\n",
            "# TYPE keeper_orders_examined counter\nkeeper_orders_examined {}\n",
            "# TYPE keeper_children_spawned counter\nkeeper_children_spawned {}\n",
            "# TYPE keeper_orders_completed counter\nkeeper_orders_completed {}\n",
            "# TYPE keeper_orders_failed counter\nkeeper_orders_failed {}\n",
            "# TYPE keeper_orders_skipped counter\nkeeper_orders_skipped {}\n",
            "# TYPE keeper_quote_errors counter\nkeeper_quote_errors {}\n",
            "# TYPE keeper_last_tick_ms gauge\nkeeper_last_tick_ms {}\n"
        ),
        stats.ticks.load(Ordering::Relaxed),
        stats.examined.load(Ordering::Relaxed),
        stats.spawned.load(Ordering::Relaxed),
        stats.completed.load(Ordering::Relaxed),
        stats.failed.load(Ordering::Relaxed),
        stats.skipped.load(Ordering::Relaxed),
        stats.quote_errors.load(Ordering::Relaxed),
        stats.last_tick_ms.load(Ordering::Relaxed),
    )
}
