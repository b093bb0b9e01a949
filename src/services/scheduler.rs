// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::data::db::Database;
use crate::infrastructure::data::schema::Order;
use crate::services::expander::RecurringExpander;
use crate::services::metrics::SchedulerStats;
use crate::services::pipeline::{ExecutionOutcome, Stage, SwapPipeline};

/// Periodic driver: assembles the due work list each tick and runs the
/// pipeline over it sequentially. The timer lives in `run`; `tick` takes an
/// explicit timestamp so behavior is testable with simulated time.
#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    expander: RecurringExpander,
    pipeline: SwapPipeline,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new(
        db: Database,
        expander: RecurringExpander,
        pipeline: SwapPipeline,
        stats: Arc<SchedulerStats>,
    ) -> Self {
        Self {
            db,
            expander,
            pipeline,
            stats,
        }
    }

    /// One scan-and-execute pass. Never returns an error: a failed store
    /// query degrades the tick to whatever orders are already in hand, and
    /// one order's failure never skips the rest.
    pub async fn tick(&self, now: NaiveDateTime) {
        let started = Instant::now();

        let mut work: Vec<Order> = match self.db.incomplete_oneshot_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(
                    target: "scheduler",
                    error = %e,
                    "Incomplete-order scan failed, continuing with spawned children only"
                );
                Vec::new()
            }
        };

        let spawned = self.expander.expand_due(now).await;
        self.stats
            .spawned
            .fetch_add(spawned.len() as u64, Ordering::Relaxed);

        let mut seen: HashSet<String> = work.iter().map(|o| o.id.clone()).collect();
        for child in spawned {
            if seen.insert(child.id.clone()) {
                work.push(child);
            }
        }

        if !work.is_empty() {
            tracing::info!(target: "scheduler", orders = work.len(), "Processing due orders");
        }
        self.stats
            .examined
            .fetch_add(work.len() as u64, Ordering::Relaxed);

        for order in &work {
            match self.pipeline.execute(order, now).await {
                ExecutionOutcome::Completed(_) => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                }
                ExecutionOutcome::Failed(failure) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    if failure.stage == Stage::Quote {
                        self.stats.quote_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                ExecutionOutcome::Skipped => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        self.stats
            .last_tick_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Fixed-period loop. Ticks never overlap: each one runs to completion
    /// before the interval is polled again; missed deadlines are delayed,
    /// not replayed in a burst.
    pub async fn run(&self, period: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(target: "scheduler", period_secs = period.as_secs(), "Scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "scheduler", "Scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick(chrono::Utc::now().naive_utc()).await;
                }
            }
        }
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }
}
