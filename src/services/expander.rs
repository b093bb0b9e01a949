// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use chrono::{Duration, NaiveDateTime};

use crate::common::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::data::schema::{NewOrder, Order};

/// Turns due recurring orders into one-shot execution orders.
///
/// Each due parent produces exactly one child per pass, and the parent's
/// schedule advances at spawn time. Whether the parent eventually flips to
/// completed is decided later, when the final child's execution is recorded.
#[derive(Clone)]
pub struct RecurringExpander {
    db: Database,
}

impl RecurringExpander {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Spawn children for every recurring order due at `now`. Failures are
    /// isolated per parent; the returned list holds only the children that
    /// were actually created.
    pub async fn expand_due(&self, now: NaiveDateTime) -> Vec<Order> {
        let due = match self.db.due_recurring_orders(now).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(target: "expander", error = %e, "Due-order scan failed, skipping expansion");
                return Vec::new();
            }
        };
        if due.is_empty() {
            return Vec::new();
        }

        tracing::info!(target: "expander", due = due.len(), "Expanding due recurring orders");

        let mut spawned = Vec::with_capacity(due.len());
        for parent in &due {
            match self.expand_one(parent, now).await {
                Ok(child) => spawned.push(child),
                Err(e) => {
                    tracing::error!(
                        target: "expander",
                        order_id = %parent.id,
                        error = %e,
                        "Skipping recurring order"
                    );
                }
            }
        }
        spawned
    }

    async fn expand_one(&self, parent: &Order, now: NaiveDateTime) -> Result<Order, AppError> {
        if !parent.recurrence_valid() {
            return Err(AppError::validation(
                "recurrence",
                format!(
                    "order {} has unusable interval/trade parameters ({:?}s x {:?})",
                    parent.id, parent.interval_seconds, parent.number_of_trades
                ),
            ));
        }

        let child = self.db.insert_order(&NewOrder::child_of(parent)).await?;
        tracing::info!(
            target: "expander",
            parent_id = %parent.id,
            child_id = %child.id,
            "Spawned execution order"
        );

        let executed = parent.executed_trades + 1;
        let next = if executed >= parent.number_of_trades.unwrap_or(0) {
            // Final spawn: clear the schedule so the parent is never due
            // again. The completed flag stays untouched here.
            None
        } else {
            Some(now + Duration::seconds(parent.interval_seconds.unwrap_or(0)))
        };

        // The child is already billable. A failed parent advance is logged
        // and reconciled by the operator, it must not swallow the child.
        if let Err(e) = self.db.advance_recurrence(&parent.id, executed, next).await {
            tracing::error!(
                target: "expander",
                parent_id = %parent.id,
                error = %e,
                "Parent advance failed after spawning child"
            );
        }

        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::data::schema::NewOrder;
    use chrono::Utc;

    fn recurring(trades: i64, interval: i64, next: NaiveDateTime) -> NewOrder {
        NewOrder {
            token_in: "0x00000000000000000000000000000000000000aa".into(),
            token_out: "0x00000000000000000000000000000000000000bb".into(),
            amount: "1.5".into(),
            slippage: 0.5,
            token_in_decimals: Some(18),
            token_out_decimals: Some(6),
            is_recurring: true,
            interval_seconds: Some(interval),
            number_of_trades: Some(trades),
            next_execution_time: Some(next),
            is_automatic: true,
            parent_order_id: None,
        }
    }

    #[tokio::test]
    async fn due_parent_spawns_a_child_and_advances() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let now = Utc::now().naive_utc();
        let parent = db
            .insert_order(&recurring(3, 100, now - Duration::seconds(5)))
            .await
            .unwrap();

        let spawned = RecurringExpander::new(db.clone()).expand_due(now).await;

        assert_eq!(spawned.len(), 1);
        let child = &spawned[0];
        assert_eq!(child.parent_order_id.as_deref(), Some(parent.id.as_str()));
        assert!(!child.is_recurring);
        assert_eq!(child.amount, parent.amount);
        assert_eq!(child.token_in_decimals, parent.token_in_decimals);
        assert!(child.interval_seconds.is_none());

        let parent = db.require_order(&parent.id).await.unwrap();
        assert_eq!(parent.executed_trades, 1);
        assert!(!parent.is_completed);
        let next = parent.next_execution_time.unwrap();
        assert!((next - now).num_seconds() >= 99 && (next - now).num_seconds() <= 101);
    }

    #[tokio::test]
    async fn final_spawn_clears_the_schedule_without_completing() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let now = Utc::now().naive_utc();
        let parent = db
            .insert_order(&recurring(1, 100, now - Duration::seconds(5)))
            .await
            .unwrap();

        let spawned = RecurringExpander::new(db.clone()).expand_due(now).await;
        assert_eq!(spawned.len(), 1);

        let parent = db.require_order(&parent.id).await.unwrap();
        assert_eq!(parent.executed_trades, 1);
        assert!(parent.next_execution_time.is_none());
        // Completion is owned by execution recording, not expansion.
        assert!(!parent.is_completed);
    }

    #[tokio::test]
    async fn unusable_recurrence_is_skipped_in_isolation() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let now = Utc::now().naive_utc();
        let broken = db
            .insert_order(&recurring(0, 100, now - Duration::seconds(5)))
            .await
            .unwrap();
        let healthy = db
            .insert_order(&recurring(2, 60, now - Duration::seconds(5)))
            .await
            .unwrap();

        let spawned = RecurringExpander::new(db.clone()).expand_due(now).await;

        assert_eq!(spawned.len(), 1);
        assert_eq!(
            spawned[0].parent_order_id.as_deref(),
            Some(healthy.id.as_str())
        );

        let broken = db.require_order(&broken.id).await.unwrap();
        assert_eq!(broken.executed_trades, 0);
        assert!(broken.next_execution_time.is_some());
    }

    #[tokio::test]
    async fn not_yet_due_parents_are_left_alone() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let now = Utc::now().naive_utc();
        db.insert_order(&recurring(3, 100, now + Duration::seconds(600)))
            .await
            .unwrap();

        let spawned = RecurringExpander::new(db.clone()).expand_due(now).await;
        assert!(spawned.is_empty());
    }
}
