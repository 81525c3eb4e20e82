use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use kwave_core::Clock;
use kwave_core::model::ExamResult;
use storage::repository::{DeliveryStatus, OutboxEntry, OutboxId, ResultOutboxRepository};

use crate::error::{DeliveryError, SinkError};

/// Backend acknowledgment of a delivered result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SinkAck {
    pub receipt_id: Option<String>,
}

/// Destination for submitted results.
///
/// Delivery is at-least-once: the same result may arrive more than once and the
/// receiver deduplicates by session id.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Make one delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` when the result was not acknowledged.
    async fn deliver(&self, result: &ExamResult) -> Result<SinkAck, SinkError>;
}

/// Sink used when no backend is configured. Never acknowledges, so results stay queued.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSink;

#[async_trait]
impl ResultSink for OfflineSink {
    async fn deliver(&self, _result: &ExamResult) -> Result<SinkAck, SinkError> {
        Err(SinkError::Unavailable("no backend configured".into()))
    }
}

//
// ─── RETRY POLICY ──────────────────────────────────────────────────────────────
//

/// Retry schedule for failed deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Attempts before an entry is dead-lettered.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled for every further failure.
    pub base_backoff_secs: u32,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff_secs: 30,
        }
    }
}

impl DeliveryPolicy {
    pub const MAX_BACKOFF_SECS: u32 = 3600;

    /// `base * 2^(attempts - 1)`, capped at [`Self::MAX_BACKOFF_SECS`].
    #[must_use]
    pub fn backoff_secs(&self, attempts: u32) -> u32 {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_backoff_secs
            .saturating_mul(1_u32 << exponent)
            .min(Self::MAX_BACKOFF_SECS)
    }

    /// When to retry after `attempts` failures, or `None` once the budget is spent.
    #[must_use]
    pub fn next_attempt_at(&self, attempts: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if attempts >= self.max_attempts {
            return None;
        }
        Some(now + Duration::seconds(i64::from(self.backoff_secs(attempts))))
    }
}

//
// ─── DELIVERY SERVICE ──────────────────────────────────────────────────────────
//

/// What one delivery attempt left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        receipt_id: Option<String>,
    },
    Retrying {
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: String,
    },
    DeadLettered {
        attempts: u32,
        error: String,
    },
}

impl From<&OutboxEntry> for DeliveryOutcome {
    fn from(entry: &OutboxEntry) -> Self {
        let error = entry.last_error.clone().unwrap_or_default();
        match entry.status {
            DeliveryStatus::Delivered => Self::Delivered {
                receipt_id: entry.receipt_id.clone(),
            },
            DeliveryStatus::Pending => Self::Retrying {
                attempts: entry.attempts,
                next_attempt_at: entry.next_attempt_at,
                error,
            },
            DeliveryStatus::Failed => Self::DeadLettered {
                attempts: entry.attempts,
                error,
            },
        }
    }
}

/// Totals from [`ResultDeliveryService::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: u32,
    pub retrying: u32,
    pub dead_lettered: u32,
}

impl DrainReport {
    #[must_use]
    pub fn attempted(&self) -> u32 {
        self.delivered + self.retrying + self.dead_lettered
    }
}

/// Moves results from the local outbox to a `ResultSink`.
#[derive(Clone)]
pub struct ResultDeliveryService {
    clock: Clock,
    outbox: Arc<dyn ResultOutboxRepository>,
    sink: Arc<dyn ResultSink>,
    policy: DeliveryPolicy,
}

impl ResultDeliveryService {
    #[must_use]
    pub fn new(
        clock: Clock,
        outbox: Arc<dyn ResultOutboxRepository>,
        sink: Arc<dyn ResultSink>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            clock,
            outbox,
            sink,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// One delivery attempt for `id`. Entries that are no longer pending are reported as-is.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Storage` if the outbox cannot be read or updated.
    /// Sink failures are recorded on the entry, not returned.
    pub async fn deliver_entry(&self, id: OutboxId) -> Result<DeliveryOutcome, DeliveryError> {
        let entry = self.outbox.get(id).await?;
        if entry.status != DeliveryStatus::Pending {
            return Ok(DeliveryOutcome::from(&entry));
        }

        match self.sink.deliver(&entry.result).await {
            Ok(ack) => {
                self.outbox
                    .mark_delivered(id, ack.receipt_id.as_deref(), self.clock.now())
                    .await?;
                tracing::info!(
                    outbox_id = id,
                    session_id = %entry.result.session_id(),
                    receipt_id = ack.receipt_id.as_deref().unwrap_or("-"),
                    "result delivered"
                );
                Ok(DeliveryOutcome::Delivered {
                    receipt_id: ack.receipt_id,
                })
            }
            Err(err) => {
                let attempts = entry.attempts.saturating_add(1);
                let next = self.policy.next_attempt_at(attempts, self.clock.now());
                let message = err.to_string();
                let updated = self.outbox.record_failure(id, &message, next).await?;
                match next {
                    Some(at) => tracing::warn!(
                        outbox_id = id,
                        attempts,
                        next_attempt_at = %at,
                        error = %message,
                        "result delivery failed, will retry"
                    ),
                    None => tracing::error!(
                        outbox_id = id,
                        attempts,
                        error = %message,
                        "result delivery abandoned"
                    ),
                }
                Ok(DeliveryOutcome::from(&updated))
            }
        }
    }

    /// Attempts the oldest due entry. Returns `false` when nothing is due.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Storage` if the outbox cannot be read or updated.
    pub async fn run_once(&self) -> Result<bool, DeliveryError> {
        Ok(self.next_due().await?.is_some())
    }

    /// Repeats [`Self::run_once`] until nothing is due or `limit` attempts were made.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Storage` if the outbox cannot be read or updated.
    pub async fn drain(&self, limit: u32) -> Result<DrainReport, DeliveryError> {
        let mut report = DrainReport::default();
        while report.attempted() < limit {
            let Some(outcome) = self.next_due().await? else {
                break;
            };
            match outcome {
                DeliveryOutcome::Delivered { .. } => report.delivered += 1,
                DeliveryOutcome::Retrying { .. } => report.retrying += 1,
                DeliveryOutcome::DeadLettered { .. } => report.dead_lettered += 1,
            }
        }
        Ok(report)
    }

    async fn next_due(&self) -> Result<Option<DeliveryOutcome>, DeliveryError> {
        let due = self.outbox.due(self.clock.now(), 1).await?;
        let Some(entry) = due.first() else {
            return Ok(None);
        };
        self.deliver_entry(entry.id).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = DeliveryPolicy {
            max_attempts: 20,
            base_backoff_secs: 30,
        };
        assert_eq!(policy.backoff_secs(1), 30);
        assert_eq!(policy.backoff_secs(2), 60);
        assert_eq!(policy.backoff_secs(3), 120);
        assert_eq!(policy.backoff_secs(7), 1920);
        assert_eq!(policy.backoff_secs(8), 3600);
        assert_eq!(policy.backoff_secs(40), 3600);
    }

    #[test]
    fn retries_stop_at_max_attempts() {
        let policy = DeliveryPolicy {
            max_attempts: 3,
            base_backoff_secs: 10,
        };
        let now = kwave_core::time::fixed_now();
        assert_eq!(policy.next_attempt_at(1, now), Some(now + Duration::seconds(10)));
        assert_eq!(policy.next_attempt_at(2, now), Some(now + Duration::seconds(20)));
        assert_eq!(policy.next_attempt_at(3, now), None);
    }
}
