use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kwave_core::model::{AuthUser, ExamResult, ExamSet, ExamSetId, Question, SessionId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── OUTBOX TYPES ──────────────────────────────────────────────────────────────
//

/// Storage identifier for an outbox entry (`SQLite` row id).
pub type OutboxId = i64;

/// Delivery lifecycle of a locally persisted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Waiting for (re)delivery.
    Pending,
    /// Acknowledged by the backend.
    Delivered,
    /// Gave up after the maximum number of attempts.
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(StorageError::Serialization(format!(
                "invalid delivery status: {other}"
            ))),
        }
    }
}

/// A computed result held locally until the backend acknowledges it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: OutboxId,
    pub result: ExamResult,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub receipt_id: Option<String>,
}

/// Entry counts per delivery status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxCounts {
    pub pending: u32,
    pub delivered: u32,
    pub failed: u32,
}

/// Persisted sign-in state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
    pub access_token: String,
    pub user: AuthUser,
    pub saved_at: DateTime<Utc>,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Repository contract for exam sets and their questions.
#[async_trait]
pub trait ExamContentRepository: Send + Sync {
    /// Persist or update exam-set metadata.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the exam set cannot be stored.
    async fn upsert_exam_set(&self, exam_set: &ExamSet) -> Result<(), StorageError>;

    /// Fetch an exam set by id, `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_exam_set(&self, id: ExamSetId) -> Result<Option<ExamSet>, StorageError>;

    /// List exam sets ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_exam_sets(&self, limit: u32) -> Result<Vec<ExamSet>, StorageError>;

    /// Replace the ordered question list of an exam set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the exam set does not exist.
    async fn replace_questions(
        &self,
        exam_set_id: ExamSetId,
        questions: &[Question],
    ) -> Result<(), StorageError>;

    /// Fetch the questions of an exam set in their stored order. Unknown sets yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_questions(&self, exam_set_id: ExamSetId) -> Result<Vec<Question>, StorageError>;
}

/// Local persistence of computed results until the backend acknowledges them.
#[async_trait]
pub trait ResultOutboxRepository: Send + Sync {
    /// Store a result for delivery. Enqueueing the same session twice returns the existing id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn enqueue(&self, result: &ExamResult, now: DateTime<Utc>)
    -> Result<OutboxId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no entry has this id.
    async fn get(&self, id: OutboxId) -> Result<OutboxEntry, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session was never enqueued.
    async fn get_by_session(&self, session_id: SessionId) -> Result<OutboxEntry, StorageError>;

    /// Pending entries with `next_attempt_at <= now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<OutboxEntry>, StorageError>;

    /// Record a backend acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no entry has this id.
    async fn mark_delivered(
        &self,
        id: OutboxId,
        receipt_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Record a failed attempt. `next_attempt_at = None` gives up on the entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no entry has this id.
    async fn record_failure(
        &self,
        id: OutboxId,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<OutboxEntry, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn count_by_status(&self) -> Result<OutboxCounts, StorageError>;
}

/// Persisted sign-in token and user.
#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn load_auth(&self) -> Result<Option<AuthRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_auth(&self, record: &AuthRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn clear_auth(&self) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ADAPTER ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct OutboxState {
    next_id: OutboxId,
    entries: BTreeMap<OutboxId, OutboxEntry>,
    by_session: HashMap<SessionId, OutboxId>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    exam_sets: Arc<Mutex<BTreeMap<ExamSetId, ExamSet>>>,
    questions: Arc<Mutex<HashMap<ExamSetId, Vec<Question>>>>,
    outbox: Arc<Mutex<OutboxState>>,
    auth: Arc<Mutex<Option<AuthRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ExamContentRepository for InMemoryRepository {
    async fn upsert_exam_set(&self, exam_set: &ExamSet) -> Result<(), StorageError> {
        let mut guard = self.exam_sets.lock().map_err(poisoned)?;
        guard.insert(exam_set.id(), exam_set.clone());
        Ok(())
    }

    async fn get_exam_set(&self, id: ExamSetId) -> Result<Option<ExamSet>, StorageError> {
        let guard = self.exam_sets.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_exam_sets(&self, limit: u32) -> Result<Vec<ExamSet>, StorageError> {
        let guard = self.exam_sets.lock().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard.values().take(limit).cloned().collect())
    }

    async fn replace_questions(
        &self,
        exam_set_id: ExamSetId,
        questions: &[Question],
    ) -> Result<(), StorageError> {
        if !self.exam_sets.lock().map_err(poisoned)?.contains_key(&exam_set_id) {
            return Err(StorageError::NotFound);
        }
        let mut guard = self.questions.lock().map_err(poisoned)?;
        guard.insert(exam_set_id, questions.to_vec());
        Ok(())
    }

    async fn get_questions(&self, exam_set_id: ExamSetId) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        Ok(guard.get(&exam_set_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ResultOutboxRepository for InMemoryRepository {
    async fn enqueue(
        &self,
        result: &ExamResult,
        now: DateTime<Utc>,
    ) -> Result<OutboxId, StorageError> {
        let mut guard = self.outbox.lock().map_err(poisoned)?;
        if let Some(id) = guard.by_session.get(&result.session_id()) {
            return Ok(*id);
        }
        guard.next_id += 1;
        let id = guard.next_id;
        guard.entries.insert(
            id,
            OutboxEntry {
                id,
                result: result.clone(),
                status: DeliveryStatus::Pending,
                attempts: 0,
                last_error: None,
                next_attempt_at: now,
                created_at: now,
                delivered_at: None,
                receipt_id: None,
            },
        );
        guard.by_session.insert(result.session_id(), id);
        Ok(id)
    }

    async fn get(&self, id: OutboxId) -> Result<OutboxEntry, StorageError> {
        let guard = self.outbox.lock().map_err(poisoned)?;
        guard.entries.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_by_session(&self, session_id: SessionId) -> Result<OutboxEntry, StorageError> {
        let guard = self.outbox.lock().map_err(poisoned)?;
        guard
            .by_session
            .get(&session_id)
            .and_then(|id| guard.entries.get(id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<OutboxEntry>, StorageError> {
        let guard = self.outbox.lock().map_err(poisoned)?;
        let mut due: Vec<OutboxEntry> = guard
            .entries
            .values()
            .filter(|e| e.status == DeliveryStatus::Pending && e.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| (e.created_at, e.id));
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn mark_delivered(
        &self,
        id: OutboxId,
        receipt_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.outbox.lock().map_err(poisoned)?;
        let entry = guard.entries.get_mut(&id).ok_or(StorageError::NotFound)?;
        entry.status = DeliveryStatus::Delivered;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.delivered_at = Some(at);
        entry.receipt_id = receipt_id.map(str::to_owned);
        entry.last_error = None;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: OutboxId,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<OutboxEntry, StorageError> {
        let mut guard = self.outbox.lock().map_err(poisoned)?;
        let entry = guard.entries.get_mut(&id).ok_or(StorageError::NotFound)?;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_error = Some(error.to_owned());
        match next_attempt_at {
            Some(at) => entry.next_attempt_at = at,
            None => entry.status = DeliveryStatus::Failed,
        }
        Ok(entry.clone())
    }

    async fn count_by_status(&self) -> Result<OutboxCounts, StorageError> {
        let guard = self.outbox.lock().map_err(poisoned)?;
        let mut counts = OutboxCounts::default();
        for entry in guard.entries.values() {
            match entry.status {
                DeliveryStatus::Pending => counts.pending += 1,
                DeliveryStatus::Delivered => counts.delivered += 1,
                DeliveryStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl AuthTokenRepository for InMemoryRepository {
    async fn load_auth(&self) -> Result<Option<AuthRecord>, StorageError> {
        Ok(self.auth.lock().map_err(poisoned)?.clone())
    }

    async fn save_auth(&self, record: &AuthRecord) -> Result<(), StorageError> {
        *self.auth.lock().map_err(poisoned)? = Some(record.clone());
        Ok(())
    }

    async fn clear_auth(&self) -> Result<(), StorageError> {
        *self.auth.lock().map_err(poisoned)? = None;
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub content: Arc<dyn ExamContentRepository>,
    pub outbox: Arc<dyn ResultOutboxRepository>,
    pub auth: Arc<dyn AuthTokenRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            content: Arc::new(repo.clone()),
            outbox: Arc::new(repo.clone()),
            auth: Arc::new(repo),
        }
    }
}
