use std::sync::Arc;

use storage::repository::{ResultOutboxRepository, Storage};

use crate::api::{ApiClient, HttpExamContent, HttpResultSink};
use crate::auth::AuthState;
use crate::config::ServiceConfig;
use crate::content::{ExamContentSource, StoredExamContent};
use crate::delivery::{OfflineSink, ResultDeliveryService, ResultSink};
use crate::error::AppServicesError;
use crate::exam_service::ExamSessionService;
use crate::Clock;

/// Assembles app-facing services over one storage backend.
///
/// With an API base URL configured, content is fetched from the backend and cached
/// locally, and results are posted to it. Without one, content comes from storage
/// and results stay in the outbox.
#[derive(Clone)]
pub struct AppServices {
    auth: Arc<AuthState>,
    exams: Arc<ExamSessionService>,
    delivery: Arc<ResultDeliveryService>,
    outbox: Arc<dyn ResultOutboxRepository>,
    online: bool,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization, restoring the saved
    /// sign-in or building the HTTP client fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: &ServiceConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(storage, clock, config).await
    }

    /// Build services over an already opened storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if restoring the saved sign-in or building the
    /// HTTP client fails.
    pub async fn from_storage(
        storage: Storage,
        clock: Clock,
        config: &ServiceConfig,
    ) -> Result<Self, AppServicesError> {
        let auth = Arc::new(AuthState::new(Arc::clone(&storage.auth), clock));
        if let Some(user) = auth.init().await? {
            tracing::info!(user_id = %user.id, role = %user.role, "signed in");
        }

        let (content, sink): (Arc<dyn ExamContentSource>, Arc<dyn ResultSink>) =
            match &config.api_base_url {
                Some(base_url) => {
                    let api = ApiClient::new(base_url.clone(), config.api_timeout, Arc::clone(&auth))?;
                    tracing::info!(base_url = %api.base_url(), "using backend");
                    (
                        Arc::new(
                            HttpExamContent::new(api.clone())
                                .with_cache(Arc::clone(&storage.content)),
                        ),
                        Arc::new(HttpResultSink::new(api)),
                    )
                }
                None => {
                    tracing::info!("no backend configured, running offline");
                    (
                        Arc::new(StoredExamContent::new(Arc::clone(&storage.content))),
                        Arc::new(OfflineSink),
                    )
                }
            };

        let delivery = Arc::new(ResultDeliveryService::new(
            clock,
            Arc::clone(&storage.outbox),
            sink,
            config.delivery,
        ));
        let exams = Arc::new(
            ExamSessionService::new(
                clock,
                content,
                Arc::clone(&storage.outbox),
                Arc::clone(&delivery),
            )
            .with_practice_shuffle(config.shuffle_practice),
        );

        Ok(Self {
            auth,
            exams,
            delivery,
            outbox: storage.outbox,
            online: config.is_online(),
        })
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthState> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn exams(&self) -> Arc<ExamSessionService> {
        Arc::clone(&self.exams)
    }

    #[must_use]
    pub fn delivery(&self) -> Arc<ResultDeliveryService> {
        Arc::clone(&self.delivery)
    }

    #[must_use]
    pub fn outbox(&self) -> Arc<dyn ResultOutboxRepository> {
        Arc::clone(&self.outbox)
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online
    }
}
