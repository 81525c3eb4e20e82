#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod auth;
pub mod config;
pub mod content;
pub mod delivery;
pub mod error;
pub mod exam_service;
pub mod recording;
pub mod timer_driver;

pub use kwave_core::Clock;

pub use app_services::AppServices;
pub use auth::AuthState;
pub use config::ServiceConfig;
pub use content::{ExamContent, ExamContentSource, StoredExamContent};
pub use delivery::{
    DeliveryOutcome, DeliveryPolicy, DrainReport, OfflineSink, ResultDeliveryService, ResultSink,
    SinkAck,
};
pub use error::{
    ApiError, AppServicesError, AuthError, ConfigError, ContentError, DeliveryError,
    ExamServiceError, SinkError,
};
pub use exam_service::{DeliveryState, ExamSessionService, SubmissionReceipt};
pub use recording::{AudioBackend, AudioError, Recorder};
pub use timer_driver::CountdownTask;
