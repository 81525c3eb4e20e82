//! REST boundary: envelope validation, the shared HTTP client and the
//! content and result endpoints built on it.

mod client;
mod content;
mod envelope;
mod results;

pub use client::ApiClient;
pub use content::HttpExamContent;
pub use envelope::ApiEnvelope;
pub use results::HttpResultSink;
