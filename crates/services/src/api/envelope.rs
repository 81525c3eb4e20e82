use serde::Deserialize;

use crate::error::ApiError;

/// Wire wrapper every backend response uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Validates the envelope against the HTTP status it arrived with.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Rejected` for a non-2xx status or `success: false`,
    /// and `ApiError::MissingData` when a successful envelope has no payload.
    pub fn into_result(self, status: u16) -> Result<T, ApiError> {
        if !(200..300).contains(&status) || !self.success {
            return Err(ApiError::Rejected {
                status,
                message: self
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "request failed".into()),
            });
        }
        self.data.ok_or(ApiError::MissingData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ApiEnvelope<u32> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn success_with_data() {
        let env = parse(r#"{"success": true, "data": 7}"#);
        assert_eq!(env.into_result(200).unwrap(), 7);
    }

    #[test]
    fn success_without_data_is_missing_data() {
        let env = parse(r#"{"success": true}"#);
        assert!(matches!(env.into_result(200), Err(ApiError::MissingData)));
    }

    #[test]
    fn failure_flag_is_rejected_with_message() {
        let env = parse(r#"{"success": false, "message": "token expired"}"#);
        match env.into_result(200) {
            Err(ApiError::Rejected { status, message }) => {
                assert_eq!(status, 200);
                assert_eq!(message, "token expired");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn error_status_wins_over_success_flag() {
        let env = parse(r#"{"success": true, "data": 1}"#);
        assert!(matches!(
            env.into_result(503),
            Err(ApiError::Rejected { status: 503, .. })
        ));
    }
}
