/// Error taxonomy shared by every handler surface.
///
/// `InvalidRequest` is client-caused and user-correctable, `NotFound` means
/// a referenced entity is absent, and `Internal` covers everything the
/// caller cannot fix. Handlers map these to HTTP responses through
/// [`CcError::status_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CcError {
    InvalidRequest(String),
    NotFound(String),
    Internal(String),
}

impl CcError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidRequest(message) | Self::NotFound(message) | Self::Internal(message) => {
                message
            }
        }
    }
}

impl std::fmt::Display for CcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for CcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        assert_eq!(CcError::InvalidRequest("bad".into()).status_code(), 400);
        assert_eq!(CcError::NotFound("gone".into()).status_code(), 404);
        assert_eq!(CcError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn displays_code_and_message() {
        let error = CcError::NotFound("compact 'x' is not configured".to_string());
        assert_eq!(
            error.to_string(),
            "not_found: compact 'x' is not configured"
        );
    }
}
