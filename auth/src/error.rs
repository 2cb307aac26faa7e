use thiserror::Error;
use axum::http::StatusCode;

use crate::session::ProviderKind;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Registration via {0} single sign-on is disabled")]
    RegistrationDisabled(ProviderKind),

    #[error("Provider {0} is not configured")]
    ProviderNotConfigured(String),

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("OAuth error: {0}")]
    OAuthError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Host storage error: {0}")]
    HostError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Session expired")]
    SessionExpired,

    #[error("Access denied")]
    AccessDenied,
}

impl From<AuthError> for StatusCode {
    fn from(error: AuthError) -> StatusCode {
        match error {
            AuthError::ProviderNotConfigured(_) => StatusCode::NOT_FOUND,
            AuthError::StateMismatch => StatusCode::BAD_REQUEST,
            AuthError::AuthenticationRequired | AuthError::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::RegistrationDisabled(_) | AuthError::AccessDenied => StatusCode::FORBIDDEN,
            AuthError::OAuthError(_) | AuthError::NetworkError(_) => StatusCode::BAD_GATEWAY,
            AuthError::JsonError(_)
            | AuthError::UrlError(_)
            | AuthError::HostError(_)
            | AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_disabled_is_forbidden() {
        let status = StatusCode::from(AuthError::RegistrationDisabled(ProviderKind::Auth0));
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_registration_disabled_names_provider() {
        let err = AuthError::RegistrationDisabled(ProviderKind::GitHub);
        assert_eq!(err.to_string(), "Registration via GitHub single sign-on is disabled");
    }
}
