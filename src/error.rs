//! Error types for the OIDC relying-party client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OidcError {
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    #[error("Malformed discovery document: {0}")]
    MalformedDocument(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Malformed ID token: {0}")]
    MalformedToken(String),

    #[error("Client registration rejected with status {status}: {body}")]
    Registration { status: u16, body: String },

    #[error("Token endpoint rejected request with status {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("UserInfo endpoint rejected request with status {status}: {body}")]
    UserInfoEndpoint { status: u16, body: String },

    #[error("No signing key found for kid {kid:?}")]
    KeyNotFound { kid: Option<String> },

    #[error("Invalid ID token signature: {0}")]
    InvalidSignature(String),

    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("ID token is not intended for client {client_id}")]
    AudienceMismatch { client_id: String },

    #[error("ID token expired at {exp}")]
    TokenExpired { exp: i64 },

    #[error("Nonce mismatch - possible replay attack")]
    NonceMismatch,

    #[error("State mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("Subject mismatch: ID token sub {expected}, userinfo sub {actual}")]
    SubjectMismatch { expected: String, actual: String },

    #[error("Missing code parameter in callback")]
    MissingCode,

    #[error("Missing state parameter in callback")]
    MissingState,

    #[error("Authorization denied: {error} - {description}")]
    AuthorizationDenied { error: String, description: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OidcError {
    pub(crate) fn network(message: impl Into<String>, retryable: bool) -> Self {
        OidcError::Network {
            message: message.into(),
            retryable,
        }
    }

    /// Whether repeating the same call may succeed without caller intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, OidcError::Network { retryable: true, .. })
    }

    /// Whether this failure is a trust check rejecting the response
    ///
    /// These must be reported distinctly from transport failures and are
    /// always fatal to the authentication attempt.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            OidcError::KeyNotFound { .. }
                | OidcError::InvalidSignature(_)
                | OidcError::IssuerMismatch { .. }
                | OidcError::AudienceMismatch { .. }
                | OidcError::TokenExpired { .. }
                | OidcError::NonceMismatch
                | OidcError::StateMismatch
                | OidcError::SubjectMismatch { .. }
                | OidcError::MissingCode
                | OidcError::MissingState
        )
    }
}

pub type Result<T> = std::result::Result<T, OidcError>;
