//! Token entity served by the in-memory store and used throughout the tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::TokenFilter;

/// Lifecycle status of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Valid,
    Inactive,
    Redeemed,
    Rejected,
    Revoked,
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenStatus::Valid => write!(f, "valid"),
            TokenStatus::Inactive => write!(f, "inactive"),
            TokenStatus::Redeemed => write!(f, "redeemed"),
            TokenStatus::Rejected => write!(f, "rejected"),
            TokenStatus::Revoked => write!(f, "revoked"),
        }
    }
}

/// Kind of token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    AccessToken,
    AuthorizationCode,
    DeviceCode,
    IdToken,
    RefreshToken,
    UserCode,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::AccessToken => write!(f, "access_token"),
            TokenType::AuthorizationCode => write!(f, "authorization_code"),
            TokenType::DeviceCode => write!(f, "device_code"),
            TokenType::IdToken => write!(f, "id_token"),
            TokenType::RefreshToken => write!(f, "refresh_token"),
            TokenType::UserCode => write!(f, "user_code"),
        }
    }
}

/// A persisted token.
///
/// `id` is assigned by the store on creation; a token that has never been
/// persisted has no identifier and cannot be added to or removed from the
/// cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: Option<String>,
    pub reference_id: Option<String>,
    pub subject: Option<String>,
    pub application_id: Option<String>,
    pub authorization_id: Option<String>,
    pub status: TokenStatus,
    pub token_type: TokenType,
    pub creation_date: DateTime<Utc>,
    pub payload: Option<String>,
}

impl Token {
    /// Create an unsaved, valid token of the given type.
    pub fn new(token_type: TokenType) -> Self {
        Self {
            id: None,
            reference_id: None,
            subject: None,
            application_id: None,
            authorization_id: None,
            status: TokenStatus::Valid,
            token_type,
            creation_date: Utc::now(),
            payload: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    pub fn with_authorization_id(mut self, authorization_id: impl Into<String>) -> Self {
        self.authorization_id = Some(authorization_id.into());
        self
    }

    pub fn with_status(mut self, status: TokenStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Check whether the token matches every criterion of a filter.
    pub fn matches(&self, filter: &TokenFilter) -> bool {
        fn field_matches(field: &Option<String>, wanted: &Option<String>) -> bool {
            match wanted {
                Some(wanted) => field.as_deref() == Some(wanted.as_str()),
                None => true,
            }
        }

        field_matches(&self.subject, &filter.subject)
            && field_matches(&self.application_id, &filter.client)
            && filter.status.map_or(true, |s| s == self.status)
            && filter.token_type.map_or(true, |t| t == self.token_type)
    }
}
