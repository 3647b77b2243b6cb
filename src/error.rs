//! Error types for actor onboarding.

use uuid::Uuid;

use crate::profile::model::ChildKind;

/// Top-level error type for every core operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error(transparent)]
    Rule(#[from] RuleViolation),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    BusinessRuleViolation,
    Internal,
}

/// Entities that can be reported missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Account,
    Customer,
    Dealer,
    Expert,
    Location,
    BusinessLocation,
}

impl Entity {
    fn tag(&self) -> &'static str {
        match self {
            Self::Account => "account_not_found",
            Self::Customer => "customer_not_found",
            Self::Dealer => "dealer_not_found",
            Self::Expert => "expert_not_found",
            Self::Location => "location_not_found",
            Self::BusinessLocation => "business_location_not_found",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Account => "Account",
            Self::Customer => "Customer",
            Self::Dealer => "Dealer",
            Self::Expert => "Expert",
            Self::Location => "Location",
            Self::BusinessLocation => "Business location",
        };
        write!(f, "{s}")
    }
}

/// Named business-rule violations. Each carries a stable type tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    #[error("Invalid {kind} code: {code}")]
    InvalidCode { kind: ChildKind, code: String },

    #[error("Invalid state: {state}")]
    InvalidState { state: String },

    #[error("Invalid counties for {state}: {}", .counties.join(", "))]
    InvalidCounties { state: String, counties: Vec<String> },

    #[error("Invalid zip code: {zip_code}")]
    InvalidZipCode { zip_code: String },

    #[error("Locations have active work orders: {}", format_ids(.location_ids))]
    ConflictingActiveWork { location_ids: Vec<Uuid> },

    #[error("Business name is required")]
    RequiredBusinessName,

    #[error("An account with email {email} already exists")]
    DuplicateEmail { email: String },

    #[error("Terms and conditions must be accepted")]
    TermsNotAccepted,

    #[error("Session is invalid or has expired")]
    InvalidSession,

    #[error("OTP was sent recently, try again in {remaining_secs} seconds")]
    OtpCoolDown { remaining_secs: i64 },

    #[error("OTP does not match")]
    InvalidOtp,

    #[error("OTP has expired")]
    OtpExpired,

    #[error("Email address has not been verified")]
    EmailNotVerified,
}

impl RuleViolation {
    /// Stable machine-readable tag.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::InvalidCode { .. } => "invalid_code",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidCounties { .. } => "invalid_counties",
            Self::InvalidZipCode { .. } => "invalid_zip_code",
            Self::ConflictingActiveWork { .. } => "conflicting_active_work",
            Self::RequiredBusinessName => "required_business_name",
            Self::DuplicateEmail { .. } => "duplicate_email",
            Self::TermsNotAccepted => "terms_not_accepted",
            Self::InvalidSession => "invalid_session",
            Self::OtpCoolDown { .. } => "otp_cool_down",
            Self::InvalidOtp => "invalid_otp",
            Self::OtpExpired => "otp_expired",
            Self::EmailNotVerified => "email_not_verified",
        }
    }
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Rule(_) => ErrorKind::BusinessRuleViolation,
            _ => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable tag for callers that branch on errors.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound { entity, .. } => entity.tag(),
            Self::Rule(rule) => rule.type_tag(),
            Self::Config(_) => "config",
            Self::Database(_) => "database",
            Self::Cache(_) => "cache",
            Self::Collaborator(_) => "collaborator",
            Self::Serialization(_) => "serialization",
        }
    }

    /// The rule violation, if this is one.
    pub fn rule(&self) -> Option<&RuleViolation> {
        match self {
            Self::Rule(rule) => Some(rule),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Cache-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid key pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by external collaborators (catalog, work orders,
/// identity, messaging, financial accounts).
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("{service} rejected the request: {reason}")]
    Rejected { service: String, reason: String },
}

impl CollaboratorError {
    pub fn request_failed(service: &str, reason: impl ToString) -> Self {
        Self::RequestFailed {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_errors() {
        assert_eq!(
            Error::Unauthorized("no account".into()).kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            Error::not_found(Entity::Dealer, Uuid::nil()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::from(RuleViolation::InvalidOtp).kind(),
            ErrorKind::BusinessRuleViolation
        );
        assert_eq!(
            Error::from(DatabaseError::Query("boom".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn type_tags_are_stable() {
        assert_eq!(
            Error::not_found(Entity::BusinessLocation, "x").type_tag(),
            "business_location_not_found"
        );
        assert_eq!(
            Error::from(RuleViolation::OtpCoolDown { remaining_secs: 3 }).type_tag(),
            "otp_cool_down"
        );
        assert_eq!(
            Error::from(RuleViolation::RequiredBusinessName).type_tag(),
            "required_business_name"
        );
    }

    #[test]
    fn messages_include_details() {
        let err = RuleViolation::InvalidCounties {
            state: "Alabama".into(),
            counties: vec!["Nowhere".into(), "Elsewhere".into()],
        };
        assert_eq!(err.to_string(), "Invalid counties for Alabama: Nowhere, Elsewhere");

        let err = RuleViolation::OtpCoolDown { remaining_secs: 42 };
        assert!(err.to_string().contains("42 seconds"));
    }
}
