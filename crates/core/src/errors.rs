use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::ConfigError;

/// Malformed coupon definitions. These are caller bugs: they are surfaced when a
/// coupon is created or updated, and guard the discount algorithms.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CouponDefinitionError {
    #[error("coupon code must not be empty")]
    EmptyCode,
    #[error("coupon `{code}` code is already defined")]
    DuplicateCode { code: String },
    #[error("coupon `{code}` requires a discount value")]
    MissingDiscountValue { code: String },
    #[error("coupon `{code}` discount value must be greater than zero, got {value}")]
    NonPositiveDiscountValue { code: String, value: Decimal },
    #[error("coupon `{code}` discount value cannot be negative, got {value}")]
    NegativeDiscountValue { code: String, value: Decimal },
    #[error("coupon `{code}` percentage must be within 0..=100, got {value}")]
    PercentageOutOfRange { code: String, value: Decimal },
    #[error("coupon `{code}` bogo {field} quantity must be at least 1, got {value}")]
    BogoQuantityBelowOne { code: String, field: &'static str, value: i64 },
    #[error("coupon `{code}` minimum cart value cannot be negative, got {value}")]
    NegativeMinimumCartValue { code: String, value: Decimal },
    #[error("coupon `{code}` starts after it ends")]
    InvertedValidityWindow { code: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    InvalidCoupon(#[from] CouponDefinitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<CouponDefinitionError> for ApplicationError {
    fn from(value: CouponDefinitionError) -> Self {
        Self::Domain(DomainError::InvalidCoupon(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Stable machine-readable class for command envelopes.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
