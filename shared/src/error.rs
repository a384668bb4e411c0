//! Error taxonomy for the reservation–settlement pipeline
//!
//! Two families of variants:
//! - customer-visible outcomes (`Unavailable`, the verification states,
//!   `RecordNotFound`, `AlreadyRedeemed`, `Expired`) — surfaced with distinct
//!   messages;
//! - boundary failures (`StoreUnreachable`, `GatewayUnreachable`, `Cache`) —
//!   caught at component edges and converted into fallback behavior, never
//!   shown to the customer as hard errors unless no fallback remains.

use thiserror::Error;

/// Application error for the kiosk pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    /// Ledger check failed: no unit left or locker not rentable.
    #[error("Locker is not available: {0}")]
    Unavailable(String),

    /// The payment gateway could not be reached. Triggers the demo-intent
    /// fallback, not a customer-facing failure.
    #[error("Payment gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Payment not confirmed yet; caller may keep polling.
    #[error("Payment is still pending verification")]
    VerificationPending,

    /// Gateway reported a terminal failure for this payment.
    #[error("Payment verification failed")]
    VerificationFailed,

    /// The payment intent expired before confirmation.
    #[error("Payment expired before it was confirmed")]
    VerificationExpired,

    /// Lookup miss across the whole fallback chain.
    #[error("{0} not found")]
    RecordNotFound(String),

    /// Access code belongs to a booking that was already checked out.
    #[error("This access code has already been used")]
    AlreadyRedeemed,

    /// Booking past its expiry timestamp.
    #[error("This booking has expired")]
    Expired,

    /// Transport failure against the authoritative or mirror store
    /// (non-2xx, non-JSON, timeout). Not a domain failure.
    #[error("Store unreachable: {0}")]
    StoreUnreachable(String),

    /// Local cache (redb) failure.
    #[error("Local cache error: {0}")]
    Cache(String),

    /// Request validation failure.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Anything that indicates a bug or unexpected state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::GatewayUnreachable(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::RecordNotFound(resource.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnreachable(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error should block the customer-facing flow.
    ///
    /// Everything else is either retryable by polling or handled by a
    /// fallback path.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::VerificationFailed
                | Self::VerificationExpired
                | Self::AlreadyRedeemed
                | Self::Expired
        )
    }

    /// Whether this error is a transport failure rather than a domain one.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::StoreUnreachable(_) | Self::GatewayUnreachable(_) | Self::Cache(_)
        )
    }
}

/// Result alias used throughout the pipeline.
pub type AppResult<T> = Result<T, AppError>;
