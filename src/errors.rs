//! Error handling for the storymint marketplace
//!
//! Every failure the purchase flow, the authoring pipeline or the record store can
//! produce is a variant of [`MarketError`]. Callers at the orchestration boundary get a
//! tagged result back; nothing here is meant to propagate as a panic.

use crate::wallet::BridgeError;
use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for the marketplace
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Not authenticated: sign in before purchasing")]
    NotAuthenticated,

    #[error("Wallet not ready: {state}")]
    WalletNotReady { state: String },

    #[error("Payment failed: {cause}")]
    PaymentFailed {
        #[source]
        cause: BridgeError,
    },

    /// The payment was mined but the entitlement could not be written.
    #[error("Payment {tx_hash} confirmed but purchase record was not saved: {source}")]
    RecordPersistFailed {
        tx_hash: String,
        #[source]
        source: Box<MarketError>,
    },

    /// A read-only ledger lookup failed during reconciliation; nothing was paid.
    #[error("Reconciliation failed: {cause}")]
    ReconcileFailed {
        #[source]
        cause: BridgeError,
    },

    /// The wallet account already pays for a different user.
    #[error("Wallet account {account} belongs to another user")]
    WalletAccountMismatch { account: String },

    #[error("Category not found: {name}")]
    CategoryNotFound { name: String },

    #[error("Story not found: {id}")]
    StoryNotFound { id: String },

    #[error("Chapter not found: {id}")]
    ChapterNotFound { id: String },

    #[error("Chapter {chapter_id} already purchased by {user_id}")]
    AlreadyPurchased { user_id: String, chapter_id: String },

    #[error("Identifier '{id}' cannot be used as a ledger id")]
    UnsupportedIdentifier { id: String },

    #[error("Invalid price: {message}")]
    InvalidPrice { message: String },

    #[error("User {user_id} is not the author of story {story_id}")]
    NotStoryAuthor { user_id: String, story_id: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Persistence operation failed: {operation} - {source}")]
    Persistence {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Mutex lock failed: {resource}")]
    MutexPoisoned { resource: String },
}

pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    pub fn wallet_not_ready(state: impl Into<String>) -> Self {
        Self::WalletNotReady {
            state: state.into(),
        }
    }

    pub fn payment_failed(cause: BridgeError) -> Self {
        Self::PaymentFailed { cause }
    }

    pub fn reconcile_failed(cause: BridgeError) -> Self {
        Self::ReconcileFailed { cause }
    }

    pub fn record_persist_failed(tx_hash: impl Into<String>, source: MarketError) -> Self {
        Self::RecordPersistFailed {
            tx_hash: tx_hash.into(),
            source: Box::new(source),
        }
    }

    pub fn category_not_found(name: impl Into<String>) -> Self {
        Self::CategoryNotFound { name: name.into() }
    }

    pub fn story_not_found(id: impl Into<String>) -> Self {
        Self::StoryNotFound { id: id.into() }
    }

    pub fn chapter_not_found(id: impl Into<String>) -> Self {
        Self::ChapterNotFound { id: id.into() }
    }

    pub fn invalid_price(message: impl Into<String>) -> Self {
        Self::InvalidPrice {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a persistence error from any store-side failure
    pub fn persistence(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Stable name of the failure category, shown in user notifications.
    pub fn category(&self) -> &'static str {
        match self {
            MarketError::NotAuthenticated => "NotAuthenticated",
            MarketError::WalletNotReady { .. } => "WalletNotReady",
            MarketError::PaymentFailed { .. } => "PaymentFailed",
            MarketError::RecordPersistFailed { .. } => "RecordPersistFailed",
            MarketError::ReconcileFailed { .. } => "ReconcileFailed",
            MarketError::WalletAccountMismatch { .. } => "WalletAccountMismatch",
            MarketError::CategoryNotFound { .. } => "CategoryNotFound",
            MarketError::StoryNotFound { .. } => "StoryNotFound",
            MarketError::ChapterNotFound { .. } => "ChapterNotFound",
            MarketError::AlreadyPurchased { .. } => "AlreadyPurchased",
            MarketError::UnsupportedIdentifier { .. } => "UnsupportedIdentifier",
            MarketError::InvalidPrice { .. } => "InvalidPrice",
            MarketError::NotStoryAuthor { .. } => "NotStoryAuthor",
            MarketError::Validation { .. } => "Validation",
            MarketError::Config { .. } => "Config",
            MarketError::Persistence { .. } | MarketError::MutexPoisoned { .. } => {
                "PersistenceFailure"
            }
        }
    }
}

impl MarketError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MarketError::Validation { .. }
            | MarketError::InvalidPrice { .. }
            | MarketError::UnsupportedIdentifier { .. }
            | MarketError::Config { .. } => StatusCode::BAD_REQUEST,
            MarketError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            MarketError::NotStoryAuthor { .. } | MarketError::WalletAccountMismatch { .. } => {
                StatusCode::FORBIDDEN
            }
            MarketError::CategoryNotFound { .. }
            | MarketError::StoryNotFound { .. }
            | MarketError::ChapterNotFound { .. } => StatusCode::NOT_FOUND,
            MarketError::AlreadyPurchased { .. } => StatusCode::CONFLICT,
            MarketError::WalletNotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MarketError::PaymentFailed { .. } | MarketError::ReconcileFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            // Default to 500 for server-side failures
            MarketError::RecordPersistFailed { .. }
            | MarketError::Persistence { .. }
            | MarketError::MutexPoisoned { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Helper trait for mutex access that reports poisoning as an error instead of panicking.
pub trait SafeLock<T: ?Sized> {
    fn safe_lock(&self) -> MarketResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self) -> MarketResult<std::sync::MutexGuard<'_, T>> {
        self.lock().map_err(|_| MarketError::MutexPoisoned {
            resource: "generic_mutex".to_string(),
        })
    }
}

impl From<sled::Error> for MarketError {
    fn from(err: sled::Error) -> Self {
        MarketError::persistence("sled_operation", err)
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::persistence("json_operation", err)
    }
}
