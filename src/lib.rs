//! Library root for the `storymint` crate

// Core error handling
pub mod api_errors;
pub mod errors;

// Marketplace records and access decisions
pub mod access;
pub mod story;

// Persistence
pub mod record_store;
pub mod record_store_sled;

// Payment bridge
pub mod wallet;
pub mod wallet_rpc;

// Purchase flow, chapter pages and authoring
pub mod authoring;
pub mod chapter_view;
pub mod purchase;

// Configuration & CLI
pub mod app_state;
pub mod cli;
pub mod config;

// Web server interface
pub mod security;
pub mod web;


pub use access::{can_access, ChapterIdSet};
pub use errors::{MarketError, MarketResult};
pub use purchase::PurchaseOrchestrator;
pub use record_store::RecordStore;
pub use story::{Chapter, PurchaseRecord, Story, UserSession};
