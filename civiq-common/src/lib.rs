//! # CIVIQ Common Library
//!
//! Shared code for the CIVIQ civic-engagement backend including:
//! - Database schema and initialization
//! - Trust tier enumeration and normalization
//! - Analytics record / civic profile models
//! - Error taxonomy shared by all services
//! - Configuration loading

pub mod anonymize;
pub mod config;
pub mod db;
pub mod error;
pub mod tier;

pub use error::{Error, Result};
pub use tier::TrustTier;
