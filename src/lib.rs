//! Sufuss - a Sophos license server simulator.
//!
//! Emulates the licensing protocol spoken by Sophos Firewall (SFOS 18.5.0)
//! devices for lab and testing use. Every device-facing request gets a
//! plausible "licensed" answer: known endpoints are backed by a small SQLite
//! store of licenses, devices and services, and everything else is answered
//! by a rule-based emulation layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sufuss::config::SufussConfig;
//! use sufuss::server::{build_router, AppState, Database};
//!
//! let db = Database::in_memory().await?;
//! let state = AppState::new(Arc::new(db), Arc::new(SufussConfig::default()));
//! let app = build_router(state);
//! ```

pub mod config;
pub mod errors;
pub mod license_key;

pub mod server;
