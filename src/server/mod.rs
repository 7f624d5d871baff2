// src/server/mod.rs

//! Server-side components for Sufuss.
//!
//! This module contains:
//! - `database`    → SQLite entity store for licenses, devices and services
//! - `licensing`   → Validate / activate / status endpoints
//! - `devices`     → Device registration and lookup
//! - `emulation`   → SFOS protocol emulation for every unrecognized request
//! - `fail_open`   → Outermost middleware turning failures into licensed answers
//! - `admin`       → Basic-auth admin API for license CRUD
//! - `bootstrap`   → Demo license seeding
//! - `handlers`    → Shared state and service endpoints
//! - `routes`      → Router builders
//! - `logging`     → Request logging and license events
//! - `validation`  → Admin input validation
//! - `api_error`   → Structured HTTP errors

pub mod admin;
pub mod api_error;
pub mod bootstrap;
pub mod database;
pub mod devices;
pub mod emulation;
pub mod fail_open;
pub mod handlers;
pub mod licensing;
pub mod logging;
pub mod routes;
pub mod validation;

pub use api_error::{ApiError, ErrorCode};
pub use bootstrap::seed_demo_license;
pub use database::Database;
pub use emulation::{classify, Bucket, IdGenerator, Templates, UuidGenerator};
pub use handlers::AppState;
pub use routes::{build_admin_router, build_router};
