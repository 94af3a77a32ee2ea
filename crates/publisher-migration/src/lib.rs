//! Legacy website/contact migration into the publisher data model.
//!
//! The library exposes the validation, migration, rollback, status tracking, and notification
//! workflows used by the `publisher-migration-api` service and CLI.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
