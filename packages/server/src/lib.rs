// Typeset Preview Service - API Core
//
// This crate provides the backend service for generating typeset preview PDFs.
// Submitted jobs run through a fetch-template -> render pipeline on background
// tasks; job state is tracked durably with an append-only state log and
// reconciled at startup after unclean shutdowns.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
