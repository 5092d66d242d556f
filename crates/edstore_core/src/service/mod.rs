//! Core use-case services.
//!
//! # Responsibility
//! - Put handler-facing policy (conflict retries) on top of repositories.
//! - Keep handler layers decoupled from storage details.

pub mod document_service;
