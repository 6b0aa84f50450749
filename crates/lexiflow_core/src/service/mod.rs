//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository transactions into use-case level APIs.
//! - Keep the invocation boundary decoupled from storage details.

pub mod reward_service;
