//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the transactional daily-record contract consumed by services.
//! - Isolate SQLite and in-memory storage details from reward orchestration.
//!
//! # Invariants
//! - Repository writes validate `DailyRecord` shape before persistence.
//! - Concurrent modification surfaces as `RepoError::Conflict` inside the
//!   runner and is never returned from a successful transaction.

pub mod daily_repo;
pub mod memory_repo;
