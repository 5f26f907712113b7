//! Interface definitions for the index repository.
//!
//! This module defines the abstract `IndexRepository` trait that allows
//! for dependency injection and swappable search backend implementations.

mod index_repository;

pub use index_repository::IndexRepository;
