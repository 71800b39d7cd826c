//! Database access layer
//!
//! One SQLite row per normalized user, holding the two JSON documents
//! (`quizzes`, `analyzed_matches`). Every mutation is a transactional
//! read-modify-write so concurrent writers for the same user linearize.

pub mod init;
pub mod quizzes;

pub use init::init_database;
