//! Integration tests that exercise the read path and the ingestion loop
//! across crates: window, database, and node tiers wired together the way
//! the binaries wire them.
//!
//! [`helpers`] holds the fixtures and tier doubles shared with the API
//! binary's router tests.

pub mod helpers;
