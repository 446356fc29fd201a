//! Consolidated test modules.
//!
//! End-to-end tests that drive the kernel the way a paid route does, from
//! credential to charge, against a migrated SQLite database.
