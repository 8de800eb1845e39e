//! # Optimizer Testing Utils
//!
//! Shared testing utilities for the priority optimization engine.
//!
//! - **Mock Repositories**: in-memory implementations of every repository trait
//! - **Mock Collaborators**: task store with failure injection, fixed signal
//!   aggregator, recording activity log
//! - **Test Data Builders**: tasks, rules, schedules and signals
//!
//! ```toml
//! [dev-dependencies]
//! optimizer-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
