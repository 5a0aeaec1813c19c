//! NVM Core Integration Tests
//!
//! Tests session flows of the `nvm_core` crate against the simulated platform.
//!
//! ## Logging
//!
//! The `env_logger` crate can be used to enable logging during tests.
//!
//! To enable logging, set the `RUST_LOG` environment variable to the desired
//! log level (e.g., `debug`, `info`, `warn`, `error`) before running the tests.
//!
//! For example, to enable debug logging for the goal paths only, run:
//!
//! ```sh
//! RUST_LOG=nvm_goal=debug,nvm_session=debug cargo test -p nvm_core --test nvm_core_integration
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

// Common utilities available to all test modules
mod common;

// Test module groups
mod goal_tests;
mod persistence_tests;
mod security_tests;
mod session_tests;
