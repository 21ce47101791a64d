//! Common test utilities and infrastructure
//!
//! Shared fakes, fixtures and builders used across the supervisor
//! integration suites.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::SupervisorHarness;
