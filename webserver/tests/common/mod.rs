//! Shared test utilities for webserver integration tests
#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::ApiHarness;
