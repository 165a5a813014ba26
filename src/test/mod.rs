//! Shared fixtures for unit tests.

pub mod msft;
