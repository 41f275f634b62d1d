//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod config;
pub mod mock_vendor;
