//! Shared harness for navigation integration tests

pub mod navigator;

pub use navigator::TestNavigator;
