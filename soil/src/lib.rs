//! Soil Library
//!
//! Named deployments of test clusters, provisioned through external tools
//! and tracked by status records under one root directory.

pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod process;
pub mod storage;
pub mod utils;

/// Build an argument vector from string-like items
#[macro_export]
macro_rules! argv {
    ($($arg:expr),* $(,)?) => {
        vec![$($arg.to_string()),*]
    };
}
