//! External command execution
//!
//! Commands are handed to a shell as a single command line. Their stdout
//! and stderr are drained concurrently, line by line, and each line is
//! logged and/or captured according to an [`ExecPolicy`].

pub mod json;
pub mod policy;
pub mod runner;

pub use json::{parse_json_object, JsonRunner};
pub use policy::{Capture, ExecPolicy, Logging};
pub use runner::{command_line, CommandRunner, Executor};
