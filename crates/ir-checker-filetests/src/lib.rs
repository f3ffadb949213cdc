//! File-based tests for the IR checker.
//!
//! Similar to Cranelift's filetests, these tests read `.chk` files that contain:
//! - A test command (`test check`, `test malformed`)
//! - Test sources with `CHECK` directives and the compiler dumps to check them against
//! - The expected outcome of every group, or the expected error

pub mod parser;

mod test_check;
mod test_malformed;

pub use parser::{parse_command, parse_test_file, TestCase};
