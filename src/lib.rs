//! Cobra language core: lexer, parser, semantic analyzer, optimizer and a
//! tree-walking interpreter, plus the `cobra` command-line driver.
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;

pub use crate::core::error::CobraError;
pub use crate::core::interpreter::{ExecuteOptions, Interpreter};
