//! Core module tree for the Cobra front end and runtime.
//! Only declare modules that exist in the src/core/ directory.

pub mod ast;
pub mod cache;
pub mod error;
pub mod interpreter;
pub mod ir;
pub mod keywords;
pub mod lexer;
pub mod limits;
pub mod logging;
pub mod lowering;
pub mod memory;
pub mod optimizer;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod scope;
pub mod security;
pub mod semantic_analyzer;
pub mod token;
pub mod visitor;

pub use error::CobraError;
pub use token::TokenKind; // Re-export only TokenKind; Token not needed externally currently
