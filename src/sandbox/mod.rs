//! Sandbox module containing all execution-related components.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod executor;
pub mod interp;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod value;
