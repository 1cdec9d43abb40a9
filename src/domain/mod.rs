//! Core domain types and logic: tokenizer, parser, evaluator and engine façade.

pub mod error;
pub mod indicator;
pub mod token;
pub mod ast;
pub mod parser;
pub mod value;
pub mod allocation;
pub mod trace;
pub mod forms;
pub mod eval;
pub mod engine;
pub mod config_validation;
