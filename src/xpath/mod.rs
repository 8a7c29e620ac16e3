//! XPath 1.0 Engine
//!
//! Full XPath 1.0 implementation:
//! - all 13 axes
//! - the complete core function library
//! - the four result types with XPath coercion rules
//! - caller-requested result types (snapshots, version-checked iterators)
//! - a bounded LRU cache of compiled expressions

pub mod axes;
pub mod compiler;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod result;
pub mod value;

pub use compiler::{compile, configure_cache, DEFAULT_CACHE_CAPACITY};
pub use eval::{evaluate, evaluate_with, EvalOptions};
pub use result::{evaluate_as, result_type, XPathResult};
pub use value::Value;
