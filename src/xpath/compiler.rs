//! XPath Expression Compiler
//!
//! Compiles parsed expressions into a flat op sequence and keeps a
//! process-wide LRU cache of compiled programs keyed by source text.
//! Compilation never consults function or namespace resolvers, so cached
//! programs are safe to share; failed compilations are never cached.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use log::debug;
use lru::LruCache;

use crate::error::Result;

use super::parser::{self, Axis, BinaryOp, Expr, LocationPath, NodeTest, Step};

/// Global LRU cache of compiled expressions.
static XPATH_CACHE: Mutex<Option<LruCache<String, Arc<CompiledExpr>>>> = Mutex::new(None);

/// Default cache capacity; adjustable via [`configure_cache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Compiled XPath expression: a stack program.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    pub ops: Vec<Op>,
}

/// One evaluation operation.
#[derive(Debug, Clone)]
pub enum Op {
    /// Push the document root as a singleton node-set.
    Root,
    /// Push the context node as a singleton node-set.
    Context,
    /// Pop a node-set, walk an axis from each member, filter by node test,
    /// apply the step predicates per context node, push the merged result.
    Step {
        axis: Axis,
        test: NodeTest,
        predicates: Vec<CompiledExpr>,
    },
    /// Pop a node-set and filter it (FilterExpr predicate, document order).
    Predicate(CompiledExpr),
    /// Pop two node-sets, push their deduplicated union.
    Union,
    Number(f64),
    Literal(String),
    Variable(String),
    /// Pop the argument values, call the named function.
    Call(String, usize),
    /// Pop two values, apply a binary operator.
    Binary(BinaryOp),
    /// Pop the left operand; evaluate the program only if it is true.
    And(CompiledExpr),
    /// Pop the left operand; evaluate the program only if it is false.
    Or(CompiledExpr),
    /// Pop a value, push its numeric negation.
    Negate,
}

impl CompiledExpr {
    /// Compile a parsed expression.
    pub fn compile(expr: &Expr) -> CompiledExpr {
        let mut ops = Vec::new();
        compile_expr(expr, &mut ops);
        CompiledExpr { ops }
    }
}

fn compile_expr(expr: &Expr, ops: &mut Vec<Op>) {
    match expr {
        Expr::Number(n) => ops.push(Op::Number(*n)),
        Expr::Literal(s) => ops.push(Op::Literal(s.clone())),
        Expr::Variable(name) => ops.push(Op::Variable(name.clone())),
        Expr::FunctionCall(name, args) => {
            for arg in args {
                compile_expr(arg, ops);
            }
            ops.push(Op::Call(name.clone(), args.len()));
        }
        Expr::Negate(inner) => {
            compile_expr(inner, ops);
            ops.push(Op::Negate);
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            compile_expr(left, ops);
            ops.push(Op::And(CompiledExpr::compile(right)));
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            compile_expr(left, ops);
            ops.push(Op::Or(CompiledExpr::compile(right)));
        }
        Expr::Binary(op, left, right) => {
            compile_expr(left, ops);
            compile_expr(right, ops);
            ops.push(Op::Binary(*op));
        }
        Expr::Union(left, right) => {
            compile_expr(left, ops);
            compile_expr(right, ops);
            ops.push(Op::Union);
        }
        Expr::Path(path) => compile_path(path, ops),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            compile_expr(primary, ops);
            for pred in predicates {
                ops.push(Op::Predicate(CompiledExpr::compile(pred)));
            }
            for step in steps {
                ops.push(compile_step(step));
            }
        }
    }
}

fn compile_path(path: &LocationPath, ops: &mut Vec<Op>) {
    ops.push(if path.absolute { Op::Root } else { Op::Context });
    for step in &path.steps {
        ops.push(compile_step(step));
    }
}

fn compile_step(step: &Step) -> Op {
    Op::Step {
        axis: step.axis,
        test: step.test.clone(),
        predicates: step.predicates.iter().map(CompiledExpr::compile).collect(),
    }
}

fn with_cache<T>(f: impl FnOnce(&mut LruCache<String, Arc<CompiledExpr>>) -> T) -> T {
    let mut guard = XPATH_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    let cache = guard.get_or_insert_with(|| {
        LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    });
    f(cache)
}

/// Compile an expression, consulting the shared cache first.
pub fn compile(source: &str) -> Result<Arc<CompiledExpr>> {
    if let Some(hit) = with_cache(|cache| cache.get(source).cloned()) {
        return Ok(hit);
    }
    debug!("xpath cache miss: {:?}", source);
    let expr = parser::parse(source)?;
    let compiled = Arc::new(CompiledExpr::compile(&expr));
    with_cache(|cache| cache.put(source.to_string(), Arc::clone(&compiled)));
    Ok(compiled)
}

/// Compile without touching the cache.
pub fn compile_uncached(source: &str) -> Result<CompiledExpr> {
    let expr = parser::parse(source)?;
    Ok(CompiledExpr::compile(&expr))
}

/// Replace the cache with an empty one of the given capacity.
pub fn configure_cache(capacity: usize) {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    let mut guard = XPATH_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Some(LruCache::new(capacity));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_simple() {
        let compiled = compile_uncached("/root").unwrap();
        assert!(matches!(compiled.ops[0], Op::Root));
        assert!(matches!(compiled.ops[1], Op::Step { axis: Axis::Child, .. }));
    }

    #[test]
    fn cache_hits_share_and_capacity_bounds() {
        // At the default capacity a back-to-back recompile is a hit.
        let a = compile("/cache/hit/test").unwrap();
        let b = compile("/cache/hit/test").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // Shrinking the cache evicts least-recently-used programs.
        configure_cache(2);
        let first = compile("/cache/evict/one").unwrap();
        let _ = compile("/cache/evict/two").unwrap();
        let _ = compile("/cache/evict/three").unwrap();
        let again = compile("/cache/evict/one").unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        configure_cache(DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn failed_compilations_are_not_cached() {
        assert!(compile("/r/[").is_err());
        // Still an error the second time; nothing poisoned the cache.
        assert!(compile("/r/[").is_err());
    }

    #[test]
    fn short_circuit_ops() {
        let compiled = compile_uncached("1 and 2 or 3").unwrap();
        assert!(compiled
            .ops
            .iter()
            .any(|op| matches!(op, Op::Or(_))));
        assert!(!compiled.ops.iter().any(|op| matches!(op, Op::Binary(_))));
    }

    #[test]
    fn predicates_compile_into_their_step() {
        let compiled = compile_uncached("/r/x[1][@id='a']").unwrap();
        let step = compiled
            .ops
            .iter()
            .find_map(|op| match op {
                Op::Step { predicates, .. } if !predicates.is_empty() => Some(predicates),
                _ => None,
            })
            .expect("step with predicates");
        assert_eq!(step.len(), 2);
    }
}
