//! Filter subsystem for airrdb
//!
//! Compiles ADC filter expressions into document-store predicates.
//!
//! Wire format of a node:
//!
//! ```json
//! {"op": "<operator>", "content": {"field": "<name>", "value": <any>}}
//! {"op": "and" | "or", "content": [<node>, <node>, ...]}
//! ```
//!
//! Compilation is a pure function of the filter and the schema snapshot:
//! the same input always yields byte-identical predicate text.

mod compiler;
mod errors;
mod expr;
mod op;
mod predicate;

pub use compiler::{
    CompilerOptions, FilterCompiler, JUNCTION_AA_FIELD, JUNCTION_SUFFIXES_FIELD,
    MIN_JUNCTION_CONTAINS_LEN,
};
pub use errors::{FilterError, FilterErrorCode, FilterResult};
pub use expr::FilterExpr;
pub use op::FilterOp;
pub use predicate::CompiledPredicate;
