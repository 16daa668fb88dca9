//! Field/value model, predicate evaluation, area expressions, and the
//! command-tail parser shared by the query executor and the hook registry.
//!
//! The wire codec that turns raw bytes into argument vectors is out of
//! scope here (see the crate's owning spec); everything in this crate
//! operates on already-tokenized `&[String]` command tails.

pub mod area;
pub mod detect;
pub mod error;
pub mod fields;
pub mod geometry;
pub mod parser;
pub mod predicate;
pub mod script;
pub mod tokens;
pub mod value;

pub use area::{AreaExpression, ContainMode, GetResolver, NoGetResolver, Primitive};
pub use detect::{Detect, DetectSet};
pub use error::{LangError, LangReason, LangResult};
pub use fields::FieldList;
pub use geometry::{haversine_meters, Geometry, EARTH_RADIUS_M};
pub use parser::{parse_command, Command, Options, Order, Output, SearchTokens};
pub use predicate::{CmpOp, Predicate, PredicateSet, WhereEvalPredicate, WhereInPredicate, WhereKind, WherePredicate};
pub use script::{FieldMap, NullScriptEngine, ScriptCache, ScriptEngine};
#[cfg(feature = "scripting")]
pub use script::RhaiScriptEngine;
pub use tokens::Cursor;
pub use value::Value;
