use wildmatch::WildMatch;

use crate::fields::FieldList;
use crate::script::{FieldMap, ScriptCache, ScriptEngine};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn from_token(tok: &str) -> Option<Self> {
        match tok {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    fn apply(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

/// `(name, min, max, min_open, max_open)`, or an operator-form comparison.
#[derive(Debug, Clone)]
pub struct WherePredicate {
    pub name: String,
    pub kind: WhereKind,
}

#[derive(Debug, Clone)]
pub enum WhereKind {
    Range {
        min: Value,
        max: Value,
        min_open: bool,
        max_open: bool,
    },
    Op {
        op: CmpOp,
        value: Value,
    },
}

impl WherePredicate {
    pub fn matches(&self, value: &Value) -> bool {
        match &self.kind {
            WhereKind::Op { op, value: rhs } => op.apply(value, rhs),
            WhereKind::Range {
                min,
                max,
                min_open,
                max_open,
            } => {
                let lower_ok = if *min_open { value > min } else { value >= min };
                let upper_ok = if *max_open { value < max } else { value <= max };
                lower_ok && upper_ok
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhereInPredicate {
    pub name: String,
    pub values: Vec<Value>,
}

impl WhereInPredicate {
    pub fn matches(&self, value: &Value) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

#[derive(Debug, Clone)]
pub struct WhereEvalPredicate {
    /// Script source, or the SHA1 used to look it up when `is_sha` is set.
    pub source: String,
    pub is_sha: bool,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum Predicate {
    /// Repeated `MATCH` globs are OR'd: an id passes if it matches any one.
    Match(Vec<String>),
    Where(WherePredicate),
    WhereIn(WhereInPredicate),
    WhereEval(WhereEvalPredicate),
}

/// The full set of predicates attached to a query or fence. Evaluation
/// order across predicates is AND; within a kind, predicates run in
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, p: Predicate) {
        self.predicates.push(p);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// True if any predicate besides `MATCH` is configured (used by the
    /// executor's SCAN COUNT fast path, where a bare `MATCH *` still
    /// counts as "everything").
    pub fn has_non_match(&self) -> bool {
        self.predicates.iter().any(|p| !matches!(p, Predicate::Match(_)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    /// `id` is matched against `MATCH` globs; `z` resolves the special `z`
    /// field name for `WHERE`/`WHEREEVAL`. `cache` resolves `WHEREEVALSHA`
    /// sources; pass `None` when no script predicate in the set is a SHA
    /// reference.
    pub fn matches(
        &self,
        id: &str,
        fields: &FieldList,
        z: Option<f64>,
        engine: &dyn ScriptEngine,
        cache: Option<&ScriptCache>,
    ) -> crate::error::LangResult<bool> {
        for p in &self.predicates {
            let ok = match p {
                Predicate::Match(globs) => globs.iter().any(|g| WildMatch::new(g).matches(id)),
                Predicate::Where(w) => {
                    let value = resolve(&w.name, fields, z);
                    w.matches(&value)
                }
                Predicate::WhereIn(w) => {
                    let value = resolve(&w.name, fields, z);
                    w.matches(&value)
                }
                Predicate::WhereEval(w) => {
                    let map = to_field_map(fields, z);
                    let source = if w.is_sha {
                        let cache = cache.ok_or(crate::error::LangReason::ShaNotFound)?;
                        cache.lookup(&w.source)?
                    } else {
                        w.source.clone()
                    };
                    engine.eval(&source, &map)?
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Resolve a predicate's field name against the object's fields, with `z`
/// resolving to the geometry's Z coordinate rather than a named field.
pub fn resolve(name: &str, fields: &FieldList, z: Option<f64>) -> Value {
    if name == "z" {
        return z.map(Value::Number).unwrap_or(Value::Null);
    }
    fields.get(name)
}

fn to_field_map(fields: &FieldList, z: Option<f64>) -> FieldMap {
    let mut map: FieldMap = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    map.insert("z".to_string(), z.map(Value::Number).unwrap_or(Value::Null));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::NullScriptEngine;

    fn fields_with_speed(speed: f64) -> FieldList {
        let mut f = FieldList::new();
        f.set("speed", Value::Number(speed));
        f
    }

    #[test]
    fn where_closed_range() {
        let w = WherePredicate {
            name: "speed".into(),
            kind: WhereKind::Range {
                min: Value::Number(10.0),
                max: Value::Number(20.0),
                min_open: false,
                max_open: false,
            },
        };
        assert!(w.matches(&Value::Number(10.0)));
        assert!(w.matches(&Value::Number(20.0)));
        assert!(!w.matches(&Value::Number(20.1)));
    }

    #[test]
    fn where_open_range() {
        let w = WherePredicate {
            name: "speed".into(),
            kind: WhereKind::Range {
                min: Value::Number(10.0),
                max: Value::Number(20.0),
                min_open: true,
                max_open: true,
            },
        };
        assert!(!w.matches(&Value::Number(10.0)));
        assert!(w.matches(&Value::Number(15.0)));
        assert!(!w.matches(&Value::Number(20.0)));
    }

    #[test]
    fn where_operator_form() {
        let w = WherePredicate {
            name: "speed".into(),
            kind: WhereKind::Op {
                op: CmpOp::Gt,
                value: Value::Number(20.0),
            },
        };
        assert!(w.matches(&Value::Number(25.0)));
        assert!(!w.matches(&Value::Number(20.0)));
    }

    #[test]
    fn predicate_set_scan_where_speed() {
        let mut set = PredicateSet::new();
        set.push(Predicate::Where(WherePredicate {
            name: "speed".into(),
            kind: WhereKind::Range {
                min: Value::Number(10.0),
                max: Value::Number(20.0),
                min_open: false,
                max_open: false,
            },
        }));
        let engine = NullScriptEngine;
        assert!(
            set.matches("t1", &fields_with_speed(15.0), None, &engine, None)
                .unwrap()
        );
        assert!(
            !set
                .matches("t1", &fields_with_speed(25.0), None, &engine, None)
                .unwrap()
        );
    }
}
