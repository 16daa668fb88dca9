use crate::detect::DetectSet;
use crate::error::{LangReason, LangResult};
use crate::predicate::{CmpOp, Predicate, PredicateSet, WhereInPredicate, WhereKind, WherePredicate};
use crate::tokens::Cursor;
use crate::value::Value;

use super::Order;

/// Order-free option state accumulated while scanning a command tail.
/// Each field is `Some`/non-default only once an option has actually been
/// seen, so duplicate detection can compare against that.
#[derive(Debug, Default)]
pub struct Options {
    pub cursor: u64,
    pub limit: Option<u64>,
    pub sparse: Option<u8>,
    pub match_globs: Vec<String>,
    pub predicates: PredicateSet,
    pub no_fields: bool,
    pub fence: bool,
    pub detect: Option<DetectSet>,
    pub commands: Option<Vec<String>>,
    pub distance: bool,
    pub nodwell: bool,
    pub order: Option<Order>,
    pub clip: bool,
    pub buffer: Option<f64>,

    seen_cursor: bool,
    seen_limit: bool,
    seen_sparse: bool,
    seen_fence: bool,
    seen_detect: bool,
    seen_commands: bool,
    seen_order: bool,
    seen_clip: bool,
    seen_buffer: bool,
    seen_nofields: bool,
    seen_distance: bool,
    seen_nodwell: bool,
}

impl Options {
    /// Consumes every recognized option token at the cursor's current
    /// position, stopping at the first token that is not an option keyword
    /// (the output keyword or area input).
    pub fn parse(cursor: &mut Cursor) -> LangResult<Self> {
        let mut opts = Options::default();
        loop {
            let Some(tok) = cursor.peek() else { break };
            let upper = tok.to_ascii_uppercase();
            match upper.as_str() {
                "CURSOR" => {
                    if opts.seen_cursor {
                        return Err(LangReason::DuplicateArg("CURSOR".into()).into());
                    }
                    cursor.next()?;
                    opts.cursor = cursor.next_u64()?;
                    opts.seen_cursor = true;
                }
                "LIMIT" => {
                    if opts.seen_limit {
                        return Err(LangReason::DuplicateArg("LIMIT".into()).into());
                    }
                    cursor.next()?;
                    let n = cursor.next_u64()?;
                    if n == 0 {
                        return Err(LangReason::ArgInvalid("LIMIT 0".into()).into());
                    }
                    opts.limit = Some(n);
                    opts.seen_limit = true;
                }
                "SPARSE" => {
                    if opts.seen_sparse {
                        return Err(LangReason::DuplicateArg("SPARSE".into()).into());
                    }
                    cursor.next()?;
                    let n = cursor.next_u64()?;
                    if !(1..=8).contains(&n) {
                        return Err(LangReason::ArgInvalid(format!("SPARSE {n}")).into());
                    }
                    opts.sparse = Some(n as u8);
                    opts.seen_sparse = true;
                }
                "MATCH" => {
                    cursor.next()?;
                    let glob = cursor.next()?.to_string();
                    opts.match_globs.push(glob);
                }
                "WHERE" => {
                    cursor.next()?;
                    opts.predicates.push(Predicate::Where(parse_where(cursor)?));
                }
                "WHEREIN" => {
                    cursor.next()?;
                    opts.predicates
                        .push(Predicate::WhereIn(parse_wherein(cursor)?));
                }
                "WHEREEVAL" | "WHEREEVALSHA" => {
                    let sha_form = upper == "WHEREEVALSHA";
                    cursor.next()?;
                    opts.predicates
                        .push(Predicate::WhereEval(super::script_pred::parse_whereeval(
                            cursor, sha_form,
                        )?));
                }
                "NOFIELDS" => {
                    if opts.seen_nofields {
                        return Err(LangReason::DuplicateArg("NOFIELDS".into()).into());
                    }
                    cursor.next()?;
                    opts.no_fields = true;
                    opts.seen_nofields = true;
                }
                "FENCE" => {
                    // Duplicate FENCE is explicitly tolerated (spec §4.2).
                    cursor.next()?;
                    opts.fence = true;
                    opts.seen_fence = true;
                }
                "DETECT" => {
                    if opts.seen_detect {
                        return Err(LangReason::DuplicateArg("DETECT".into()).into());
                    }
                    cursor.next()?;
                    let csv = cursor.next()?.to_string();
                    opts.detect = Some(DetectSet::parse_csv(&csv)?);
                    opts.seen_detect = true;
                }
                "COMMANDS" => {
                    if opts.seen_commands {
                        return Err(LangReason::DuplicateArg("COMMANDS".into()).into());
                    }
                    cursor.next()?;
                    let csv = cursor.next()?.to_string();
                    opts.commands = Some(
                        csv.split(',')
                            .map(|s| s.trim().to_ascii_uppercase())
                            .collect(),
                    );
                    opts.seen_commands = true;
                }
                "DISTANCE" => {
                    if opts.seen_distance {
                        return Err(LangReason::DuplicateArg("DISTANCE".into()).into());
                    }
                    cursor.next()?;
                    opts.distance = true;
                    opts.seen_distance = true;
                }
                "NODWELL" => {
                    if opts.seen_nodwell {
                        return Err(LangReason::DuplicateArg("NODWELL".into()).into());
                    }
                    cursor.next()?;
                    opts.nodwell = true;
                    opts.seen_nodwell = true;
                }
                "ASC" | "DESC" => {
                    if opts.seen_order {
                        return Err(LangReason::DuplicateArg(upper).into());
                    }
                    cursor.next()?;
                    opts.order = Some(if upper == "ASC" { Order::Asc } else { Order::Desc });
                    opts.seen_order = true;
                }
                "CLIP" => {
                    if opts.seen_clip {
                        return Err(LangReason::DuplicateArg("CLIP".into()).into());
                    }
                    cursor.next()?;
                    opts.clip = true;
                    opts.seen_clip = true;
                }
                "BUFFER" => {
                    if opts.seen_buffer {
                        return Err(LangReason::DuplicateArg("BUFFER".into()).into());
                    }
                    cursor.next()?;
                    opts.buffer = Some(cursor.next_f64()?);
                    opts.seen_buffer = true;
                }
                _ => break,
            }
        }

        if !opts.match_globs.is_empty() {
            opts.predicates.push(Predicate::Match(opts.match_globs.clone()));
        }

        if opts.sparse.is_some() && opts.seen_limit {
            return Err(LangReason::Conflict("SPARSE and LIMIT are mutually exclusive".into()).into());
        }
        if opts.sparse.is_some() && opts.seen_cursor {
            return Err(LangReason::Conflict("SPARSE and CURSOR are mutually exclusive".into()).into());
        }
        if opts.seen_cursor && opts.fence {
            return Err(LangReason::Conflict("CURSOR and FENCE are mutually exclusive".into()).into());
        }
        if opts.seen_detect && !opts.fence {
            return Err(LangReason::Conflict("DETECT requires FENCE".into()).into());
        }

        Ok(opts)
    }
}

fn parse_where(cursor: &mut Cursor) -> LangResult<WherePredicate> {
    let name = cursor.next()?.to_string();
    let first = cursor.next()?.to_string();
    if let Some(op) = CmpOp::from_token(&first) {
        let value = parse_scalar(cursor.next()?);
        return Ok(WherePredicate {
            name,
            kind: WhereKind::Op { op, value },
        });
    }
    // Range form: `min max`, each token optionally prefixed `(` for open.
    let (min, min_open) = parse_bound(&first);
    let max_tok = cursor.next()?;
    let (max, max_open) = parse_bound(max_tok);
    Ok(WherePredicate {
        name,
        kind: WhereKind::Range {
            min,
            max,
            min_open,
            max_open,
        },
    })
}

fn parse_bound(tok: &str) -> (Value, bool) {
    if let Some(stripped) = tok.strip_prefix('(') {
        (parse_scalar(stripped), true)
    } else {
        (parse_scalar(tok), false)
    }
}

fn parse_scalar(tok: &str) -> Value {
    if let Ok(n) = tok.parse::<f64>() {
        Value::Number(n)
    } else {
        Value::String(tok.to_string())
    }
}

fn parse_wherein(cursor: &mut Cursor) -> LangResult<WhereInPredicate> {
    let name = cursor.next()?.to_string();
    let k = cursor.next_u64()?;
    let mut values = Vec::with_capacity(k as usize);
    for _ in 0..k {
        values.push(parse_scalar(cursor.next()?));
    }
    Ok(WhereInPredicate { name, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(|x| x.to_string()).collect()
    }

    #[test]
    fn parses_cursor_and_limit() {
        let t = toks("CURSOR 10 LIMIT 5");
        let mut c = Cursor::new(&t);
        let opts = Options::parse(&mut c).unwrap();
        assert_eq!(opts.cursor, 10);
        assert_eq!(opts.limit, Some(5));
        assert!(c.is_empty());
    }

    #[test]
    fn sparse_and_limit_conflict() {
        let t = toks("SPARSE 3 LIMIT 5");
        let mut c = Cursor::new(&t);
        assert!(Options::parse(&mut c).is_err());
    }

    #[test]
    fn detect_requires_fence() {
        let t = toks("DETECT enter,exit");
        let mut c = Cursor::new(&t);
        assert!(Options::parse(&mut c).is_err());
    }

    #[test]
    fn fence_twice_is_tolerated() {
        let t = toks("FENCE FENCE");
        let mut c = Cursor::new(&t);
        let opts = Options::parse(&mut c).unwrap();
        assert!(opts.fence);
    }

    #[test]
    fn duplicate_limit_is_error() {
        let t = toks("LIMIT 5 LIMIT 6");
        let mut c = Cursor::new(&t);
        assert!(Options::parse(&mut c).is_err());
    }

    #[test]
    fn where_range_closed() {
        let t = toks("speed 10 20");
        let mut c = Cursor::new(&t);
        let w = parse_where(&mut c).unwrap();
        match w.kind {
            WhereKind::Range { min_open, max_open, .. } => {
                assert!(!min_open && !max_open);
            }
            _ => panic!("expected range"),
        }
    }

    #[test]
    fn where_operator_form() {
        let t = toks("speed > 20");
        let mut c = Cursor::new(&t);
        let w = parse_where(&mut c).unwrap();
        match w.kind {
            WhereKind::Op { op, .. } => assert_eq!(op, CmpOp::Gt),
            _ => panic!("expected op"),
        }
    }
}
