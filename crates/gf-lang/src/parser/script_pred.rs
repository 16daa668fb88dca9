use crate::error::LangResult;
use crate::predicate::WhereEvalPredicate;
use crate::tokens::Cursor;
use crate::value::Value;

/// `WHEREEVAL script nargs args…` or `WHEREEVALSHA sha nargs args…`.
pub fn parse_whereeval(cursor: &mut Cursor, is_sha: bool) -> LangResult<WhereEvalPredicate> {
    let source = cursor.next()?.to_string();
    let nargs = cursor.next_u64()?;
    let mut args = Vec::with_capacity(nargs as usize);
    for _ in 0..nargs {
        let tok = cursor.next()?;
        let v = match tok.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::String(tok.to_string()),
        };
        args.push(v);
    }
    Ok(WhereEvalPredicate {
        source,
        is_sha,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_and_args() {
        let t: Vec<String> = "fields.speed>10 2 10 hello"
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        let mut c = Cursor::new(&t);
        let w = parse_whereeval(&mut c, false).unwrap();
        assert_eq!(w.source, "fields.speed>10");
        assert_eq!(w.args.len(), 2);
        assert!(c.is_empty());
    }
}
