use crate::error::{LangReason, LangResult};
use crate::tokens::Cursor;

use super::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Count,
    Ids,
    Objects,
    Points,
    Hashes(u8),
    Bounds,
}

impl Default for Output {
    fn default() -> Self {
        Output::Objects
    }
}

/// Consumes the output keyword if present. For `WITHIN`/`INTERSECTS`,
/// `BOUNDS` is ambiguous with the area primitive of the same name: if the
/// token after it is numeric, it is left unconsumed for the area
/// sub-parser and the output defaults to `OBJECTS`.
pub fn parse_output(cursor: &mut Cursor, command: Command) -> LangResult<Output> {
    let Some(tok) = cursor.peek() else {
        return Ok(Output::default());
    };
    let upper = tok.to_ascii_uppercase();
    let spatial = matches!(command, Command::Within | Command::Intersects);

    match upper.as_str() {
        "COUNT" => {
            cursor.next()?;
            Ok(Output::Count)
        }
        "IDS" => {
            cursor.next()?;
            Ok(Output::Ids)
        }
        "OBJECTS" => {
            cursor.next()?;
            Ok(Output::Objects)
        }
        "POINTS" => {
            cursor.next()?;
            Ok(Output::Points)
        }
        "HASHES" => {
            cursor.next()?;
            let precision = cursor.next_u64()?;
            if !(1..=12).contains(&precision) {
                return Err(LangReason::ArgInvalid(format!("HASHES {precision}")).into());
            }
            Ok(Output::Hashes(precision as u8))
        }
        "BOUNDS" => {
            if spatial && cursor.peek_at(1).is_some_and(|t| t.parse::<f64>().is_ok()) {
                // It's the `BOUNDS minlat minlon maxlat maxlon` area
                // primitive, not the output keyword: leave it for the area
                // sub-parser.
                Ok(Output::default())
            } else {
                cursor.next()?;
                Ok(Output::Bounds)
            }
        }
        _ => Ok(Output::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(|x| x.to_string()).collect()
    }

    #[test]
    fn consumes_count() {
        let t = toks("COUNT");
        let mut c = Cursor::new(&t);
        assert_eq!(parse_output(&mut c, Command::Scan).unwrap(), Output::Count);
        assert!(c.is_empty());
    }

    #[test]
    fn bounds_keyword_alone_is_output() {
        let t = toks("BOUNDS");
        let mut c = Cursor::new(&t);
        assert_eq!(
            parse_output(&mut c, Command::Within).unwrap(),
            Output::Bounds
        );
    }

    #[test]
    fn bounds_followed_by_numeric_is_area_primitive() {
        let t = toks("BOUNDS 33 -113 34 -112");
        let mut c = Cursor::new(&t);
        assert_eq!(
            parse_output(&mut c, Command::Within).unwrap(),
            Output::Objects
        );
        assert_eq!(c.remaining(), 4);
    }
}
