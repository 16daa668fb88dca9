use crate::area::{AreaExpression, Primitive};
use crate::error::{LangReason, LangResult};
use crate::geometry::Geometry;
use crate::tokens::Cursor;

/// `expr := or_expr`; `or_expr := and_expr (OR and_expr)*`; `and_expr :=
/// unary (AND unary)*`; `unary := NOT unary | primary`; `primary := '('
/// expr ')' | primitive`.
pub fn parse_area_expr(cursor: &mut Cursor) -> LangResult<AreaExpression> {
    parse_or(cursor)
}

fn parse_or(cursor: &mut Cursor) -> LangResult<AreaExpression> {
    let mut parts = vec![parse_and(cursor)?];
    while cursor.eat_literal("OR") {
        parts.push(parse_and(cursor)?);
    }
    Ok(if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        AreaExpression::Or(parts)
    })
}

fn parse_and(cursor: &mut Cursor) -> LangResult<AreaExpression> {
    let mut parts = vec![parse_unary(cursor)?];
    while cursor.eat_literal("AND") {
        parts.push(parse_unary(cursor)?);
    }
    Ok(if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        AreaExpression::And(parts)
    })
}

fn parse_unary(cursor: &mut Cursor) -> LangResult<AreaExpression> {
    if cursor.eat_literal("NOT") {
        return Ok(AreaExpression::Not(Box::new(parse_unary(cursor)?)));
    }
    parse_primary(cursor)
}

fn parse_primary(cursor: &mut Cursor) -> LangResult<AreaExpression> {
    if cursor.eat_literal("(") {
        let inner = parse_or(cursor)?;
        if !cursor.eat_literal(")") {
            return Err(LangReason::ArgInvalid("expected )".into()).into());
        }
        return Ok(inner);
    }
    Ok(AreaExpression::Leaf(parse_primitive(cursor)?))
}

pub fn parse_primitive(cursor: &mut Cursor) -> LangResult<Primitive> {
    let kw = cursor.next()?.to_ascii_uppercase();
    match kw.as_str() {
        "POINT" => {
            let lat = cursor.next_f64()?;
            let lon = cursor.next_f64()?;
            let meters = if cursor.is_numeric_ahead() {
                Some(cursor.next_f64()?)
            } else {
                None
            };
            Ok(Primitive::Point { lat, lon, meters })
        }
        "CIRCLE" => {
            let lat = cursor.next_f64()?;
            let lon = cursor.next_f64()?;
            let meters = cursor.next_f64()?;
            Ok(Primitive::Circle { lat, lon, meters })
        }
        "OBJECT" => {
            let geojson = cursor.next()?;
            let geom = Geometry::from_geojson_str(geojson)?;
            Ok(Primitive::Object(geom))
        }
        "BOUNDS" => {
            let min_lat = cursor.next_f64()?;
            let min_lon = cursor.next_f64()?;
            let max_lat = cursor.next_f64()?;
            let max_lon = cursor.next_f64()?;
            Ok(Primitive::Bounds {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            })
        }
        "HASH" => Ok(Primitive::Hash(cursor.next()?.to_string())),
        "QUADKEY" => Ok(Primitive::Quadkey(cursor.next()?.to_string())),
        "TILE" => {
            let x = cursor.next_u64()?;
            let y = cursor.next_u64()?;
            let z = cursor.next_u64()?;
            Ok(Primitive::Tile {
                x,
                y,
                z: z as u8,
            })
        }
        "GET" => {
            let key = cursor.next()?.to_string();
            let id = cursor.next()?.to_string();
            Ok(Primitive::Get { key, id })
        }
        "SECTOR" => {
            let lat = cursor.next_f64()?;
            let lon = cursor.next_f64()?;
            let meters = cursor.next_f64()?;
            let bearing1 = cursor.next_f64()?;
            let bearing2 = cursor.next_f64()?;
            Ok(Primitive::Sector {
                lat,
                lon,
                meters,
                bearing1,
                bearing2,
            })
        }
        other => Err(LangReason::ArgInvalid(other.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::ContainMode;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(|x| x.to_string()).collect()
    }

    #[test]
    fn parses_single_bounds_primitive() {
        let t = toks("BOUNDS 33 -113 34 -112");
        let mut c = Cursor::new(&t);
        let expr = parse_area_expr(&mut c).unwrap();
        assert!(matches!(expr, AreaExpression::Leaf(Primitive::Bounds { .. })));
        assert!(c.is_empty());
    }

    #[test]
    fn parses_and_of_two_primitives() {
        let t = toks("BOUNDS 33 -113 34 -112 AND CIRCLE 33.5 -112.5 1000");
        let mut c = Cursor::new(&t);
        let expr = parse_area_expr(&mut c).unwrap();
        assert!(matches!(expr, AreaExpression::And(ref v) if v.len() == 2));
    }

    #[test]
    fn parses_not_and_parens() {
        let t = toks("NOT ( BOUNDS 33 -113 34 -112 )");
        let mut c = Cursor::new(&t);
        let expr = parse_area_expr(&mut c).unwrap();
        let inside = Geometry::point(33.5, -112.5, None);
        assert!(!expr
            .evaluate(&inside, ContainMode::Within, &crate::area::NoGetResolver)
            .unwrap());
    }
}
