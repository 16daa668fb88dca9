use gf_lang::{Command, ContainMode, Geometry, NoGetResolver, Order, Output, ScriptCache, ScriptEngine, SearchTokens};

use crate::collection::{Candidate, CollectionTable};
use crate::error::CoreResult;
use crate::scan::{PushParams, ScanWriter};

/// Outcome of [`execute`]: either a driven, render-ready writer, or the
/// tokens handed back untouched because `FENCE` asked to register a live
/// query instead of answering one now.
pub enum QueryOutcome {
    Answered(ScanWriter),
    GoingLive(SearchTokens),
}

/// Runs a parsed `SCAN`/`SEARCH`/`NEARBY`/`WITHIN`/`INTERSECTS` against
/// `table`, driving a fresh [`ScanWriter`] to completion. A `FENCE` query
/// is never executed here — it is handed back to the caller, which owns
/// the hook registry that actually keeps it alive.
pub fn execute(
    tokens: SearchTokens,
    table: &CollectionTable,
    engine: &dyn ScriptEngine,
    cache: Option<&ScriptCache>,
) -> CoreResult<QueryOutcome> {
    if tokens.fence {
        return Ok(QueryOutcome::GoingLive(tokens));
    }

    let SearchTokens {
        command,
        key,
        cursor,
        limit,
        sparse,
        match_globs,
        predicates,
        no_fields,
        fence: _,
        detect: _,
        commands: _,
        distance,
        nodwell: _,
        order,
        clip,
        buffer,
        output,
        area,
        point,
    } = tokens;

    let everything = crate::scan::is_everything_query(&match_globs, &predicates);
    let mut writer = ScanWriter::new(output, limit, cursor, predicates).no_fields(no_fields);

    let Some(collection) = table.get(&key) else {
        return Ok(QueryOutcome::Answered(writer));
    };
    let desc = order == Order::Desc;

    match command {
        Command::Scan => {
            if everything && output == Output::Count {
                // Fast path: no traversal needed, just arithmetic.
                writer.set_raw_count(collection.len() as u64 - cursor.min(collection.len() as u64));
            } else if let Some(prefix) = literal_prefix(&match_globs) {
                let (lo, hi) = prefix_range(prefix);
                let rows = collection.scan_range(&lo, hi.as_deref(), desc);
                drive(&mut writer, rows.into_iter().map(|o| (o, None)), cursor, engine, cache)?;
            } else {
                let rows = collection.scan(desc);
                drive(&mut writer, rows.into_iter().map(|o| (o, None)), cursor, engine, cache)?;
            }
        }
        Command::Search => {
            let rows = collection.search_values(desc);
            drive(&mut writer, rows.into_iter().map(|o| (o, None)), cursor, engine, cache)?;
        }
        Command::Nearby => {
            let (lat, lon, radius) = point.expect("NEARBY tokens always carry a point");
            let hits = collection.nearby((lat, lon));
            let rows = hits
                .into_iter()
                .take_while(|c| radius == 0.0 || c.distance_m.unwrap_or(f64::INFINITY) <= radius)
                .map(|c: Candidate| (c.object, if distance { c.distance_m } else { None }));
            drive(&mut writer, rows, cursor, engine, cache)?;
        }
        Command::Within | Command::Intersects => {
            let expr = area.expect("WITHIN/INTERSECTS tokens always carry an area");
            let mode = if command == Command::Within {
                ContainMode::Within
            } else {
                ContainMode::Intersects
            };
            let resolver = NoGetResolver;
            let buffer_m = buffer.unwrap_or(0.0);
            let rect = expr.bounding_rect(&resolver).map(|(min_lat, min_lon, max_lat, max_lon)| {
                if buffer_m > 0.0 {
                    Geometry::bounds(min_lat, min_lon, max_lat, max_lon)
                        .map(|g| g.buffered(buffer_m).rect())
                        .unwrap_or((min_lat, min_lon, max_lat, max_lon))
                } else {
                    (min_lat, min_lon, max_lat, max_lon)
                }
            });
            let candidates = collection.candidates_by_rect(rect, sparse);
            if clip && mode == ContainMode::Intersects {
                writer = writer.clip(rect.and_then(|r| Geometry::bounds(r.0, r.1, r.2, r.3).ok()));
            }
            let rows = candidates
                .into_iter()
                .filter_map(|obj| {
                    match expr.evaluate_buffered(&obj.geometry, mode, &resolver, buffer_m) {
                        Ok(true) => Some(Ok((obj, None))),
                        Ok(false) => None,
                        Err(e) => Some(Err(e)),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            drive(&mut writer, rows.into_iter(), cursor, engine, cache)?;
        }
    }

    Ok(QueryOutcome::Answered(writer))
}

/// A single non-wildcard `MATCH` glob names a literal id prefix the
/// traversal can narrow to before falling back to full predicate
/// evaluation; anything richer (multiple globs, `*`/`?`/`[`) needs the
/// full scan.
fn literal_prefix(globs: &[String]) -> Option<&str> {
    if globs.len() == 1 && !globs[0].chars().any(|c| matches!(c, '*' | '?' | '[')) {
        Some(globs[0].as_str())
    } else {
        None
    }
}

/// The half-open `[lo, hi)` id range covering every string with `prefix`.
/// `hi` is `None` when the prefix is all `0xFF` bytes (no finite upper
/// bound exists).
fn prefix_range(prefix: &str) -> (String, Option<String>) {
    let mut hi = prefix.as_bytes().to_vec();
    loop {
        match hi.last() {
            Some(&b) if b < 0xFF => {
                *hi.last_mut().unwrap() += 1;
                return (prefix.to_string(), Some(String::from_utf8_lossy(&hi).into_owned()));
            }
            Some(_) => {
                hi.pop();
            }
            None => return (prefix.to_string(), None),
        }
    }
}

/// Feeds `rows` through `writer`, skipping the first `cursor_offset`
/// candidates (an offset into the candidate stream itself, not the
/// matched set) and stopping as soon as the writer reports it is done.
fn drive<'a>(
    writer: &mut ScanWriter,
    rows: impl Iterator<Item = (&'a crate::object::Object, Option<f64>)>,
    cursor_offset: u64,
    engine: &dyn ScriptEngine,
    cache: Option<&ScriptCache>,
) -> CoreResult<()> {
    for (obj, distance_m) in rows.skip(cursor_offset as usize) {
        let keep_going = writer.push_object(
            PushParams {
                id: &obj.id,
                geometry: &obj.geometry,
                fields: &obj.fields,
                z: obj.geometry.z(),
                distance_m,
                no_test: false,
            },
            engine,
            cache,
        )?;
        if !keep_going {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use gf_lang::{parse_command, NullScriptEngine};

    fn table_with_points() -> CollectionTable {
        let mut table = CollectionTable::new();
        let coll = table.get_or_create("fleet");
        coll.set(Object::new("near", Geometry::point(33.5001, -112.1001, None)));
        coll.set(Object::new("far", Geometry::point(40.0, -75.0, None)));
        table
    }

    #[test]
    fn scan_returns_all_ids_sorted() {
        let table = table_with_points();
        let tail: Vec<String> = vec![];
        let tokens = parse_command(Command::Scan, "fleet", &tail).unwrap();
        let engine = NullScriptEngine;
        let outcome = execute(tokens, &table, &engine, None).unwrap();
        let QueryOutcome::Answered(w) = outcome else {
            panic!("expected an answer");
        };
        assert!(w.to_json().contains("\"far\""));
        assert!(w.to_json().contains("\"near\""));
    }

    #[test]
    fn nearby_orders_and_filters_by_radius() {
        let table = table_with_points();
        let tail: Vec<String> = "POINT 33.5 -112.1 1000"
            .split_whitespace()
            .map(String::from)
            .collect();
        let tokens = parse_command(Command::Nearby, "fleet", &tail).unwrap();
        let engine = NullScriptEngine;
        let outcome = execute(tokens, &table, &engine, None).unwrap();
        let QueryOutcome::Answered(w) = outcome else {
            panic!("expected an answer");
        };
        let json = w.to_json();
        assert!(json.contains("\"near\""));
        assert!(!json.contains("\"far\""));
    }

    #[test]
    fn within_bounds_filters_by_area() {
        let table = table_with_points();
        let tail: Vec<String> = "BOUNDS 33 -113 34 -112"
            .split_whitespace()
            .map(String::from)
            .collect();
        let tokens = parse_command(Command::Within, "fleet", &tail).unwrap();
        let engine = NullScriptEngine;
        let outcome = execute(tokens, &table, &engine, None).unwrap();
        let QueryOutcome::Answered(w) = outcome else {
            panic!("expected an answer");
        };
        let json = w.to_json();
        assert!(json.contains("\"near\""));
        assert!(!json.contains("\"far\""));
    }

    #[test]
    fn fence_query_is_not_executed() {
        let table = table_with_points();
        let tail: Vec<String> = "FENCE POINT 33.5 -112.1 1000"
            .split_whitespace()
            .map(String::from)
            .collect();
        let tokens = parse_command(Command::Nearby, "fleet", &tail).unwrap();
        let engine = NullScriptEngine;
        let outcome = execute(tokens, &table, &engine, None).unwrap();
        assert!(matches!(outcome, QueryOutcome::GoingLive(_)));
    }

    #[test]
    fn missing_key_answers_empty() {
        let table = CollectionTable::new();
        let tail: Vec<String> = vec![];
        let tokens = parse_command(Command::Scan, "missing", &tail).unwrap();
        let engine = NullScriptEngine;
        let outcome = execute(tokens, &table, &engine, None).unwrap();
        let QueryOutcome::Answered(w) = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(w.count(), 0);
    }
}
