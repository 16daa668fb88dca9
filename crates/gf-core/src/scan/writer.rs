use indexmap::IndexSet;

use gf_lang::{FieldList, Geometry, Output, PredicateSet, ScriptCache, ScriptEngine, Value};

use crate::error::CoreResult;

use super::resp::RespValue;

/// One admitted row, captured in whatever shape the output kind needs at
/// render time — geometry may already be clipped.
struct FilledEntry {
    id: String,
    geometry: Geometry,
    fields: FieldList,
    distance_m: Option<f64>,
}

/// Inputs to [`ScanWriter::push_object`] for a single candidate.
pub struct PushParams<'a> {
    pub id: &'a str,
    pub geometry: &'a Geometry,
    pub fields: &'a FieldList,
    pub z: Option<f64>,
    pub distance_m: Option<f64>,
    /// Skip predicate evaluation (used when the caller already filtered,
    /// e.g. a fence re-check that only needs shape state, not a fresh scan).
    pub no_test: bool,
}

/// Streams matched objects into a RESP array or JSON text, enforcing
/// limit/cursor/output shape. The sole owner of a single query's response
/// buffer — never shared across queries.
pub struct ScanWriter {
    output: Output,
    limit: Option<u64>,
    cursor_offset: u64,
    no_fields: bool,
    full_fields: bool,
    clip: Option<Geometry>,
    hashes_precision: u8,
    predicates: PredicateSet,

    filled: Vec<FilledEntry>,
    count: u64,
    number_iters: u64,
    number_items: u64,
    hit_limit: bool,
    fkeys: IndexSet<String>,
}

impl ScanWriter {
    pub fn new(output: Output, limit: Option<u64>, cursor_offset: u64, predicates: PredicateSet) -> Self {
        let hashes_precision = match output {
            Output::Hashes(p) => p,
            _ => 9,
        };
        Self {
            output,
            limit,
            cursor_offset,
            no_fields: false,
            full_fields: false,
            clip: None,
            hashes_precision,
            predicates,
            filled: Vec::new(),
            count: 0,
            number_iters: 0,
            number_items: 0,
            hit_limit: false,
            fkeys: IndexSet::new(),
        }
    }

    pub fn no_fields(mut self, v: bool) -> Self {
        self.no_fields = v;
        self
    }

    pub fn full_fields(mut self, v: bool) -> Self {
        self.full_fields = v;
        self
    }

    pub fn clip(mut self, clip: Option<Geometry>) -> Self {
        self.clip = clip;
        self
    }

    pub fn hit_limit(&self) -> bool {
        self.hit_limit
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sets `count` directly, bypassing `push_object` — used by the SCAN
    /// COUNT fast path, which answers from `collection.len()` arithmetic
    /// rather than a real traversal.
    pub fn set_raw_count(&mut self, count: u64) {
        self.count = count;
    }

    /// Runs predicate checks (unless `no_test`), admits the object, and
    /// reports whether the caller should keep iterating.
    pub fn push_object(
        &mut self,
        params: PushParams,
        engine: &dyn ScriptEngine,
        cache: Option<&ScriptCache>,
    ) -> CoreResult<bool> {
        self.number_iters += 1;

        if !params.no_test {
            let ok = self
                .predicates
                .matches(params.id, params.fields, params.z, engine, cache)?;
            if !ok {
                return Ok(true);
            }
        }

        self.count += 1;
        if self.output == Output::Count {
            if Some(self.count) == self.limit {
                return Ok(false);
            }
            return Ok(true);
        }

        let geometry = match &self.clip {
            Some(clip) => params.geometry.clip(clip),
            None => params.geometry.clone(),
        };

        if !self.full_fields && !self.no_fields {
            for (name, _) in params.fields.iter() {
                self.fkeys.insert(name.to_string());
            }
        }

        self.filled.push(FilledEntry {
            id: params.id.to_string(),
            geometry,
            fields: params.fields.clone(),
            distance_m: params.distance_m,
        });
        self.number_items += 1;

        if Some(self.number_items) == self.limit {
            self.hit_limit = true;
            return Ok(false);
        }
        Ok(true)
    }

    /// Renders the accumulated result as JSON (`{"ok":true,...}`).
    pub fn to_json(&self) -> String {
        let mut buf = String::from("{\"ok\":true");
        if !self.no_fields && !self.fkeys.is_empty() && matches!(self.output, Output::Objects) {
            buf.push_str(",\"fields\":[");
            for (i, k) in self.fkeys.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push('"');
                buf.push_str(k);
                buf.push('"');
            }
            buf.push(']');
        }

        let array_key = match self.output {
            Output::Count => None,
            Output::Ids => Some("ids"),
            Output::Objects => Some("objects"),
            Output::Points => Some("points"),
            Output::Hashes(_) => Some("points"),
            Output::Bounds => Some("objects"),
        };

        if let Some(key) = array_key {
            buf.push_str(&format!(",\"{key}\":["));
            for (i, entry) in self.filled.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                self.append_entry_json(&mut buf, entry);
            }
            buf.push(']');
        } else {
            buf.push_str(&format!(",\"count\":{}", self.count));
        }

        if self.output != Output::Count {
            buf.push_str(&format!(",\"count\":{}", self.filled.len()));
        }
        buf.push_str(&format!(
            ",\"cursor\":{}",
            if self.hit_limit {
                self.cursor_offset + self.number_iters
            } else {
                0
            }
        ));
        buf.push_str(",\"elapsed\":\"0s\"}");
        buf
    }

    fn append_entry_json(&self, buf: &mut String, entry: &FilledEntry) {
        match self.output {
            Output::Ids => {
                if entry.distance_m.is_some() {
                    buf.push_str(&format!(
                        "{{\"id\":\"{}\",\"distance\":{}}}",
                        entry.id,
                        entry.distance_m.unwrap()
                    ));
                } else {
                    buf.push('"');
                    buf.push_str(&entry.id);
                    buf.push('"');
                }
            }
            Output::Objects | Output::Bounds => {
                buf.push_str(&format!("{{\"id\":\"{}\",\"object\":", entry.id));
                entry.geometry.append_json(buf);
                if !self.no_fields {
                    buf.push_str(",\"fields\":{");
                    self.append_fields_json(buf, entry);
                    buf.push('}');
                }
                if let Some(d) = entry.distance_m {
                    buf.push_str(&format!(",\"distance\":{d}"));
                }
                buf.push('}');
            }
            Output::Points => {
                let (lat, lon) = entry.geometry.center();
                match entry.geometry.z() {
                    Some(z) if z != 0.0 => buf.push_str(&format!("[{lat},{lon},{z}]")),
                    _ => buf.push_str(&format!("[{lat},{lon}]")),
                }
            }
            Output::Hashes(_) => {
                let (lat, lon) = entry.geometry.center();
                let hash = geohash::encode(
                    geo_types::Coord { x: lon, y: lat },
                    self.hashes_precision as usize,
                )
                .unwrap_or_default();
                buf.push('"');
                buf.push_str(&hash);
                buf.push('"');
            }
            Output::Count => {}
        }
    }

    fn append_fields_json(&self, buf: &mut String, entry: &FilledEntry) {
        if self.full_fields {
            for (i, (name, value)) in entry.fields.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push('"');
                buf.push_str(name);
                buf.push_str("\":");
                value.append_json(buf);
            }
            return;
        }
        for (i, name) in self.fkeys.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            buf.push('"');
            buf.push_str(name);
            buf.push_str("\":");
            entry.fields.get(name).append_json(buf);
        }
    }

    /// Renders the accumulated result as a RESP value: an integer for
    /// `COUNT`, else `[cursor, [items...]]`.
    pub fn to_resp(&self) -> RespValue {
        if self.output == Output::Count {
            return RespValue::Integer(self.count as i64);
        }
        let cursor = if self.hit_limit {
            self.cursor_offset + self.number_iters
        } else {
            0
        };
        let items = self
            .filled
            .iter()
            .map(|entry| self.entry_to_resp(entry))
            .collect();
        RespValue::Array(vec![RespValue::Integer(cursor as i64), RespValue::Array(items)])
    }

    fn entry_to_resp(&self, entry: &FilledEntry) -> RespValue {
        match self.output {
            Output::Ids => RespValue::BulkString(entry.id.clone()),
            Output::Objects | Output::Bounds => {
                let mut parts = vec![RespValue::BulkString(entry.id.clone())];
                parts.push(RespValue::BulkString(entry.geometry.string()));
                if let Some(d) = entry.distance_m {
                    parts.push(RespValue::BulkString(d.to_string()));
                }
                RespValue::Array(parts)
            }
            Output::Points => {
                let (lat, lon) = entry.geometry.center();
                RespValue::Array(vec![
                    RespValue::BulkString(lat.to_string()),
                    RespValue::BulkString(lon.to_string()),
                ])
            }
            Output::Hashes(_) => {
                let (lat, lon) = entry.geometry.center();
                let hash = geohash::encode(
                    geo_types::Coord { x: lon, y: lat },
                    self.hashes_precision as usize,
                )
                .unwrap_or_default();
                RespValue::BulkString(hash)
            }
            Output::Count => RespValue::Null,
        }
    }
}

/// Crude "everything" check used by the executor's SCAN fast-path: a
/// single `*` glob and no field predicates means SCAN COUNT can answer
/// from `collection.len()` without a traversal.
pub fn is_everything_query(match_globs: &[String], predicates: &PredicateSet) -> bool {
    !predicates.has_non_match() && (match_globs.is_empty() || match_globs.iter().any(|g| g == "*"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_lang::NullScriptEngine;

    fn writer(output: Output, predicates: PredicateSet) -> ScanWriter {
        ScanWriter::new(output, None, 0, predicates)
    }

    #[test]
    fn count_output_stops_at_limit() {
        let predicates = PredicateSet::new();
        let mut w = ScanWriter::new(Output::Count, Some(2), 0, predicates);
        let engine = NullScriptEngine;
        let fields = FieldList::new();
        let geom = Geometry::point(1.0, 1.0, None);
        for i in 0..3 {
            let keep_going = w
                .push_object(
                    PushParams {
                        id: &format!("t{i}"),
                        geometry: &geom,
                        fields: &fields,
                        z: None,
                        distance_m: None,
                        no_test: true,
                    },
                    &engine,
                    None,
                )
                .unwrap();
            if i < 1 {
                assert!(keep_going);
            } else {
                assert!(!keep_going);
                break;
            }
        }
        assert_eq!(w.count(), 2);
    }

    #[test]
    fn ids_output_renders_json_array() {
        let predicates = PredicateSet::new();
        let mut w = writer(Output::Ids, predicates);
        let engine = NullScriptEngine;
        let fields = FieldList::new();
        let geom = Geometry::point(1.0, 1.0, None);
        w.push_object(
            PushParams {
                id: "t1",
                geometry: &geom,
                fields: &fields,
                z: None,
                distance_m: None,
                no_test: true,
            },
            &engine,
            None,
        )
        .unwrap();
        let json = w.to_json();
        assert!(json.contains("\"ids\":[\"t1\"]"));
    }

    #[test]
    fn hit_limit_sets_nonzero_cursor() {
        let predicates = PredicateSet::new();
        let mut w = ScanWriter::new(Output::Ids, Some(1), 5, predicates);
        let engine = NullScriptEngine;
        let fields = FieldList::new();
        let geom = Geometry::point(1.0, 1.0, None);
        w.push_object(
            PushParams {
                id: "t1",
                geometry: &geom,
                fields: &fields,
                z: None,
                distance_m: None,
                no_test: true,
            },
            &engine,
            None,
        )
        .unwrap();
        assert!(w.hit_limit());
        assert!(w.to_json().contains("\"cursor\":6"));
    }
}
