use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{LangReason, LangResult};
use crate::value::Value;

/// Field values exposed to a script predicate, keyed by field name plus the
/// synthetic `z` key for the object's Z coordinate.
pub type FieldMap = HashMap<String, Value>;

/// The embedded scripting engine is treated as an external collaborator:
/// this crate only depends on the single `eval` method. A build without
/// the `scripting` feature gets [`NullScriptEngine`], which always
/// reports the engine unavailable.
pub trait ScriptEngine: Send + Sync {
    fn eval(&self, source: &str, fields: &FieldMap) -> LangResult<bool>;
}

/// Default engine for builds compiled without scripting support.
#[derive(Debug, Default)]
pub struct NullScriptEngine;

impl ScriptEngine for NullScriptEngine {
    fn eval(&self, _source: &str, _fields: &FieldMap) -> LangResult<bool> {
        Err(LangReason::ScriptUnavailable.into())
    }
}

/// Caches compiled scripts by SHA1 of their source, for `WHEREEVALSHA`.
#[derive(Default)]
pub struct ScriptCache {
    by_sha: RwLock<HashMap<String, String>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, source: &str) -> String {
        let sha = sha1_hex(source.as_bytes());
        self.by_sha
            .write()
            .unwrap()
            .insert(sha.clone(), source.to_string());
        sha
    }

    pub fn lookup(&self, sha: &str) -> LangResult<String> {
        self.by_sha
            .read()
            .unwrap()
            .get(sha)
            .cloned()
            .ok_or_else(|| LangReason::ShaNotFound.into())
    }
}

/// Minimal SHA1 so `WHEREEVALSHA` has a stable cache key without pulling in
/// a full crypto crate for a non-cryptographic cache lookup.
fn sha1_hex(data: &[u8]) -> String {
    let mut h0: u32 = 0x67452301;
    let mut h1: u32 = 0xEFCDAB89;
    let mut h2: u32 = 0x98BADCFE;
    let mut h3: u32 = 0x10325476;
    let mut h4: u32 = 0xC3D2E1F0;

    let ml = (data.len() as u64) * 8;
    let mut msg = data.to_vec();
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&ml.to_be_bytes());

    for chunk in msg.chunks(64) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = u32::from_be_bytes(chunk[i * 4..i * 4 + 4].try_into().unwrap());
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }
        let (mut a, mut b, mut c, mut d, mut e) = (h0, h1, h2, h3, h4);
        for (i, &wi) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | ((!b) & d), 0x5A827999u32),
                20..=39 => (b ^ c ^ d, 0x6ED9EBA1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1BBCDC),
                _ => (b ^ c ^ d, 0xCA62C1D6),
            };
            let temp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(wi);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }
        h0 = h0.wrapping_add(a);
        h1 = h1.wrapping_add(b);
        h2 = h2.wrapping_add(c);
        h3 = h3.wrapping_add(d);
        h4 = h4.wrapping_add(e);
    }

    format!("{h0:08x}{h1:08x}{h2:08x}{h3:08x}{h4:08x}")
}

#[cfg(feature = "scripting")]
pub struct RhaiScriptEngine {
    engine: rhai::Engine,
}

#[cfg(feature = "scripting")]
impl Default for RhaiScriptEngine {
    fn default() -> Self {
        Self {
            engine: rhai::Engine::new(),
        }
    }
}

#[cfg(feature = "scripting")]
impl ScriptEngine for RhaiScriptEngine {
    fn eval(&self, source: &str, fields: &FieldMap) -> LangResult<bool> {
        let mut scope = rhai::Scope::new();
        let mut map = rhai::Map::new();
        for (name, value) in fields {
            map.insert(name.into(), value_to_dynamic(value));
        }
        scope.push("fields", map);
        let result: rhai::Dynamic = self
            .engine
            .eval_with_scope(&mut scope, source)
            .map_err(|e| LangReason::ScriptError(e.to_string()))?;
        Ok(is_truthy(&result))
    }
}

#[cfg(feature = "scripting")]
fn value_to_dynamic(v: &Value) -> rhai::Dynamic {
    match v {
        Value::Null => rhai::Dynamic::UNIT,
        Value::False => rhai::Dynamic::from(false),
        Value::True => rhai::Dynamic::from(true),
        Value::Number(n) => rhai::Dynamic::from(*n),
        Value::String(s) => rhai::Dynamic::from(s.clone()),
    }
}

/// `nil`/unit, empty string, and numeric `0` are falsy; a non-empty map or
/// array is truthy; everything else follows the dynamic value's own bool
/// conversion.
#[cfg(feature = "scripting")]
fn is_truthy(v: &rhai::Dynamic) -> bool {
    if v.is_unit() {
        return false;
    }
    if let Some(b) = v.clone().try_cast::<bool>() {
        return b;
    }
    if let Some(n) = v.as_float().ok() {
        return n != 0.0;
    }
    if let Some(n) = v.as_int().ok() {
        return n != 0;
    }
    if let Some(s) = v.clone().try_cast::<String>() {
        return !s.is_empty();
    }
    if let Some(m) = v.clone().try_cast::<rhai::Map>() {
        return !m.is_empty();
    }
    if let Some(a) = v.clone().try_cast::<rhai::Array>() {
        return !a.is_empty();
    }
    true
}

#[cfg(all(test, feature = "scripting"))]
mod tests {
    use super::*;

    #[test]
    fn truthy_rules_match_dynamic_languages() {
        let engine = RhaiScriptEngine::default();
        let mut fields = FieldMap::new();
        fields.insert("speed".to_string(), Value::Number(15.0));
        assert!(engine.eval("fields.speed > 10", &fields).unwrap());
        assert!(!engine.eval("fields.speed > 100", &fields).unwrap());
    }

    #[test]
    fn sha_cache_round_trips() {
        let cache = ScriptCache::new();
        let sha = cache.store("fields.speed > 10");
        assert_eq!(cache.lookup(&sha).unwrap(), "fields.speed > 10");
        assert!(cache.lookup("deadbeef").is_err());
    }
}
