use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::SystemTime;

use gf_lang::{Geometry, NoGetResolver, SearchTokens};
use rstar::{RTree, RTreeObject, AABB};
use wildmatch::WildMatch;

use orion_error::StructError;

use crate::error::{CoreReason, CoreResult};
use crate::util::{time_key, TimeKey};

/// A named, long-lived subscription installed by `SETHOOK`/`SETCHAN`.
///
/// Immutable after install except for expiry bookkeeping (see
/// [`HookRegistry::sweep_expired`]); `message`/`metas` are copies of their
/// inputs, not references back into the command tail.
#[derive(Debug, Clone)]
pub struct Hook {
    pub name: String,
    pub key: String,
    /// Channels have a single synthetic `local://<name>` entry here.
    pub endpoints: Vec<String>,
    pub fence: SearchTokens,
    pub message: Vec<String>,
    pub metas: Vec<(String, String)>,
    pub channel: bool,
    pub expires_at: Option<SystemTime>,
    /// `{"hook":"<name>"}` — the durable queue's secondary index key.
    pub query_tag: String,
}

/// Construction input for [`HookRegistry::set`], grouped the way
/// `SETHOOK`/`SETCHAN` actually gathers its arguments before install.
pub struct HookDef {
    pub name: String,
    pub key: String,
    pub endpoints: Vec<String>,
    pub fence: SearchTokens,
    pub message: Vec<String>,
    pub metas: Vec<(String, String)>,
    pub channel: bool,
    pub expires_at: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq)]
struct HookEntry {
    name: String,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for HookEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Whether `set` installed a fresh hook or found an identical one already
/// registered (a no-op that still refreshes its expiry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Installed,
    AlreadyExists,
}

/// The indexed set of active fences: by-name map, the "outside" subset
/// used by the delete-path evaluator, a spatial index over each fence's
/// MBR, and an expiry min-heap.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Hook>,
    outside_names: HashSet<String>,
    hook_tree: RTree<HookEntry>,
    expiry: BinaryHeap<Reverse<(TimeKey, String)>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Hook> {
        self.hooks.get(name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// `SETHOOK`/`SETCHAN`. A name already used by the other kind is
    /// rejected; an identical re-registration is a no-op that still
    /// refreshes the expiry heap.
    pub fn set(&mut self, def: HookDef) -> CoreResult<SetOutcome> {
        if let Some(existing) = self.hooks.get(&def.name) {
            if existing.channel != def.channel {
                return Err(StructError::from(CoreReason::HookKindConflict(def.name.clone())));
            }
            if existing.key == def.key
                && existing.endpoints == def.endpoints
                && existing.metas == def.metas
                && existing.message == def.message
                && existing.expires_at == def.expires_at
            {
                if let Some(exp) = def.expires_at {
                    self.expiry.push(Reverse((time_key(exp), def.name.clone())));
                }
                return Ok(SetOutcome::AlreadyExists);
            }
            self.remove_internal(&def.name);
        }
        self.insert_internal(def);
        Ok(SetOutcome::Installed)
    }

    /// `DELHOOK`/`DELCHAN`: exact-name removal. A name that exists under
    /// the other kind is a silent skip (returns `false`), matching the
    /// registry's no-cross-kind-collision invariant.
    pub fn delete(&mut self, name: &str, channel: bool) -> bool {
        match self.hooks.get(name) {
            Some(h) if h.channel == channel => {
                self.remove_internal(name);
                true
            }
            _ => false,
        }
    }

    /// `PDELHOOK`/`PDELCHAN`: glob-match names of the given kind, removing
    /// each. Returns the number removed.
    pub fn delete_pattern(&mut self, pattern: &str, channel: bool) -> usize {
        let matcher = WildMatch::new(pattern);
        let names: Vec<String> = self
            .hooks
            .values()
            .filter(|h| h.channel == channel && matcher.matches(&h.name))
            .map(|h| h.name.clone())
            .collect();
        for name in &names {
            self.remove_internal(name);
        }
        names.len()
    }

    /// `HOOKS`/`CHANS pattern`: matching hooks of the given kind, sorted
    /// by name.
    pub fn list(&self, pattern: &str, channel: bool) -> Vec<&Hook> {
        let matcher = WildMatch::new(pattern);
        let mut hits: Vec<&Hook> = self
            .hooks
            .values()
            .filter(|h| h.channel == channel && matcher.matches(&h.name))
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        hits
    }

    /// Candidate hooks whose fence MBR overlaps `envelope` — the
    /// enter/cross candidate set.
    pub fn candidates_by_envelope(&self, envelope: AABB<[f64; 2]>) -> Vec<&Hook> {
        self.hook_tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|entry| self.hooks.get(&entry.name))
            .collect()
    }

    /// Hooks whose detect set covers `outside` — additionally scanned on
    /// the delete path, since a deletion can only be observed as an
    /// "exit"/"outside" transition, never as an MBR overlap.
    pub fn outside_hooks(&self) -> impl Iterator<Item = &Hook> {
        self.outside_names.iter().filter_map(|n| self.hooks.get(n))
    }

    /// Pops every hook whose `expires_at` is due as of `now`, removing it
    /// from every index the same way `delete` does. Stale heap entries
    /// for hooks since replaced or removed are discarded lazily.
    pub fn sweep_expired(&mut self, now: SystemTime) -> Vec<Hook> {
        let mut expired = Vec::new();
        while let Some(Reverse((key, name))) = self.expiry.peek().cloned() {
            if key > time_key(now) {
                break;
            }
            self.expiry.pop();
            if let Some(hook) = self.hooks.get(&name) {
                if hook.expires_at.map(time_key) == Some(key) {
                    if let Some(hook) = self.remove_internal(&name) {
                        expired.push(hook);
                    }
                }
            }
        }
        expired
    }

    fn insert_internal(&mut self, def: HookDef) {
        let envelope = fence_envelope(&def.fence);
        let covers_outside = def.fence.detect.covers_outside();
        let query_tag = format!("{{\"hook\":\"{}\"}}", def.name);
        let hook = Hook {
            name: def.name,
            key: def.key,
            endpoints: def.endpoints,
            fence: def.fence,
            message: def.message,
            metas: def.metas,
            channel: def.channel,
            expires_at: def.expires_at,
            query_tag,
        };
        self.hook_tree.insert(HookEntry {
            name: hook.name.clone(),
            envelope,
        });
        if covers_outside {
            self.outside_names.insert(hook.name.clone());
        }
        if let Some(exp) = hook.expires_at {
            self.expiry.push(Reverse((time_key(exp), hook.name.clone())));
        }
        self.hooks.insert(hook.name.clone(), hook);
    }

    fn remove_internal(&mut self, name: &str) -> Option<Hook> {
        let hook = self.hooks.remove(name)?;
        self.hook_tree.remove(&HookEntry {
            name: hook.name.clone(),
            envelope: fence_envelope(&hook.fence),
        });
        self.outside_names.remove(name);
        Some(hook)
    }
}

/// Best-effort MBR for a fence's area/point, used to seed the hook
/// registry's R-tree. A fence with neither (shouldn't occur once parsed)
/// covers the whole plane so it is never silently excluded from a scan.
fn fence_envelope(fence: &SearchTokens) -> AABB<[f64; 2]> {
    let resolver = NoGetResolver;
    if let Some(area) = &fence.area {
        if let Some((min_lat, min_lon, max_lat, max_lon)) = area.bounding_rect(&resolver) {
            return AABB::from_corners([min_lon, min_lat], [max_lon, max_lat]);
        }
    }
    if let Some((lat, lon, radius)) = fence.point {
        let (min_lat, min_lon, max_lat, max_lon) =
            Geometry::point(lat, lon, None).buffered(radius.max(0.0)).rect();
        return AABB::from_corners([min_lon, min_lat], [max_lon, max_lat]);
    }
    AABB::from_corners(
        [f64::NEG_INFINITY, f64::NEG_INFINITY],
        [f64::INFINITY, f64::INFINITY],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_lang::{parse_command, Command};

    fn fence(tail: &str) -> SearchTokens {
        let toks: Vec<String> = tail.split_whitespace().map(String::from).collect();
        parse_command(Command::Nearby, "fleet", &toks).unwrap()
    }

    fn def(name: &str) -> HookDef {
        HookDef {
            name: name.to_string(),
            key: "fleet".to_string(),
            endpoints: vec!["http://example.com/hook".to_string()],
            fence: fence("FENCE POINT 33.5 -112.1 1000"),
            message: vec!["SETHOOK".to_string(), name.to_string()],
            metas: vec![],
            channel: false,
            expires_at: None,
        }
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut reg = HookRegistry::new();
        let outcome = reg.set(def("a")).unwrap();
        assert_eq!(outcome, SetOutcome::Installed);
        assert!(reg.get("a").is_some());
    }

    #[test]
    fn identical_reregistration_is_noop() {
        let mut reg = HookRegistry::new();
        reg.set(def("a")).unwrap();
        let outcome = reg.set(def("a")).unwrap();
        assert_eq!(outcome, SetOutcome::AlreadyExists);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn mismatched_kind_rejected() {
        let mut reg = HookRegistry::new();
        reg.set(def("a")).unwrap();
        let mut chan = def("a");
        chan.channel = true;
        assert!(reg.set(chan).is_err());
    }

    #[test]
    fn delete_wrong_kind_is_silent_skip() {
        let mut reg = HookRegistry::new();
        reg.set(def("a")).unwrap();
        assert!(!reg.delete("a", true));
        assert!(reg.get("a").is_some());
        assert!(reg.delete("a", false));
        assert!(reg.get("a").is_none());
    }

    #[test]
    fn pattern_delete_counts_matches() {
        let mut reg = HookRegistry::new();
        reg.set(def("fleet-a")).unwrap();
        reg.set(def("fleet-b")).unwrap();
        reg.set(def("other")).unwrap();
        let n = reg.delete_pattern("fleet-*", false);
        assert_eq!(n, 2);
        assert!(reg.get("other").is_some());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let mut reg = HookRegistry::new();
        reg.set(def("b")).unwrap();
        reg.set(def("a")).unwrap();
        let names: Vec<&str> = reg.list("*", false).iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn expiry_sweep_removes_due_hooks() {
        let mut reg = HookRegistry::new();
        let mut d = def("a");
        d.expires_at = Some(SystemTime::now());
        reg.set(d).unwrap();
        let swept = reg.sweep_expired(SystemTime::now() + std::time::Duration::from_secs(1));
        assert_eq!(swept.len(), 1);
        assert!(reg.get("a").is_none());
    }
}
