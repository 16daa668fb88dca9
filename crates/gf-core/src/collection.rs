use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::time::SystemTime;

use gf_lang::{haversine_meters, Geometry};
use rstar::{RTree, RTreeObject, AABB};

use crate::object::Object;
use crate::util::{time_key, TimeKey};

/// Indexes a single object's MBR in the collection's R-tree; the object
/// itself stays in the `objects` map so updates only replace one entry.
#[derive(Debug, Clone, PartialEq)]
struct SpatialEntry {
    id: String,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn envelope_of(geom: &Geometry) -> AABB<[f64; 2]> {
    let (min_lat, min_lon, max_lat, max_lon) = geom.rect();
    AABB::from_corners([min_lon, min_lat], [max_lon, max_lat])
}

/// A single candidate returned by a spatial traversal, paired with its
/// great-circle distance from a reference point when relevant (`NEARBY`).
pub struct Candidate<'a> {
    pub object: &'a Object,
    pub distance_m: Option<f64>,
}

/// A named container of [`Object`]s: by-id map, string-value index, a
/// spatial R-tree keyed by MBR, and a TTL min-heap for expiry sweeping.
///
/// Collections are created implicitly on first write and owned by the
/// server under its single write lock; see the crate's concurrency notes.
#[derive(Debug, Default)]
pub struct Collection {
    objects: BTreeMap<String, Object>,
    rtree: RTree<SpatialEntry>,
    ttl_heap: BinaryHeap<Reverse<(TimeKey, String)>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Object> {
        self.objects.get(id)
    }

    /// Insert or replace an object, updating the R-tree and TTL heap.
    pub fn set(&mut self, object: Object) {
        if let Some(old) = self.objects.get(&object.id) {
            let old_envelope = envelope_of(&old.geometry);
            self.rtree.remove(&SpatialEntry {
                id: object.id.clone(),
                envelope: old_envelope,
            });
        }
        let envelope = envelope_of(&object.geometry);
        self.rtree.insert(SpatialEntry {
            id: object.id.clone(),
            envelope,
        });
        if let Some(expires_at) = object.expires_at {
            self.ttl_heap
                .push(Reverse((time_key(expires_at), object.id.clone())));
        }
        self.objects.insert(object.id.clone(), object);
    }

    pub fn remove(&mut self, id: &str) -> Option<Object> {
        let removed = self.objects.remove(id)?;
        self.rtree.remove(&SpatialEntry {
            id: id.to_string(),
            envelope: envelope_of(&removed.geometry),
        });
        Some(removed)
    }

    /// Pop and remove every object whose TTL is due as of `now`. Heap
    /// entries for objects that were since replaced or removed are
    /// discarded lazily (their current state no longer matches the popped
    /// key).
    pub fn sweep_expired(&mut self, now: SystemTime) -> Vec<Object> {
        let mut expired = Vec::new();
        while let Some(Reverse((key, id))) = self.ttl_heap.peek().cloned() {
            if key > time_key(now) {
                break;
            }
            self.ttl_heap.pop();
            if let Some(obj) = self.objects.get(&id) {
                if obj.expires_at.map(time_key) == Some(key) {
                    if let Some(obj) = self.remove(&id) {
                        expired.push(obj);
                    }
                }
            }
        }
        expired
    }

    pub fn scan(&self, desc: bool) -> Vec<&Object> {
        if desc {
            self.objects.values().rev().collect()
        } else {
            self.objects.values().collect()
        }
    }

    /// Scan ids in `[lo, hi)` (half-open); `hi` of `None` means unbounded.
    pub fn scan_range(&self, lo: &str, hi: Option<&str>, desc: bool) -> Vec<&Object> {
        let mut items: Vec<&Object> = match hi {
            Some(hi) => self
                .objects
                .range(lo.to_string()..hi.to_string())
                .map(|(_, v)| v)
                .collect(),
            None => self
                .objects
                .range(lo.to_string()..)
                .map(|(_, v)| v)
                .collect(),
        };
        if desc {
            items.reverse();
        }
        items
    }

    /// Iterates objects ordered by their rendered string value rather than
    /// id (`SEARCH`'s traversal order).
    pub fn search_values(&self, desc: bool) -> Vec<&Object> {
        let mut items: Vec<&Object> = self.objects.values().collect();
        items.sort_by(|a, b| string_value(a).cmp(&string_value(b)));
        if desc {
            items.reverse();
        }
        items
    }

    pub fn search_values_range(&self, lo: &str, hi: Option<&str>, desc: bool) -> Vec<&Object> {
        let mut items = self.search_values(false);
        items.retain(|o| {
            let v = string_value(o);
            v.as_str() >= lo && hi.is_none_or(|hi| v.as_str() < hi)
        });
        if desc {
            items.reverse();
        }
        items
    }

    /// Objects whose geometry is fully contained by `area`. `sparse` caps
    /// the number of R-tree candidates visited (an approximation of the
    /// octree-style depth cap described for dense areas).
    pub fn within(&self, area: &Geometry, sparse: Option<u8>) -> Vec<&Object> {
        self.spatial_candidates(area, sparse, |geom| area.contains(geom))
    }

    pub fn intersects(&self, area: &Geometry, sparse: Option<u8>) -> Vec<&Object> {
        self.spatial_candidates(area, sparse, |geom| area.intersects(geom))
    }

    fn spatial_candidates(
        &self,
        area: &Geometry,
        sparse: Option<u8>,
        test: impl Fn(&Geometry) -> bool,
    ) -> Vec<&Object> {
        let envelope = envelope_of(area);
        let cap = sparse.map(|depth| 1usize << (depth as u32).min(20));
        let mut out = Vec::new();
        for entry in self.rtree.locate_in_envelope_intersecting(&envelope) {
            if let Some(cap) = cap {
                if out.len() >= cap {
                    break;
                }
            }
            if let Some(obj) = self.objects.get(&entry.id) {
                if test(&obj.geometry) {
                    out.push(obj);
                }
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// R-tree prefilter for a boolean area expression: narrows to objects
    /// whose MBR intersects `rect` (the expression's own best-effort bound),
    /// or the full id-ordered table when no bound could be derived (e.g. a
    /// bare `NOT`). Containment/intersection against the actual expression
    /// tree is left to the caller, since `AreaExpression` can combine
    /// several primitives no single R-tree query represents.
    pub fn candidates_by_rect(
        &self,
        rect: Option<(f64, f64, f64, f64)>,
        sparse: Option<u8>,
    ) -> Vec<&Object> {
        let Some((min_lat, min_lon, max_lat, max_lon)) = rect else {
            return self.scan(false);
        };
        let envelope = AABB::from_corners([min_lon, min_lat], [max_lon, max_lat]);
        let cap = sparse.map(|depth| 1usize << (depth as u32).min(20));
        let mut out = Vec::new();
        for entry in self.rtree.locate_in_envelope_intersecting(&envelope) {
            if let Some(cap) = cap {
                if out.len() >= cap {
                    break;
                }
            }
            if let Some(obj) = self.objects.get(&entry.id) {
                out.push(obj);
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Candidates ordered by ascending great-circle distance from `center`.
    /// Exact linear scan: the R-tree's native distance metric is planar and
    /// does not correspond to meters on a sphere, so nearest-neighbor order
    /// is computed directly rather than through `rstar`'s nearest-neighbor
    /// iterator.
    pub fn nearby(&self, center: (f64, f64)) -> Vec<Candidate<'_>> {
        let mut out: Vec<Candidate> = self
            .objects
            .values()
            .map(|object| Candidate {
                object,
                distance_m: Some(haversine_meters(center, object.geometry.center())),
            })
            .collect();
        out.sort_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap()
                .then_with(|| a.object.id.cmp(&b.object.id))
        });
        out
    }
}

fn string_value(obj: &Object) -> String {
    obj.fields
        .iter()
        .map(|(_, v)| v.to_string())
        .collect::<Vec<_>>()
        .join("")
}

/// Owns every named [`Collection`], created implicitly on first write.
#[derive(Debug, Default)]
pub struct CollectionTable {
    collections: BTreeMap<String, Collection>,
}

impl CollectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Collection> {
        self.collections.get(key)
    }

    pub fn get_or_create(&mut self, key: &str) -> &mut Collection {
        self.collections.entry(key.to_string()).or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(|s| s.as_str())
    }

    pub fn sweep_expired(&mut self, now: SystemTime) -> Vec<(String, Object)> {
        let mut all = Vec::new();
        for (key, coll) in self.collections.iter_mut() {
            for obj in coll.sweep_expired(now) {
                all.push((key.clone(), obj));
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn point_obj(id: &str, lat: f64, lon: f64) -> Object {
        Object::new(id, Geometry::point(lat, lon, None))
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut coll = Collection::new();
        coll.set(point_obj("t1", 33.5, -112.1));
        assert_eq!(coll.get("t1").unwrap().id, "t1");
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn replace_updates_rtree_without_duplicate_hit() {
        let mut coll = Collection::new();
        coll.set(point_obj("t1", 33.5, -112.1));
        coll.set(point_obj("t1", 40.0, -75.0));
        let bounds = Geometry::bounds(33.0, -113.0, 34.0, -112.0).unwrap();
        assert!(coll.within(&bounds, None).is_empty());
    }

    #[test]
    fn scan_is_id_ordered() {
        let mut coll = Collection::new();
        coll.set(point_obj("b", 1.0, 1.0));
        coll.set(point_obj("a", 2.0, 2.0));
        let ids: Vec<_> = coll.scan(false).iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn nearby_orders_by_distance() {
        let mut coll = Collection::new();
        coll.set(point_obj("far", 40.0, -75.0));
        coll.set(point_obj("near", 33.5001, -112.1001));
        let hits = coll.nearby((33.5, -112.1));
        assert_eq!(hits[0].object.id, "near");
        assert_eq!(hits[1].object.id, "far");
    }

    #[test]
    fn within_matches_bounds() {
        let mut coll = Collection::new();
        coll.set(point_obj("t1", 33.5, -112.5));
        coll.set(point_obj("t2", 40.0, -75.0));
        let bounds = Geometry::bounds(33.0, -113.0, 34.0, -112.0).unwrap();
        let hits = coll.within(&bounds, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "t1");
    }

    #[test]
    fn ttl_sweep_removes_expired_objects() {
        let mut coll = Collection::new();
        let expired = point_obj("t1", 33.5, -112.1).with_ttl(0);
        coll.set(expired);
        let swept = coll.sweep_expired(SystemTime::now() + Duration::from_secs(1));
        assert_eq!(swept.len(), 1);
        assert!(coll.get("t1").is_none());
    }

    #[test]
    fn ttl_refresh_on_replace_drops_stale_heap_entry() {
        let mut coll = Collection::new();
        coll.set(point_obj("t1", 33.5, -112.1).with_ttl(0));
        let mut persisted = point_obj("t1", 33.5, -112.1);
        persisted.persist();
        coll.set(persisted);
        let swept = coll.sweep_expired(SystemTime::now() + Duration::from_secs(1));
        assert!(swept.is_empty());
        assert!(coll.get("t1").is_some());
    }
}
