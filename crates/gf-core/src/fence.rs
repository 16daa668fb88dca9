use gf_lang::{
    haversine_meters, Command, ContainMode, Detect, FieldList, Geometry, NoGetResolver,
    ScriptCache, ScriptEngine,
};

use crate::error::CoreResult;
use crate::hook::Hook;
use crate::object::Object;

/// A single mutation the fence evaluator reacts to: a `SET`/`DEL`/`DROP`
/// against `key`, carrying the object's state before and after (either
/// side `None` for a creation or deletion).
pub struct MutationEvent<'a> {
    pub command: &'a str,
    pub key: &'a str,
    pub old: Option<&'a Object>,
    pub new: Option<&'a Object>,
}

/// One delivered message: the notification body plus the endpoints it
/// should be queued against.
pub struct Notification {
    pub hook_name: String,
    pub endpoints: Vec<String>,
    pub channel: bool,
    pub body: String,
}

impl Hook {
    /// Whether `obj` currently satisfies this hook's fence (area/point
    /// containment, then its `WHERE`/`MATCH` predicates). `None` is never
    /// inside anything.
    pub fn matches(
        &self,
        obj: Option<&Object>,
        engine: &dyn ScriptEngine,
        cache: Option<&ScriptCache>,
    ) -> CoreResult<bool> {
        let Some(obj) = obj else {
            return Ok(false);
        };
        let resolver = NoGetResolver;
        let inside = if let Some(expr) = &self.fence.area {
            let mode = if self.fence.command == Command::Within {
                ContainMode::Within
            } else {
                ContainMode::Intersects
            };
            let buffer_m = self.fence.buffer.unwrap_or(0.0);
            expr.evaluate_buffered(&obj.geometry, mode, &resolver, buffer_m)?
        } else if let Some((lat, lon, radius)) = self.fence.point {
            radius == 0.0 || haversine_meters((lat, lon), obj.geometry.center()) <= radius
        } else {
            true
        };
        if !inside {
            return Ok(false);
        }
        Ok(self
            .fence
            .predicates
            .matches(&obj.id, &obj.fields, obj.geometry.z(), engine, cache)?)
    }
}

/// Runs `event` against every hook in `registry` and returns the
/// notifications it produced, classifying each hook's reaction by
/// comparing containment before and after the mutation.
pub fn evaluate(
    registry: &crate::hook::HookRegistry,
    event: &MutationEvent,
    engine: &dyn ScriptEngine,
    cache: Option<&ScriptCache>,
) -> CoreResult<Vec<Notification>> {
    let mut out = Vec::new();

    let envelope = mutation_envelope(event);
    let mut seen = std::collections::HashSet::new();
    let mut candidates: Vec<&Hook> = registry.candidates_by_envelope(envelope);
    candidates.extend(registry.outside_hooks());

    for hook in candidates {
        if !seen.insert(hook.name.clone()) {
            continue;
        }
        if hook.key != event.key {
            continue;
        }
        if let Some(accept) = &hook.fence.commands {
            if !accept.iter().any(|c| c.eq_ignore_ascii_case(event.command)) {
                continue;
            }
        }
        if let Some(n) = react(hook, event, engine, cache)? {
            out.push(n);
        }
    }

    Ok(out)
}

fn react(
    hook: &Hook,
    event: &MutationEvent,
    engine: &dyn ScriptEngine,
    cache: Option<&ScriptCache>,
) -> CoreResult<Option<Notification>> {
    let was_inside = hook.matches(event.old, engine, cache)?;
    let is_inside = hook.matches(event.new, engine, cache)?;
    let detect = &hook.fence.detect;

    let transition = match (was_inside, is_inside) {
        (true, true) => detect.contains(Detect::Inside).then_some(Detect::Inside),
        (false, true) => detect.contains(Detect::Enter).then_some(Detect::Enter),
        (true, false) => {
            if detect.contains(Detect::Exit) {
                Some(Detect::Exit)
            } else if detect.contains(Detect::Outside) {
                Some(Detect::Outside)
            } else {
                None
            }
        }
        (false, false) => {
            if detect.contains(Detect::Cross) && segment_crosses_fence(hook, event) {
                Some(Detect::Cross)
            } else {
                None
            }
        }
    };

    let Some(transition) = transition else {
        return Ok(None);
    };

    let obj = event.new.or(event.old);
    let body = notification_body(hook, event, transition, obj);
    Ok(Some(Notification {
        hook_name: hook.name.clone(),
        endpoints: hook.endpoints.clone(),
        channel: hook.channel,
        body,
    }))
}

fn notification_body(
    hook: &Hook,
    event: &MutationEvent,
    transition: Detect,
    obj: Option<&Object>,
) -> String {
    let mut buf = String::from("{");
    buf.push_str(&format!("\"command\":\"{}\"", event.command));
    buf.push_str(&format!(",\"detect\":\"{}\"", transition.as_str()));
    buf.push_str(&format!(",\"hook\":\"{}\"", hook.name));
    buf.push_str(&format!(",\"key\":\"{}\"", event.key));
    let now: chrono::DateTime<chrono::Utc> = std::time::SystemTime::now().into();
    buf.push_str(&format!(",\"time\":\"{}\"", now.to_rfc3339()));
    if let Some(obj) = obj {
        buf.push_str(&format!(",\"id\":\"{}\"", obj.id));
        buf.push_str(",\"object\":");
        obj.geometry.append_json(&mut buf);
        buf.push_str(",\"fields\":{");
        append_fields_json(&mut buf, &obj.fields);
        buf.push('}');
        if let Some((lat, lon, _)) = hook.fence.point {
            let d = haversine_meters((lat, lon), obj.geometry.center());
            buf.push_str(&format!(",\"distance\":{d}"));
        }
    }
    if !hook.metas.is_empty() {
        buf.push_str(",\"meta\":{");
        for (i, (k, v)) in hook.metas.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            buf.push('"');
            buf.push_str(k);
            buf.push_str("\":\"");
            buf.push_str(v);
            buf.push('"');
        }
        buf.push('}');
    }
    buf.push('}');
    buf
}

fn append_fields_json(buf: &mut String, fields: &FieldList) {
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        buf.push('"');
        buf.push_str(name);
        buf.push_str("\":");
        value.append_json(buf);
    }
}

fn mutation_envelope(event: &MutationEvent) -> rstar::AABB<[f64; 2]> {
    let mut min = [f64::INFINITY, f64::INFINITY];
    let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
    for obj in [event.old, event.new].into_iter().flatten() {
        let (min_lat, min_lon, max_lat, max_lon) = obj.geometry.rect();
        min[0] = min[0].min(min_lon);
        min[1] = min[1].min(min_lat);
        max[0] = max[0].max(max_lon);
        max[1] = max[1].max(max_lat);
    }
    if min[0].is_infinite() {
        return rstar::AABB::from_point([0.0, 0.0]);
    }
    rstar::AABB::from_corners(min, max)
}

/// Approximates whether the straight path from `event.old` to `event.new`
/// crossed `hook`'s fence boundary, for the case where both endpoints test
/// as outside. Projects both positions to local meters (equirectangular,
/// centered on the old position) and tests the segment against either the
/// fence's bounding rect (area-expression fences) or its circle (point
/// fences) — exact for a circle, an approximation for an arbitrary
/// boolean area expression.
fn segment_crosses_fence(hook: &Hook, event: &MutationEvent) -> bool {
    let (Some(old), Some(new)) = (event.old, event.new) else {
        return false;
    };
    let origin = old.geometry.center();
    let p0 = to_local_meters(origin, origin);
    let p1 = to_local_meters(origin, new.geometry.center());

    if let Some((lat, lon, radius)) = hook.fence.point {
        if radius <= 0.0 {
            return false;
        }
        let center = to_local_meters(origin, (lat, lon));
        return point_segment_distance(center, p0, p1) <= radius;
    }

    if let Some(expr) = &hook.fence.area {
        let resolver = NoGetResolver;
        let Some((min_lat, min_lon, max_lat, max_lon)) = expr.bounding_rect(&resolver) else {
            return false;
        };
        let buffer_m = hook.fence.buffer.unwrap_or(0.0);
        let (min_lat, min_lon, max_lat, max_lon) = if buffer_m > 0.0 {
            Geometry::bounds(min_lat, min_lon, max_lat, max_lon)
                .map(|g| g.buffered(buffer_m).rect())
                .unwrap_or((min_lat, min_lon, max_lat, max_lon))
        } else {
            (min_lat, min_lon, max_lat, max_lon)
        };
        let min_pt = to_local_meters(origin, (min_lat, min_lon));
        let max_pt = to_local_meters(origin, (max_lat, max_lon));
        let (lo, hi) = (
            [min_pt[0].min(max_pt[0]), min_pt[1].min(max_pt[1])],
            [min_pt[0].max(max_pt[0]), min_pt[1].max(max_pt[1])],
        );
        return segment_intersects_aabb(p0, p1, lo, hi);
    }

    false
}

fn to_local_meters(origin: (f64, f64), p: (f64, f64)) -> [f64; 2] {
    const M_PER_DEG_LAT: f64 = 111_320.0;
    let m_per_deg_lon = M_PER_DEG_LAT * origin.0.to_radians().cos().max(1e-6);
    [(p.1 - origin.1) * m_per_deg_lon, (p.0 - origin.0) * M_PER_DEG_LAT]
}

/// Minimum distance from point `p` to segment `a`-`b`.
fn point_segment_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let len_sq = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len_sq > 0.0 {
        ((ap[0] * ab[0] + ap[1] * ab[1]) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = [a[0] + ab[0] * t, a[1] + ab[1] * t];
    ((p[0] - closest[0]).powi(2) + (p[1] - closest[1]).powi(2)).sqrt()
}

/// Liang-Barsky segment/AABB clipping, used only for its boolean
/// intersect-or-not result.
fn segment_intersects_aabb(p0: [f64; 2], p1: [f64; 2], min: [f64; 2], max: [f64; 2]) -> bool {
    let d = [p1[0] - p0[0], p1[1] - p0[1]];
    let mut t_min = 0.0_f64;
    let mut t_max = 1.0_f64;

    for axis in 0..2 {
        if d[axis] == 0.0 {
            if p0[axis] < min[axis] || p0[axis] > max[axis] {
                return false;
            }
            continue;
        }
        let mut t1 = (min[axis] - p0[axis]) / d[axis];
        let mut t2 = (max[axis] - p0[axis]) / d[axis];
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_min > t_max {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{HookDef, HookRegistry};
    use gf_lang::{parse_command, Command as Cmd, NullScriptEngine};

    fn fence(tail: &str) -> gf_lang::SearchTokens {
        let toks: Vec<String> = tail.split_whitespace().map(String::from).collect();
        parse_command(Cmd::Nearby, "fleet", &toks).unwrap()
    }

    fn circle_hook(name: &str) -> HookDef {
        HookDef {
            name: name.to_string(),
            key: "fleet".to_string(),
            endpoints: vec!["http://example.com/hook".to_string()],
            fence: fence("POINT 33.5 -112.1 500"),
            message: vec![],
            metas: vec![],
            channel: false,
            expires_at: None,
        }
    }

    #[test]
    fn enter_fires_on_transition_into_fence() {
        let mut reg = HookRegistry::new();
        reg.set(circle_hook("a")).unwrap();
        let engine = NullScriptEngine;

        let far = Object::new("t1", Geometry::point(40.0, -75.0, None));
        let near = Object::new("t1", Geometry::point(33.5, -112.1, None));
        let event = MutationEvent {
            command: "SET",
            key: "fleet",
            old: Some(&far),
            new: Some(&near),
        };
        let notes = evaluate(&reg, &event, &engine, None).unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].body.contains("\"detect\":\"enter\""));
    }

    #[test]
    fn exit_fires_on_transition_out_of_fence() {
        let mut reg = HookRegistry::new();
        reg.set(circle_hook("a")).unwrap();
        let engine = NullScriptEngine;

        let near = Object::new("t1", Geometry::point(33.5, -112.1, None));
        let far = Object::new("t1", Geometry::point(40.0, -75.0, None));
        let event = MutationEvent {
            command: "SET",
            key: "fleet",
            old: Some(&near),
            new: Some(&far),
        };
        let notes = evaluate(&reg, &event, &engine, None).unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].body.contains("\"detect\":\"exit\""));
    }

    #[test]
    fn stays_inside_fires_inside_detect() {
        let mut reg = HookRegistry::new();
        reg.set(circle_hook("a")).unwrap();
        let engine = NullScriptEngine;

        let a = Object::new("t1", Geometry::point(33.5, -112.1, None));
        let b = Object::new("t1", Geometry::point(33.5001, -112.1001, None));
        let event = MutationEvent {
            command: "SET",
            key: "fleet",
            old: Some(&a),
            new: Some(&b),
        };
        let notes = evaluate(&reg, &event, &engine, None).unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].body.contains("\"detect\":\"inside\""));
    }

    #[test]
    fn staying_outside_without_crossing_fires_no_notification() {
        let mut reg = HookRegistry::new();
        reg.set(circle_hook("a")).unwrap();
        let engine = NullScriptEngine;

        let a = Object::new("t1", Geometry::point(41.0, -75.0, None));
        let b = Object::new("t1", Geometry::point(42.0, -76.0, None));
        let event = MutationEvent {
            command: "SET",
            key: "fleet",
            old: Some(&a),
            new: Some(&b),
        };
        let notes = evaluate(&reg, &event, &engine, None).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn deletion_from_inside_fires_outside_detect_when_exit_not_covered() {
        let mut reg = HookRegistry::new();
        let toks: Vec<String> = "POINT 33.5 -112.1 500 FENCE DETECT outside"
            .split_whitespace()
            .map(String::from)
            .collect();
        let fence = parse_command(Cmd::Nearby, "fleet", &toks).unwrap();
        reg.set(HookDef {
            name: "a".to_string(),
            key: "fleet".to_string(),
            endpoints: vec!["http://example.com/hook".to_string()],
            fence,
            message: vec![],
            metas: vec![],
            channel: false,
            expires_at: None,
        })
        .unwrap();
        let engine = NullScriptEngine;

        let inside = Object::new("t1", Geometry::point(33.5, -112.1, None));
        let event = MutationEvent {
            command: "DEL",
            key: "fleet",
            old: Some(&inside),
            new: None,
        };
        let notes = evaluate(&reg, &event, &engine, None).unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].body.contains("\"detect\":\"outside\""));
    }

    #[test]
    fn point_segment_distance_matches_perpendicular_case() {
        let d = point_segment_distance([0.0, 5.0], [-10.0, 0.0], [10.0, 0.0]);
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn segment_intersects_aabb_detects_passthrough() {
        let hit = segment_intersects_aabb([-10.0, 0.0], [10.0, 0.0], [-1.0, -1.0], [1.0, 1.0]);
        assert!(hit);
        let miss = segment_intersects_aabb([-10.0, 10.0], [10.0, 10.0], [-1.0, -1.0], [1.0, 1.0]);
        assert!(!miss);
    }
}
