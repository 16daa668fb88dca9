use crate::error::{LangReason, LangResult};
use crate::geometry::{haversine_meters, Geometry};

/// How a leaf primitive's geometry is compared against a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainMode {
    /// `WITHIN` — candidate must be fully contained.
    Within,
    /// `INTERSECTS` — candidate must merely overlap.
    Intersects,
}

/// A leaf area primitive, as parsed from command tokens.
#[derive(Debug, Clone)]
pub enum Primitive {
    Point {
        lat: f64,
        lon: f64,
        meters: Option<f64>,
    },
    Circle {
        lat: f64,
        lon: f64,
        meters: f64,
    },
    Object(Geometry),
    Bounds {
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    },
    Hash(String),
    Quadkey(String),
    Tile {
        x: u64,
        y: u64,
        z: u8,
    },
    /// Resolved against a collection by the caller via [`GetResolver`].
    Get {
        key: String,
        id: String,
    },
    Sector {
        lat: f64,
        lon: f64,
        meters: f64,
        bearing1: f64,
        bearing2: f64,
    },
}

impl Primitive {
    /// `CLIP` is rejected for primitives where clipping is ill-defined.
    pub fn supports_clip(&self) -> bool {
        !matches!(
            self,
            Primitive::Point { .. } | Primitive::Circle { .. } | Primitive::Object(_) | Primitive::Get { .. }
        )
    }

    fn to_geometry(&self) -> LangResult<Geometry> {
        match self {
            Primitive::Point { lat, lon, .. } => Ok(Geometry::point(*lat, *lon, None)),
            Primitive::Circle { lat, lon, .. } => Ok(Geometry::circle_center(*lat, *lon)),
            Primitive::Object(g) => Ok(g.clone()),
            Primitive::Bounds {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            } => Geometry::bounds(*min_lat, *min_lon, *max_lat, *max_lon),
            Primitive::Hash(hash) => {
                let (c, _, _) = geohash::decode(hash)
                    .map_err(|e| LangReason::InvalidGeometry(e.to_string()))?;
                Ok(Geometry::point(c.y, c.x, None))
            }
            Primitive::Quadkey(_) | Primitive::Tile { .. } | Primitive::Sector { .. } => {
                // Tile/quadkey/sector bounds require projection math that is
                // out of scope for the geometry model itself; callers using
                // these primitives must supply a resolved `Object`/`Bounds`
                // upstream. Kept as a named, documented gap.
                Err(LangReason::InvalidGeometry(
                    "tile/quadkey/sector resolution requires a projection helper".into(),
                )
                .into())
            }
            Primitive::Get { .. } => Err(LangReason::InvalidGeometry(
                "GET primitive must be resolved via GetResolver".into(),
            )
            .into()),
        }
    }

    /// The distance-bearing radius this primitive implies, if any (used by
    /// `NEARBY`/`DISTANCE` and by radius-based containment tests).
    pub fn radius_m(&self) -> Option<f64> {
        match self {
            Primitive::Point { meters, .. } => *meters,
            Primitive::Circle { meters, .. } => Some(*meters),
            Primitive::Sector { meters, .. } => Some(*meters),
            _ => None,
        }
    }

    pub fn center(&self) -> Option<(f64, f64)> {
        match self {
            Primitive::Point { lat, lon, .. } => Some((*lat, *lon)),
            Primitive::Circle { lat, lon, .. } => Some((*lat, *lon)),
            Primitive::Sector { lat, lon, .. } => Some((*lat, *lon)),
            _ => None,
        }
    }
}

/// Resolves a `GET key id` area primitive against live collection state.
pub trait GetResolver {
    fn resolve(&self, key: &str, id: &str) -> Option<Geometry>;
}

pub struct NoGetResolver;
impl GetResolver for NoGetResolver {
    fn resolve(&self, _key: &str, _id: &str) -> Option<Geometry> {
        None
    }
}

/// Boolean tree over geometric primitives.
#[derive(Debug, Clone)]
pub enum AreaExpression {
    Leaf(Primitive),
    Not(Box<AreaExpression>),
    And(Vec<AreaExpression>),
    Or(Vec<AreaExpression>),
}

impl AreaExpression {
    pub fn evaluate(
        &self,
        candidate: &Geometry,
        mode: ContainMode,
        resolver: &dyn GetResolver,
    ) -> LangResult<bool> {
        self.evaluate_buffered(candidate, mode, resolver, 0.0)
    }

    /// As [`Self::evaluate`], but every leaf's area is pre-inflated by
    /// `buffer_m` meters (`BUFFER f`) before the containment test.
    pub fn evaluate_buffered(
        &self,
        candidate: &Geometry,
        mode: ContainMode,
        resolver: &dyn GetResolver,
        buffer_m: f64,
    ) -> LangResult<bool> {
        match self {
            AreaExpression::Leaf(prim) => eval_leaf(prim, candidate, mode, resolver, buffer_m),
            AreaExpression::Not(inner) => {
                Ok(!inner.evaluate_buffered(candidate, mode, resolver, buffer_m)?)
            }
            AreaExpression::And(parts) => {
                for p in parts {
                    if !p.evaluate_buffered(candidate, mode, resolver, buffer_m)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            AreaExpression::Or(parts) => {
                for p in parts {
                    if p.evaluate_buffered(candidate, mode, resolver, buffer_m)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Best-effort bounding rect of the whole tree, used to seed a
    /// spatial-index scan before per-candidate predicate evaluation.
    pub fn bounding_rect(&self, resolver: &dyn GetResolver) -> Option<(f64, f64, f64, f64)> {
        match self {
            AreaExpression::Leaf(prim) => leaf_geometry(prim, resolver).map(|g| g.rect()),
            AreaExpression::Not(_) => None,
            AreaExpression::And(parts) | AreaExpression::Or(parts) => {
                parts.iter().find_map(|p| p.bounding_rect(resolver))
            }
        }
    }
}

fn leaf_geometry(prim: &Primitive, resolver: &dyn GetResolver) -> Option<Geometry> {
    if let Primitive::Get { key, id } = prim {
        return resolver.resolve(key, id);
    }
    prim.to_geometry().ok()
}

fn eval_leaf(
    prim: &Primitive,
    candidate: &Geometry,
    mode: ContainMode,
    resolver: &dyn GetResolver,
    buffer_m: f64,
) -> LangResult<bool> {
    if let Some(radius) = prim.radius_m() {
        let center = prim.center().expect("radius-bearing primitive has a center");
        let d = haversine_meters(center, candidate.center());
        return Ok(d <= radius + buffer_m);
    }

    let mut area_geom = leaf_geometry(prim, resolver).ok_or_else(|| {
        LangReason::InvalidGeometry("area primitive did not resolve to a geometry".into())
    })?;
    if buffer_m > 0.0 {
        area_geom = area_geom.buffered(buffer_m);
    }

    Ok(match mode {
        ContainMode::Within => area_geom.contains(candidate),
        ContainMode::Intersects => area_geom.intersects(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_contains_point_inside_radius() {
        let area = AreaExpression::Leaf(Primitive::Circle {
            lat: 33.5,
            lon: -112.1,
            meters: 1000.0,
        });
        let candidate = Geometry::point(33.5, -112.1005, None);
        assert!(area
            .evaluate(&candidate, ContainMode::Within, &NoGetResolver)
            .unwrap());
    }

    #[test]
    fn not_inverts() {
        let area = AreaExpression::Not(Box::new(AreaExpression::Leaf(Primitive::Bounds {
            min_lat: 33.0,
            min_lon: -113.0,
            max_lat: 34.0,
            max_lon: -112.0,
        })));
        let inside = Geometry::point(33.5, -112.5, None);
        assert!(!area
            .evaluate(&inside, ContainMode::Within, &NoGetResolver)
            .unwrap());
    }

    #[test]
    fn and_or_compose() {
        let bounds_a = AreaExpression::Leaf(Primitive::Bounds {
            min_lat: 33.0,
            min_lon: -113.0,
            max_lat: 34.0,
            max_lon: -112.0,
        });
        let bounds_b = AreaExpression::Leaf(Primitive::Bounds {
            min_lat: 39.0,
            min_lon: -76.0,
            max_lat: 41.0,
            max_lon: -74.0,
        });
        let or_expr = AreaExpression::Or(vec![bounds_a, bounds_b]);
        let phoenix = Geometry::point(33.5, -112.5, None);
        let nyc = Geometry::point(40.0, -75.0, None);
        assert!(or_expr
            .evaluate(&phoenix, ContainMode::Within, &NoGetResolver)
            .unwrap());
        assert!(or_expr
            .evaluate(&nyc, ContainMode::Within, &NoGetResolver)
            .unwrap());
        let paris = Geometry::point(48.8, 2.3, None);
        assert!(!or_expr
            .evaluate(&paris, ContainMode::Within, &NoGetResolver)
            .unwrap());
    }
}
