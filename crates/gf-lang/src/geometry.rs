use geo::{BoundingRect, Centroid, Contains, Intersects};
use geo_types::{Coord, Geometry as GeoGeom, Point, Rect};

use crate::error::{LangReason, LangResult};

/// Mean Earth radius in meters, matching the sphere Tile38 itself assumes.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// An immutable geometry value: the underlying `geo-types` shape, an
/// optional Z coordinate (points only), and — when the geometry was built
/// from a GeoJSON `Feature`/`Object` literal — the original JSON so
/// [`Geometry::string`] round-trips exactly rather than re-deriving a
/// possibly-lossy shape.
#[derive(Debug, Clone)]
pub struct Geometry {
    shape: GeoGeom<f64>,
    z: Option<f64>,
    raw: Option<serde_json::Value>,
}

impl Geometry {
    pub fn point(lat: f64, lon: f64, z: Option<f64>) -> Self {
        Self {
            shape: GeoGeom::Point(Point::new(lon, lat)),
            z,
            raw: None,
        }
    }

    pub fn circle_center(lat: f64, lon: f64) -> Self {
        Self::point(lat, lon, None)
    }

    pub fn bounds(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> LangResult<Self> {
        if min_lat > max_lat || min_lon > max_lon {
            return Err(LangReason::NotRectangle.into());
        }
        let rect = Rect::new(
            Coord {
                x: min_lon,
                y: min_lat,
            },
            Coord {
                x: max_lon,
                y: max_lat,
            },
        );
        Ok(Self {
            shape: GeoGeom::Rect(rect),
            z: None,
            raw: None,
        })
    }

    /// Parse a GeoJSON `Feature`/`Geometry` literal (the `OBJECT <geojson>`
    /// area primitive, and the shape stored on every persisted object).
    ///
    /// `Feature`s unwrap to their base geometry for coordinate extraction,
    /// but the original JSON is kept so `string()`/`append_json()` still
    /// emit the feature wrapper.
    pub fn from_geojson_str(text: &str) -> LangResult<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| LangReason::InvalidGeometry(e.to_string()))?;
        Self::from_geojson_value(raw)
    }

    pub fn from_geojson_value(raw: serde_json::Value) -> LangResult<Self> {
        let g = geojson::GeoJson::from_json_value(raw.clone())
            .map_err(|e| LangReason::InvalidGeometry(e.to_string()))?;
        let geom = match g {
            geojson::GeoJson::Geometry(ref geom) => geom.clone(),
            geojson::GeoJson::Feature(ref f) => f
                .geometry
                .clone()
                .ok_or_else(|| LangReason::InvalidGeometry("feature has no geometry".into()))?,
            geojson::GeoJson::FeatureCollection(_) => {
                return Err(LangReason::InvalidGeometry(
                    "FeatureCollection is not a single geometry".into(),
                )
                .into());
            }
        };
        let shape: GeoGeom<f64> = geom
            .try_into()
            .map_err(|e: geojson::Error| LangReason::InvalidGeometry(e.to_string()))?;
        let z = match &g {
            geojson::GeoJson::Geometry(geojson::Geometry {
                value: geojson::Value::Point(coords),
                ..
            }) => coords.get(2).copied(),
            geojson::GeoJson::Feature(f) => match f.geometry.as_ref().map(|g| &g.value) {
                Some(geojson::Value::Point(coords)) => coords.get(2).copied(),
                _ => None,
            },
            _ => None,
        };
        Ok(Self {
            shape,
            z,
            raw: Some(raw),
        })
    }

    pub fn z(&self) -> Option<f64> {
        self.z
    }

    /// `(lat, lon)` of the geometry's center — itself for a point, the
    /// centroid otherwise.
    pub fn center(&self) -> (f64, f64) {
        match &self.shape {
            GeoGeom::Point(p) => (p.y(), p.x()),
            other => match other.centroid() {
                Some(c) => (c.y(), c.x()),
                None => (0.0, 0.0),
            },
        }
    }

    /// The axis-aligned minimum bounding rectangle, as `(min_lat, min_lon,
    /// max_lat, max_lon)`.
    pub fn rect(&self) -> (f64, f64, f64, f64) {
        match self.shape.bounding_rect() {
            Some(r) => (r.min().y, r.min().x, r.max().y, r.max().x),
            None => {
                let (lat, lon) = self.center();
                (lat, lon, lat, lon)
            }
        }
    }

    pub fn contains(&self, other: &Geometry) -> bool {
        self.shape.contains(&other.shape)
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        self.shape.intersects(&other.shape)
    }

    /// Crop `self` to the portion inside `clip` (best-effort: exact for
    /// rect-vs-rect, falls back to returning `self` unchanged when the
    /// underlying shapes have no clipping support in `geo`).
    pub fn clip(&self, clip: &Geometry) -> Geometry {
        if let (GeoGeom::Rect(a), GeoGeom::Rect(b)) = (&self.shape, &clip.shape) {
            let min_x = a.min().x.max(b.min().x);
            let min_y = a.min().y.max(b.min().y);
            let max_x = a.max().x.min(b.max().x);
            let max_y = a.max().y.min(b.max().y);
            if min_x <= max_x && min_y <= max_y {
                return Geometry {
                    shape: GeoGeom::Rect(Rect::new(
                        Coord { x: min_x, y: min_y },
                        Coord { x: max_x, y: max_y },
                    )),
                    z: self.z,
                    raw: None,
                };
            }
        }
        self.clone()
    }

    /// Inflate the geometry's bounding rect by `meters` in every direction
    /// (`BUFFER f`). Degrees-per-meter varies with latitude; this uses the
    /// rect's own center latitude, matching `clip`'s best-effort, rect-only
    /// precision rather than a true geodesic offset.
    pub fn buffered(&self, meters: f64) -> Geometry {
        let (min_lat, min_lon, max_lat, max_lon) = self.rect();
        let center_lat = (min_lat + max_lat) / 2.0;
        let dlat = meters / 111_320.0;
        let dlon = meters / (111_320.0 * center_lat.to_radians().cos().max(1e-6));
        Geometry {
            shape: GeoGeom::Rect(Rect::new(
                Coord {
                    x: min_lon - dlon,
                    y: min_lat - dlat,
                },
                Coord {
                    x: max_lon + dlon,
                    y: max_lat + dlat,
                },
            )),
            z: self.z,
            raw: None,
        }
    }

    pub fn append_json(&self, buf: &mut String) {
        buf.push_str(&self.string());
    }

    pub fn string(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.to_string();
        }
        let geojson_geom = geojson::Geometry::from(&self.shape);
        geojson_geom.to_string()
    }
}

/// Great-circle distance in meters between two `(lat, lon)` points,
/// assuming a spherical Earth (see [`EARTH_RADIUS_M`]).
pub fn haversine_meters(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_rejects_inverted_rectangle() {
        assert!(Geometry::bounds(10.0, 10.0, 5.0, 20.0).is_err());
    }

    #[test]
    fn point_center_is_itself() {
        let g = Geometry::point(33.5, -112.1, None);
        assert_eq!(g.center(), (33.5, -112.1));
    }

    #[test]
    fn haversine_zero_distance_for_same_point() {
        assert_eq!(haversine_meters((1.0, 1.0), (1.0, 1.0)), 0.0);
    }

    #[test]
    fn bounds_contains_point_inside() {
        let b = Geometry::bounds(33.0, -113.0, 34.0, -112.0).unwrap();
        let p = Geometry::point(33.5, -112.5, None);
        assert!(b.contains(&p));
        let outside = Geometry::point(40.0, -75.0, None);
        assert!(!b.contains(&outside));
    }
}
