use crate::config::MapConfig;
use crate::types::{Metric, StateFeature};
use geo::algorithm::centroid::Centroid;
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use std::fmt::Write as _;

// Clip-window tolerance, matching the convention the inset offsets come from.
const EPSILON: f64 = 1e-6;

/// Albers equal-area conic with rotation, center, scale and translate folded
/// into a single forward transform. Longitude rotation only; the US composite
/// never tilts the pole.
#[derive(Debug, Clone)]
pub struct ConicEqualArea {
    n: f64,
    c: f64,
    r0: f64,
    /// Longitude offset in degrees.
    rotate: f64,
    /// Projection center in post-rotation degrees.
    center: (f64, f64),
    k: f64,
    dx: f64,
    dy: f64,
}

impl ConicEqualArea {
    pub fn new(parallels: (f64, f64), rotate: f64, center: (f64, f64)) -> Self {
        let sy0 = parallels.0.to_radians().sin();
        let n = (sy0 + parallels.1.to_radians().sin()) / 2.0;
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        let r0 = c.sqrt() / n;
        let mut projection = ConicEqualArea {
            n,
            c,
            r0,
            rotate,
            center,
            k: 1.0,
            dx: 0.0,
            dy: 0.0,
        };
        projection.set_scale_translate(1.0, 0.0, 0.0);
        projection
    }

    // Unit-sphere forward projection; angles in radians.
    fn raw(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let r = (self.c - 2.0 * self.n * phi.sin()).sqrt() / self.n;
        let nl = self.n * lambda;
        (r * nl.sin(), self.r0 - r * nl.cos())
    }

    pub fn set_scale_translate(&mut self, k: f64, tx: f64, ty: f64) {
        let (cx, cy) = self.raw(self.center.0.to_radians(), self.center.1.to_radians());
        self.k = k;
        self.dx = tx - cx * k;
        self.dy = ty + cy * k;
    }

    pub fn project(&self, lon: f64, lat: f64) -> Point<f64> {
        let lambda = wrap_longitude(lon + self.rotate).to_radians();
        let (x, y) = self.raw(lambda, lat.to_radians());
        Point::new(x * self.k + self.dx, self.dy - y * self.k)
    }
}

fn wrap_longitude(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

#[derive(Debug, Clone, Copy, Default)]
struct ClipRect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl ClipRect {
    fn contains(&self, p: &Point<f64>) -> bool {
        p.x() >= self.x0 && p.x() <= self.x1 && p.y() >= self.y0 && p.y() <= self.y1
    }
}

/// Composite projection for the United States: an Albers conic for the lower
/// 48 with Alaska (at 0.35x scale) and Hawaii repositioned below the
/// southwest. Each sub-projection owns a pixel-space window; locations no
/// window claims (Puerto Rico, Guam, ...) project to `None`.
#[derive(Debug, Clone)]
pub struct AlbersUsa {
    lower48: ConicEqualArea,
    alaska: ConicEqualArea,
    hawaii: ConicEqualArea,
    k: f64,
    tx: f64,
    ty: f64,
    lower48_clip: ClipRect,
    alaska_clip: ClipRect,
    hawaii_clip: ClipRect,
}

impl AlbersUsa {
    pub fn new() -> Self {
        let mut projection = AlbersUsa {
            lower48: ConicEqualArea::new((29.5, 45.5), 96.0, (-0.6, 38.7)),
            alaska: ConicEqualArea::new((55.0, 65.0), 154.0, (-2.0, 58.5)),
            hawaii: ConicEqualArea::new((8.0, 18.0), 157.0, (-3.0, 19.9)),
            k: 0.0,
            tx: 0.0,
            ty: 0.0,
            lower48_clip: ClipRect::default(),
            alaska_clip: ClipRect::default(),
            hawaii_clip: ClipRect::default(),
        };
        projection.set_scale_translate(1070.0, 480.0, 250.0);
        projection
    }

    pub fn scale(&self) -> f64 {
        self.k
    }

    pub fn translate(&self) -> (f64, f64) {
        (self.tx, self.ty)
    }

    pub fn set_scale_translate(&mut self, k: f64, tx: f64, ty: f64) {
        self.k = k;
        self.tx = tx;
        self.ty = ty;

        self.lower48.set_scale_translate(k, tx, ty);
        self.alaska
            .set_scale_translate(k * 0.35, tx - 0.307 * k, ty + 0.201 * k);
        self.hawaii
            .set_scale_translate(k, tx - 0.205 * k, ty + 0.212 * k);

        self.lower48_clip = ClipRect {
            x0: tx - 0.455 * k,
            y0: ty - 0.238 * k,
            x1: tx + 0.455 * k,
            y1: ty + 0.238 * k,
        };
        self.alaska_clip = ClipRect {
            x0: tx - 0.425 * k + EPSILON,
            y0: ty + 0.120 * k + EPSILON,
            x1: tx - 0.214 * k - EPSILON,
            y1: ty + 0.234 * k - EPSILON,
        };
        self.hawaii_clip = ClipRect {
            x0: tx - 0.214 * k + EPSILON,
            y0: ty + 0.166 * k + EPSILON,
            x1: tx - 0.115 * k - EPSILON,
            y1: ty + 0.234 * k - EPSILON,
        };
    }

    pub fn project(&self, lon: f64, lat: f64) -> Option<Point<f64>> {
        let p = self.lower48.project(lon, lat);
        if self.lower48_clip.contains(&p) {
            return Some(p);
        }
        let p = self.alaska.project(lon, lat);
        if self.alaska_clip.contains(&p) {
            return Some(p);
        }
        let p = self.hawaii.project(lon, lat);
        if self.hawaii_clip.contains(&p) {
            return Some(p);
        }
        None
    }

    /// Fit the projection to the extent `[[x0, y0], [x1, y1]]`: project every
    /// polygon vertex at a reference scale, measure planar bounds, then solve
    /// scale and translate so the bounds fill the extent, centered along the
    /// slack axis.
    pub fn fit_extent(&mut self, extent: [[f64; 2]; 2], features: &[StateFeature]) {
        self.set_scale_translate(150.0, 0.0, 0.0);

        let mut x0 = f64::MAX;
        let mut y0 = f64::MAX;
        let mut x1 = f64::MIN;
        let mut y1 = f64::MIN;
        let mut seen = false;

        for feature in features {
            for polygon in &feature.geometry {
                for ring in
                    std::iter::once(polygon.exterior()).chain(polygon.interiors().iter())
                {
                    for coord in ring.coords() {
                        if let Some(p) = self.project(coord.x, coord.y) {
                            x0 = x0.min(p.x());
                            y0 = y0.min(p.y());
                            x1 = x1.max(p.x());
                            y1 = y1.max(p.y());
                            seen = true;
                        }
                    }
                }
            }
        }

        if !seen {
            // Nothing projectable; fall back to the stock frame.
            self.set_scale_translate(1070.0, 480.0, 250.0);
            return;
        }

        let w = extent[1][0] - extent[0][0];
        let h = extent[1][1] - extent[0][1];
        let k = (w / (x1 - x0)).min(h / (y1 - y0));
        let tx = extent[0][0] + (w - k * (x1 + x0)) / 2.0;
        let ty = extent[0][1] + (h - k * (y1 + y0)) / 2.0;
        self.set_scale_translate(150.0 * k, tx, ty);
    }
}

impl Default for AlbersUsa {
    fn default() -> Self {
        AlbersUsa::new()
    }
}

/// A state prepared for drawing. `outline` and `path` are in pixel space;
/// both are `None` when no vertex of the geometry lands in any projection
/// window, in which case the state is carried for data lookups but not drawn.
#[derive(Debug, Clone)]
pub struct ProjectedState {
    pub state: StateFeature,
    pub outline: Option<MultiPolygon<f64>>,
    pub path: Option<String>,
    pub bubble_anchor: Option<Point<f64>>,
}

impl ProjectedState {
    pub fn value_on(&self, date: &str, metric: Metric) -> f64 {
        self.state.value_on(date, metric)
    }

    pub fn value_per_million(&self, date: &str, metric: Metric) -> f64 {
        self.state.value_per_million(date, metric)
    }
}

/// Fit a projection to the configured viewport and project every feature.
pub fn project_states(states: Vec<StateFeature>, map: &MapConfig) -> Vec<ProjectedState> {
    let mut projection = AlbersUsa::new();
    projection.fit_extent(
        [
            [map.margin, map.margin],
            [map.width - map.margin, map.height - map.margin],
        ],
        &states,
    );

    states
        .into_iter()
        .map(|state| {
            let outline = project_multi_polygon(&projection, &state.geometry);
            let path = outline.as_ref().map(path_data);
            let bubble_anchor = state
                .centroid
                .or_else(|| state.geometry.centroid())
                .and_then(|c| projection.project(c.x(), c.y()));
            ProjectedState {
                state,
                outline,
                path,
                bubble_anchor,
            }
        })
        .collect()
}

fn project_multi_polygon(
    projection: &AlbersUsa,
    geometry: &MultiPolygon<f64>,
) -> Option<MultiPolygon<f64>> {
    let mut polygons = Vec::new();

    for polygon in geometry {
        let exterior = match project_ring(projection, polygon.exterior()) {
            Some(ring) => ring,
            None => continue,
        };
        let interiors: Vec<LineString<f64>> = polygon
            .interiors()
            .iter()
            .filter_map(|ring| project_ring(projection, ring))
            .collect();
        polygons.push(Polygon::new(exterior, interiors));
    }

    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}

// Vertices outside every projection window are dropped; a ring that keeps
// fewer than three vertices is discarded.
fn project_ring(projection: &AlbersUsa, ring: &LineString<f64>) -> Option<LineString<f64>> {
    let coords: Vec<Coord<f64>> = ring
        .coords()
        .filter_map(|c| {
            projection
                .project(c.x, c.y)
                .map(|p| Coord { x: p.x(), y: p.y() })
        })
        .collect();
    if coords.len() < 3 {
        None
    } else {
        Some(LineString::new(coords))
    }
}

fn path_data(outline: &MultiPolygon<f64>) -> String {
    let mut d = String::new();
    for polygon in outline {
        ring_path(&mut d, polygon.exterior());
        for interior in polygon.interiors() {
            ring_path(&mut d, interior);
        }
    }
    d
}

fn ring_path(d: &mut String, ring: &LineString<f64>) {
    let coords = &ring.0;
    if coords.is_empty() {
        return;
    }
    // The closing duplicate is implied by Z.
    let closed = coords.len() > 1 && coords[0] == coords[coords.len() - 1];
    let end = if closed { coords.len() - 1 } else { coords.len() };
    for (i, c) in coords[..end].iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(d, "{}{:.2},{:.2}", cmd, c.x, c.y);
    }
    d.push('Z');
}
