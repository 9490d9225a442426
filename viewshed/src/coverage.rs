//! Coarse grid accumulation of visible points.
//!
//! Coordinates are projected onto a local meter grid,
//!
//! ```text
//! y = lat * M
//! x = lon * M * cos(lat0)
//! ```
//!
//! where `M` is the length of one degree of latitude and `lat0` is the
//! grid's fixed reference latitude, and floored into square cells.
//! Cell edges follow meridians and parallels, and cells are close to
//! square on the ground near `lat0`.

use crate::{ViewshedConfig, ViewshedResult};
use geo::{polygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, time::SystemTime};
use terrain::Coordinate;

/// Meters per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Index of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i64,
    pub y: i64,
}

/// A set of grid cells, ordered so serialized output is stable.
pub type CellSet = BTreeSet<GridCell>;

/// Maps coordinates and viewshed results to grid cells of a fixed
/// size.
///
/// Cell sets are only comparable between grids with the same cell size
/// and reference latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageGrid {
    cell_size_m: f64,
    #[serde(default)]
    reference_lat_deg: f64,
}

impl CoverageGrid {
    /// Returns a grid referenced to the equator.
    pub fn new(cell_size_m: f64) -> Self {
        Self {
            cell_size_m,
            reference_lat_deg: 0.0,
        }
    }

    /// Returns a grid using `config`'s cell size and reference
    /// latitude, the equator if it has none.
    pub fn from_config(config: &ViewshedConfig) -> Self {
        Self::new(config.grid_cell_size_m)
            .with_reference_lat(config.grid_reference_lat_deg.unwrap_or(0.0))
    }

    /// Like [`CoverageGrid::from_config`], falling back to `origin`'s
    /// latitude.
    pub fn around(config: &ViewshedConfig, origin: Coordinate) -> Self {
        Self::new(config.grid_cell_size_m)
            .with_reference_lat(config.grid_reference_lat_deg.unwrap_or(origin.lat))
    }

    #[must_use]
    pub fn with_reference_lat(self, reference_lat_deg: f64) -> Self {
        Self {
            reference_lat_deg,
            ..self
        }
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    pub fn reference_lat_deg(&self) -> f64 {
        self.reference_lat_deg
    }

    /// Returns the cell containing `coord`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn cell(&self, coord: Coordinate) -> GridCell {
        let (x_m, y_m) = self.project(coord);
        GridCell {
            x: (x_m / self.cell_size_m).floor() as i64,
            y: (y_m / self.cell_size_m).floor() as i64,
        }
    }

    /// Returns the cells containing every visible point of `result`.
    pub fn to_grid(&self, result: &ViewshedResult) -> CellSet {
        result
            .visible_points
            .iter()
            .map(|point| self.cell(point.coordinate))
            .collect()
    }

    /// Returns the outline of `cell` in geographic coordinates, `x`
    /// being longitude.
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_polygon(&self, GridCell { x, y }: GridCell) -> Polygon<f64> {
        let x0 = x as f64 * self.cell_size_m;
        let y0 = y as f64 * self.cell_size_m;
        let x1 = x0 + self.cell_size_m;
        let y1 = y0 + self.cell_size_m;
        let corner = |x_m, y_m| {
            let Coordinate { lat, lon } = self.unproject(x_m, y_m);
            (lon, lat)
        };
        let (sw, se, ne, nw) = (corner(x0, y0), corner(x1, y0), corner(x1, y1), corner(x0, y1));
        polygon![
            (x: sw.0, y: sw.1),
            (x: se.0, y: se.1),
            (x: ne.0, y: ne.1),
            (x: nw.0, y: nw.1)
        ]
    }

    /// Returns `cells` as a GeoJSON `FeatureCollection` of closed
    /// polygon rings in `[lon, lat]` order.
    pub fn to_geojson(&self, cells: &CellSet) -> String {
        let features = cells
            .iter()
            .map(|&cell| {
                let mut properties = JsonObject::new();
                properties.insert("gridX".to_owned(), JsonValue::from(cell.x));
                properties.insert("gridY".to_owned(), JsonValue::from(cell.y));
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::from(&self.cell_polygon(cell)))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
        .to_string()
    }

    fn meters_per_degree_lon(&self) -> f64 {
        METERS_PER_DEGREE * self.reference_lat_deg.to_radians().cos()
    }

    fn project(&self, Coordinate { lat, lon }: Coordinate) -> (f64, f64) {
        (lon * self.meters_per_degree_lon(), lat * METERS_PER_DEGREE)
    }

    fn unproject(&self, x_m: f64, y_m: f64) -> Coordinate {
        Coordinate {
            lat: y_m / METERS_PER_DEGREE,
            lon: x_m / self.meters_per_degree_lon(),
        }
    }
}

/// Returns the union of two cell sets.
pub fn merge(existing: &CellSet, incoming: &CellSet) -> CellSet {
    existing.union(incoming).copied().collect()
}

/// Cumulative coverage across many viewshed calculations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageArea {
    cells: CellSet,
    #[serde(flatten)]
    grid: CoverageGrid,
    updated_at: Option<SystemTime>,
}

impl CoverageArea {
    pub fn new(grid: CoverageGrid) -> Self {
        Self::from_cells(CellSet::new(), grid)
    }

    /// Restores an area from previously persisted cells of `grid`.
    pub fn from_cells(cells: impl IntoIterator<Item = GridCell>, grid: CoverageGrid) -> Self {
        Self {
            cells: cells.into_iter().collect(),
            grid,
            updated_at: None,
        }
    }

    pub fn grid(&self) -> CoverageGrid {
        self.grid
    }

    /// Adds `incoming` in place.
    pub fn merge(&mut self, incoming: &CellSet) {
        self.cells.extend(incoming.iter().copied());
        self.updated_at = Some(SystemTime::now());
    }

    /// Adds the cells covered by `result` in place.
    pub fn record(&mut self, result: &ViewshedResult) {
        let cells = self.grid().to_grid(result);
        self.merge(&cells);
    }

    /// Returns a copy of this area with `incoming` added.
    #[must_use]
    pub fn adding(&self, incoming: &CellSet) -> Self {
        let mut area = self.clone();
        area.merge(incoming);
        area
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.updated_at = Some(SystemTime::now());
    }

    pub fn cells(&self) -> &CellSet {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell_size_m(&self) -> f64 {
        self.grid.cell_size_m()
    }

    /// Returns the covered area in square meters.
    #[allow(clippy::cast_precision_loss)]
    pub fn total_area_m2(&self) -> f64 {
        let size = self.cell_size_m();
        self.cells.len() as f64 * size * size
    }

    pub fn updated_at(&self) -> Option<SystemTime> {
        self.updated_at
    }

    pub fn to_geojson(&self) -> String {
        self.grid().to_geojson(&self.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::{merge, CellSet, CoverageArea, CoverageGrid, GridCell};
    use crate::ViewshedConfig;
    use approx::assert_relative_eq;
    use geo::{Contains, Point};
    use geojson::{GeoJson, Value};
    use terrain::Coordinate;

    const OBSERVER: Coordinate = Coordinate::new(47.7126, -121.1477);

    fn cells(pairs: &[(i64, i64)]) -> CellSet {
        pairs.iter().map(|&(x, y)| GridCell { x, y }).collect()
    }

    #[test]
    fn test_projection_inverts() {
        for grid in [
            CoverageGrid::new(100.0),
            CoverageGrid::new(100.0).with_reference_lat(OBSERVER.lat),
        ] {
            let (x, y) = grid.project(OBSERVER);
            let back = grid.unproject(x, y);
            assert_relative_eq!(back.lat, OBSERVER.lat, epsilon = 1e-12);
            assert_relative_eq!(back.lon, OBSERVER.lon, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cells_are_square_near_reference() {
        let grid = CoverageGrid::new(100.0).with_reference_lat(OBSERVER.lat);
        let polygon = grid.cell_polygon(grid.cell(OBSERVER));
        let ring = &polygon.exterior().0;
        let (sw, se, ne, nw) = (ring[0], ring[1], ring[2], ring[3]);
        // Edges follow meridians and parallels.
        assert_eq!(sw.x, nw.x);
        assert_eq!(se.x, ne.x);
        assert_eq!(sw.y, se.y);
        assert_eq!(nw.y, ne.y);

        let corner = |c: geo::Coord<f64>| Coordinate::new(c.y, c.x);
        let width = corner(sw).distance_to(&corner(se));
        let height = corner(sw).distance_to(&corner(nw));
        assert!((width - height).abs() < 1.0, "{width} x {height}");
    }

    #[test]
    fn test_reference_latitude_from_config() {
        let config = ViewshedConfig::default();
        assert_eq!(CoverageGrid::from_config(&config).reference_lat_deg(), 0.0);
        assert_eq!(
            CoverageGrid::around(&config, OBSERVER).reference_lat_deg(),
            OBSERVER.lat
        );
        let pinned = config.grid_reference_lat_deg(Some(45.0));
        assert_eq!(CoverageGrid::from_config(&pinned).reference_lat_deg(), 45.0);
        assert_eq!(CoverageGrid::around(&pinned, OBSERVER).reference_lat_deg(), 45.0);
    }

    #[test]
    fn test_nearby_points_share_a_cell() {
        let grid = CoverageGrid::new(100.0);
        let cell = grid.cell(OBSERVER);
        assert_eq!(grid.cell(OBSERVER), cell);
        let far = OBSERVER.destination(0.0, 1_000.0, terrain::MEAN_EARTH_RADIUS_M);
        assert_ne!(grid.cell(far), cell);
    }

    #[test]
    fn test_cell_polygon_contains_its_points() {
        let grid = CoverageGrid::new(100.0).with_reference_lat(OBSERVER.lat);
        for bearing in [0.0, 45.0, 135.0, 225.0, 315.0] {
            let coord = OBSERVER.destination(bearing, 333.0, terrain::MEAN_EARTH_RADIUS_M);
            let polygon = grid.cell_polygon(grid.cell(coord));
            assert!(polygon.contains(&Point::from(coord)));
            assert!(polygon.exterior().is_closed());
            assert_eq!(polygon.exterior().0.len(), 5);
        }
    }

    #[test]
    fn test_merge_is_union() {
        let s = cells(&[(0, 0), (1, 0)]);
        let a = cells(&[(1, 0), (2, 2)]);
        let b = cells(&[(-5, 3)]);
        assert_eq!(merge(&s, &s), s);
        assert_eq!(merge(&s, &a), merge(&a, &s));
        assert_eq!(merge(&merge(&s, &a), &b), merge(&s, &merge(&a, &b)));
        assert_eq!(merge(&s, &a).len(), 3);
    }

    #[test]
    fn test_geojson_layout() {
        let grid = CoverageGrid::new(100.0);
        let cell = grid.cell(OBSERVER);
        let json = grid.to_geojson(&[cell].into_iter().collect());

        let GeoJson::FeatureCollection(collection) = json.parse::<GeoJson>().unwrap() else {
            panic!("not a feature collection: {json}");
        };
        assert_eq!(collection.features.len(), 1);
        let Some(Value::Polygon(rings)) = collection.features[0].geometry.as_ref().map(|g| &g.value)
        else {
            panic!("not a polygon: {json}");
        };
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        // [lon, lat]
        for position in ring {
            assert!((position[0] - OBSERVER.lon).abs() < 0.01);
            assert!((position[1] - OBSERVER.lat).abs() < 0.01);
        }

        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(raw["type"], "FeatureCollection");
        assert_eq!(raw["features"][0]["geometry"]["type"], "Polygon");
        assert!(raw["features"][0]["geometry"]["coordinates"].is_array());
    }

    #[test]
    fn test_empty_geojson() {
        let json = CoverageGrid::new(100.0).to_geojson(&CellSet::new());
        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(raw["type"], "FeatureCollection");
        assert_eq!(raw["features"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_coverage_area() {
        let mut area = CoverageArea::new(CoverageGrid::new(100.0));
        assert!(area.is_empty());
        assert_eq!(area.updated_at(), None);

        area.merge(&cells(&[(0, 0), (0, 1)]));
        area.merge(&cells(&[(0, 1)]));
        assert_eq!(area.len(), 2);
        assert_relative_eq!(area.total_area_m2(), 20_000.0);
        assert!(area.updated_at().is_some());

        let bigger = area.adding(&cells(&[(9, 9)]));
        assert_eq!(area.len(), 2);
        assert_eq!(bigger.len(), 3);

        let restored = CoverageArea::from_cells(bigger.cells().iter().copied(), bigger.grid());
        assert_eq!(restored.cells(), bigger.cells());
        assert_eq!(restored.cell_size_m(), 100.0);

        area.clear();
        assert!(area.is_empty());
    }

    #[test]
    fn test_coverage_area_persists() {
        let grid = CoverageGrid::new(50.0).with_reference_lat(OBSERVER.lat);
        let area = CoverageArea::new(grid).adding(&cells(&[(3, -4), (5, 6)]));
        let json = serde_json::to_string(&area).unwrap();
        let loaded: CoverageArea = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, area);
        assert_eq!(loaded.grid(), grid);
    }
}
