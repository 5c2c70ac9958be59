//! Route sources: pre-supplied waypoint sequences drivers follow.
//!
//! The source is stored as a `Box<dyn RouteSource>` ECS resource so tests and
//! the binary can swap file-backed routes for in-memory fixtures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use log::{debug, info, warn};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::geo::GeoPoint;

/// Control type stored on generated destination waypoints.
pub const DESTINATION_CONTROL: &str = "destination";

/// A fixed point on a route. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub street_name: String,
    pub speed_limit: u32,
    #[serde(rename = "has_traffic_light", default)]
    pub has_traffic_control: bool,
    #[serde(default = "default_traffic_control")]
    pub traffic_control: String,
}

fn default_traffic_control() -> String {
    "none".to_string()
}

impl Waypoint {
    pub fn new(point: GeoPoint, street_name: impl Into<String>, speed_limit: u32) -> Self {
        Self {
            latitude: point.lat,
            longitude: point.lon,
            street_name: street_name.into(),
            speed_limit,
            has_traffic_control: false,
            traffic_control: default_traffic_control(),
        }
    }

    pub fn with_control(mut self, control: impl Into<String>) -> Self {
        self.has_traffic_control = true;
        self.traffic_control = control.into();
        self
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Named, non-empty, shared waypoint sequence. Cloning is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    name: Arc<str>,
    description: Arc<str>,
    waypoints: Arc<[Waypoint]>,
}

impl Route {
    pub fn new(name: impl Into<String>, waypoints: Vec<Waypoint>) -> Result<Self, RouteError> {
        let name = name.into();
        if waypoints.is_empty() {
            return Err(RouteError::EmptyRoute(name));
        }
        Ok(Self {
            name: name.into(),
            description: Arc::from(""),
            waypoints: waypoints.into(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into().into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-text description from the route file; empty when absent.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false: construction rejects empty routes.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// Waypoint at `index`, clamped to the last waypoint.
    pub fn waypoint(&self, index: usize) -> &Waypoint {
        &self.waypoints[index.min(self.last_index())]
    }
}

/// On-disk route file layout.
#[derive(Debug, Deserialize)]
struct RouteFile {
    name: String,
    #[serde(default)]
    description: String,
    waypoints: Vec<Waypoint>,
}

/// Supplies routes to the behavior engine.
pub trait RouteSource: Send + Sync {
    /// Uniformly random route. Errors when nothing is loaded.
    fn random_route(&self, rng: &mut dyn RngCore) -> Result<Route, RouteError>;

    /// Route with the given name, else a random one.
    fn route_by_name(&self, name: &str, rng: &mut dyn RngCore) -> Result<Route, RouteError>;

    fn route_names(&self) -> Vec<String>;
}

/// ECS resource wrapping a boxed route source.
#[derive(Resource)]
pub struct RouteSourceResource(pub Box<dyn RouteSource>);

/// Routes held in memory, optionally loaded from a directory of JSON files.
#[derive(Debug, Clone, Default)]
pub struct FileRouteSource {
    routes: BTreeMap<String, Route>,
}

impl FileRouteSource {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut source = Self::default();
        for route in routes {
            source.insert(route);
        }
        source
    }

    pub fn insert(&mut self, route: Route) {
        self.routes.insert(route.name().to_string(), route);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Loads every `*.json` file in `dir` and in its `daily/` subdirectory.
    ///
    /// Unreadable or malformed files are logged and skipped. Fails only when the
    /// directory itself cannot be read or no route survives.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RouteError> {
        let dir = dir.as_ref();
        let mut source = Self::default();
        for path in json_files(dir)? {
            match load_route_file(&path) {
                Ok(route) => {
                    info!(
                        "loaded route `{}` ({} waypoints) from {}{}",
                        route.name(),
                        route.len(),
                        path.display(),
                        if route.description().is_empty() {
                            String::new()
                        } else {
                            format!(": {}", route.description())
                        }
                    );
                    source.insert(route);
                }
                Err(err) => warn!("skipping route file: {err}"),
            }
        }
        let daily = dir.join("daily");
        if daily.is_dir() {
            for path in json_files(&daily)? {
                match load_route_file(&path) {
                    Ok(route) => {
                        debug!("loaded daily route `{}` from {}", route.name(), path.display());
                        source.insert(route);
                    }
                    Err(err) => warn!("skipping daily route file: {err}"),
                }
            }
        }
        if source.is_empty() {
            return Err(RouteError::NoRoutes);
        }
        info!("loaded {} routes from {}", source.len(), dir.display());
        Ok(source)
    }

    /// Short built-in loop in lower Manhattan used when no route files exist.
    pub fn demo() -> Self {
        let points = [
            (40.7128, -74.0060, "Broadway", 25, Some("traffic_light")),
            (40.7142, -74.0046, "Broadway", 25, None),
            (40.7158, -74.0031, "Broadway", 30, Some("stop_sign")),
            (40.7170, -74.0015, "Canal Street", 30, None),
            (40.7161, -73.9998, "Canal Street", 30, Some("traffic_light")),
            (40.7145, -74.0012, "Lafayette Street", 25, None),
            (40.7131, -74.0040, "Chambers Street", 25, Some("yield")),
        ];
        let waypoints = points
            .iter()
            .map(|&(lat, lon, street, limit, control)| {
                let wp = Waypoint::new(GeoPoint::new(lat, lon), street, limit);
                match control {
                    Some(kind) => wp.with_control(kind),
                    None => wp,
                }
            })
            .collect();
        let mut source = Self::default();
        if let Ok(route) = Route::new("demo_lower_manhattan", waypoints) {
            source.insert(route);
        }
        source
    }
}

impl RouteSource for FileRouteSource {
    fn random_route(&self, rng: &mut dyn RngCore) -> Result<Route, RouteError> {
        if self.routes.is_empty() {
            return Err(RouteError::NoRoutes);
        }
        let index = rng.gen_range(0..self.routes.len());
        self.routes
            .values()
            .nth(index)
            .cloned()
            .ok_or(RouteError::NoRoutes)
    }

    fn route_by_name(&self, name: &str, rng: &mut dyn RngCore) -> Result<Route, RouteError> {
        match self.routes.get(name) {
            Some(route) => Ok(route.clone()),
            None => {
                warn!("route `{name}` not found, falling back to a random route");
                self.random_route(rng)
            }
        }
    }

    fn route_names(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, RouteError> {
    let entries = fs::read_dir(dir).map_err(|source| RouteError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn load_route_file(path: &Path) -> Result<Route, RouteError> {
    let raw = fs::read_to_string(path).map_err(|source| RouteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: RouteFile = serde_json::from_str(&raw).map_err(|source| RouteError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Route::new(file.name, file.waypoints)?.with_description(file.description))
}
