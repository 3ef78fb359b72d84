use geojson::{Feature, GeoJson, Value};
use serde_json::Value as JsonValue;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::map::geometry::{point_in_polygon, Ring};

/// Natural Earth 110m admin-0 countries, the dataset the dashboard was designed around
pub const DEFAULT_BOUNDARY_URL: &str = "https://raw.githubusercontent.com/vasturiano/react-globe.gl/master/example/datasets/ne_110m_admin_0_countries.geojson";

/// Label used when a feature carries no usable name
pub const UNKNOWN_REGION: &str = "Unknown Region";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to fetch boundary dataset: {0}")]
    Http(#[from] reqwest::Error),
    #[error("boundary dataset is not valid JSON: {0}")]
    Json(#[from] simd_json::Error),
    #[error("boundary dataset is not valid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("boundary dataset is not a feature collection")]
    NotFeatureCollection,
}

/// Where the boundary polygons come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundarySource {
    Path(PathBuf),
    Url(String),
}

impl BoundarySource {
    /// Anything starting with `http://` or `https://` is fetched, everything else is a file path
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }
}

impl Default for BoundarySource {
    fn default() -> Self {
        Self::Url(DEFAULT_BOUNDARY_URL.to_string())
    }
}

impl fmt::Display for BoundarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// One clickable country polygon set from the boundary dataset
#[derive(Debug, Clone)]
pub struct Region {
    /// ISO3 join key into the economic table
    pub iso_code: String,
    pub display_name: String,
    pub centroid_lat: f64,
    pub centroid_lng: f64,
    /// Polygons, each an exterior ring followed by its holes
    pub polygons: Vec<Vec<Ring>>,
    /// (min_lon, min_lat, max_lon, max_lat)
    pub bbox: (f64, f64, f64, f64),
}

impl Region {
    /// Even-odd containment test against every polygon
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let (min_lon, min_lat, max_lon, max_lat) = self.bbox;
        if lon < min_lon || lon > max_lon || lat < min_lat || lat > max_lat {
            return false;
        }
        self.polygons.iter().any(|rings| point_in_polygon(rings, lon, lat))
    }

    /// Iterate over every ring (exteriors and holes)
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        self.polygons.iter().flatten()
    }
}

/// Load the boundary dataset. Any failure degrades to an empty region set.
pub async fn load_regions(source: &BoundarySource, timeout: Duration) -> Vec<Region> {
    match try_load_regions(source, timeout).await {
        Ok(regions) => {
            info!(count = regions.len(), %source, "loaded boundary dataset");
            regions
        }
        Err(e) => {
            warn!(%source, error = %e, "failed to load boundary dataset, rendering without overlays");
            Vec::new()
        }
    }
}

async fn try_load_regions(
    source: &BoundarySource,
    timeout: Duration,
) -> Result<Vec<Region>, DatasetError> {
    let mut bytes = match source {
        BoundarySource::Path(path) => fs::read(path).map_err(|source| DatasetError::Io {
            path: path.clone(),
            source,
        })?,
        BoundarySource::Url(url) => {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec()
        }
    };
    parse_regions(&mut bytes)
}

/// Parse a GeoJSON feature collection into regions. The buffer is used as
/// scratch space by the JSON parser.
pub fn parse_regions(bytes: &mut [u8]) -> Result<Vec<Region>, DatasetError> {
    let value: JsonValue = simd_json::serde::from_slice(bytes)?;
    let GeoJson::FeatureCollection(fc) = GeoJson::from_json_value(value)? else {
        return Err(DatasetError::NotFeatureCollection);
    };

    let regions: Vec<Region> = fc.features.iter().filter_map(region_from_feature).collect();
    debug!(
        features = fc.features.len(),
        regions = regions.len(),
        "parsed boundary features"
    );
    Ok(regions)
}

fn str_property<'a>(feature: &'a Feature, key: &str) -> Option<&'a str> {
    feature
        .property(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn f64_property(feature: &Feature, key: &str) -> Option<f64> {
    feature.property(key).and_then(JsonValue::as_f64)
}

/// Natural Earth marks a few countries (France, Norway) with ISO_A3 = "-99";
/// ADM0_A3 carries the usable code for those.
fn iso_code(feature: &Feature) -> String {
    str_property(feature, "ISO_A3")
        .filter(|code| *code != "-99")
        .or_else(|| str_property(feature, "ADM0_A3"))
        .unwrap_or_default()
        .to_string()
}

fn region_from_feature(feature: &Feature) -> Option<Region> {
    let geometry = feature.geometry.as_ref()?;
    let polygons: Vec<Vec<Ring>> = match &geometry.value {
        Value::Polygon(rings) => vec![convert_rings(rings)],
        Value::MultiPolygon(polygons) => polygons.iter().map(|rings| convert_rings(rings)).collect(),
        _ => return None,
    };
    let polygons: Vec<Vec<Ring>> = polygons.into_iter().filter(|p| !p.is_empty()).collect();
    if polygons.is_empty() {
        return None;
    }

    let bbox = bounding_box(&polygons);
    let display_name = str_property(feature, "NAME")
        .or_else(|| str_property(feature, "ADMIN"))
        .unwrap_or(UNKNOWN_REGION)
        .to_string();

    let (centroid_lat, centroid_lng) =
        match (f64_property(feature, "LABEL_Y"), f64_property(feature, "LABEL_X")) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => vertex_mean(&polygons),
        };

    Some(Region {
        iso_code: iso_code(feature),
        display_name,
        centroid_lat,
        centroid_lng,
        polygons,
        bbox,
    })
}

fn convert_rings(rings: &[Vec<Vec<f64>>]) -> Vec<Ring> {
    rings
        .iter()
        .map(|coords| {
            coords
                .iter()
                .filter(|c| c.len() >= 2)
                .map(|c| (c[0], c[1]))
                .collect::<Ring>()
        })
        .filter(|ring| ring.len() >= 3)
        .collect()
}

fn bounding_box(polygons: &[Vec<Ring>]) -> (f64, f64, f64, f64) {
    polygons.iter().flatten().flatten().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(min_lon, min_lat, max_lon, max_lat), &(lon, lat)| {
            (min_lon.min(lon), min_lat.min(lat), max_lon.max(lon), max_lat.max(lat))
        },
    )
}

/// Fallback label point: mean of the exterior ring vertices of the largest polygon
fn vertex_mean(polygons: &[Vec<Ring>]) -> (f64, f64) {
    let exterior = polygons
        .iter()
        .filter_map(|rings| rings.first())
        .max_by_key(|ring| ring.len());
    match exterior {
        Some(ring) if !ring.is_empty() => {
            let n = ring.len() as f64;
            let (sum_lon, sum_lat) = ring
                .iter()
                .fold((0.0, 0.0), |(a, b), &(lon, lat)| (a + lon, b + lat));
            (sum_lat / n, sum_lon / n)
        }
        _ => (0.0, 0.0),
    }
}
