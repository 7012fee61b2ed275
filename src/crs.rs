//! CRS identifiers and transform directives.
//!
//! Identifiers are accepted as OGC http URIs
//! (`http://www.opengis.net/def/crs/EPSG/0/4326`), URNs
//! (`urn:ogc:def:crs:EPSG::4326`) or `AUTH:CODE` strings.

use std::fmt;

use proj4rs::proj::Proj;
use serde::Deserialize;

use crate::error::{FeatureError, Result};

pub const CRS84_URI: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

/// Authority-qualified CRS identifier such as `EPSG:4326` or `OGC:CRS84`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CrsId {
    authority: String,
    code: String,
}

impl CrsId {
    pub fn new(authority: &str, code: &str) -> Self {
        Self {
            authority: authority.to_ascii_uppercase(),
            code: code.to_ascii_uppercase(),
        }
    }

    pub fn crs84() -> Self {
        Self::new("OGC", "CRS84")
    }

    pub fn epsg(code: u32) -> Self {
        Self::new("EPSG", &code.to_string())
    }

    /// Parse a URI, URN or `AUTH:CODE` identifier.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || FeatureError::InvalidCrs(uri.to_string());
        let s = uri.trim();

        if let Some(rest) = s
            .strip_prefix("http://www.opengis.net/def/crs/")
            .or_else(|| s.strip_prefix("https://www.opengis.net/def/crs/"))
        {
            // {authority}/{version}/{code}
            let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
            return match parts.as_slice() {
                [authority, _version, code] if !authority.is_empty() && !code.is_empty() => {
                    Ok(Self::new(authority, code))
                }
                _ => Err(invalid()),
            };
        }

        let lower = s.to_ascii_lowercase();
        if lower.starts_with("urn:ogc:def:crs:") {
            // urn:ogc:def:crs:{authority}:{version}:{code}, version may be empty
            let parts: Vec<&str> = s.split(':').collect();
            return match parts.as_slice() {
                [_, _, _, _, authority, .., code] if parts.len() >= 6 && !code.is_empty() => {
                    Ok(Self::new(authority, code))
                }
                _ => Err(invalid()),
            };
        }

        match s.split_once(':') {
            Some((authority, code)) if !authority.is_empty() && !code.is_empty() => {
                Ok(Self::new(authority, code))
            }
            None if s.eq_ignore_ascii_case("CRS84") => Ok(Self::crs84()),
            _ => Err(invalid()),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_crs84(&self) -> bool {
        self.authority == "OGC" && self.code == "CRS84"
    }

    /// EPSG:4326 declares latitude before longitude, unlike its CRS84 twin.
    pub fn swaps_axes(&self) -> bool {
        self.authority == "EPSG" && self.code == "4326"
    }

    pub fn is_geographic(&self) -> bool {
        (self.authority == "OGC" && (self.code == "CRS84" || self.code == "CRS84H"))
            || self.swaps_axes()
    }

    pub fn epsg_code(&self) -> Option<u32> {
        if self.authority == "EPSG" {
            self.code.parse().ok()
        } else {
            None
        }
    }

    /// The legacy GeoJSON `crs` member, or `None` for the GeoJSON default.
    pub fn geojson_crs_member(&self) -> Option<serde_json::Value> {
        if self.is_crs84() {
            return None;
        }
        let code = self.epsg_code().unwrap_or(4326);
        Some(serde_json::json!({
            "type": "name",
            "properties": {
                "name": format!("urn:ogc:def:crs:EPSG::{code}"),
            },
        }))
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

/// Request-level directive to reproject from the storage CRS.
///
/// Both definitions are PROJ.4 strings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CrsTransformSpec {
    pub source_crs: String,
    pub target_crs: String,
    pub target_crs_uri: String,
}

/// A compiled transform directive, built once per request.
pub struct CrsTransform {
    source: Proj,
    target: Proj,
    target_crs: CrsId,
}

impl fmt::Debug for CrsTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrsTransform")
            .field("target_crs", &self.target_crs)
            .field("source_latlong", &self.source.is_latlong())
            .field("target_latlong", &self.target.is_latlong())
            .finish()
    }
}

impl CrsTransform {
    pub fn from_spec(spec: &CrsTransformSpec) -> Result<Self> {
        let source = Proj::from_proj_string(&spec.source_crs)?;
        let target = Proj::from_proj_string(&spec.target_crs)?;
        let target_crs = CrsId::parse(&spec.target_crs_uri)?;
        Ok(Self {
            source,
            target,
            target_crs,
        })
    }

    pub fn target_crs(&self) -> &CrsId {
        &self.target_crs
    }

    pub fn target_is_latlong(&self) -> bool {
        self.target.is_latlong()
    }

    /// Transform one coordinate. Geographic ordinates are in degrees on both ends.
    pub fn apply(&self, x: f64, y: f64, z: f64) -> Result<(f64, f64, f64)> {
        let mut point = if self.source.is_latlong() {
            (x.to_radians(), y.to_radians(), z)
        } else {
            (x, y, z)
        };
        proj4rs::transform::transform(&self.source, &self.target, &mut point)?;
        if self.target.is_latlong() {
            point.0 = point.0.to_degrees();
            point.1 = point.1.to_degrees();
        }
        if !(point.0.is_finite() && point.1.is_finite()) {
            return Err(FeatureError::InvalidGeometry(format!(
                "coordinate ({x}, {y}) has no finite image in {}",
                self.target_crs
            )));
        }
        Ok(point)
    }
}
