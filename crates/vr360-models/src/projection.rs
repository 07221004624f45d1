//! Spherical projection definitions.
//!
//! A projection describes how the sphere of view directions is laid out on
//! the rectangular video frame:
//!
//! - `Equirectangular`: longitude on x, latitude on y (2:1 frames)
//! - `Cubemap` / `Eac`: six cube faces packed in a grid
//! - `Fisheye` / `DualFisheye`: raw lens images
//! - `Stereographic`: the "little planet" disk
//! - `Flat`: an ordinary perspective video (a viewport)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Face arrangement of a packed cubemap frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
pub enum CubemapLayout {
    /// Three faces per row, two rows.
    #[default]
    #[serde(rename = "3x2")]
    ThreeByTwo,
    /// All six faces in one row.
    #[serde(rename = "6x1")]
    SixByOne,
    /// All six faces in one column.
    #[serde(rename = "1x6")]
    OneBySix,
    /// Two faces per row, three rows.
    #[serde(rename = "2x3")]
    TwoByThree,
}

impl CubemapLayout {
    /// All cubemap layouts.
    pub const ALL: &'static [CubemapLayout] = &[
        CubemapLayout::ThreeByTwo,
        CubemapLayout::SixByOne,
        CubemapLayout::OneBySix,
        CubemapLayout::TwoByThree,
    ];

    /// Returns the layout name (e.g. "3x2").
    pub fn as_str(&self) -> &'static str {
        match self {
            CubemapLayout::ThreeByTwo => "3x2",
            CubemapLayout::SixByOne => "6x1",
            CubemapLayout::OneBySix => "1x6",
            CubemapLayout::TwoByThree => "2x3",
        }
    }

    /// Grid shape as (columns, rows) of faces.
    pub fn grid(&self) -> (u32, u32) {
        match self {
            CubemapLayout::ThreeByTwo => (3, 2),
            CubemapLayout::SixByOne => (6, 1),
            CubemapLayout::OneBySix => (1, 6),
            CubemapLayout::TwoByThree => (2, 3),
        }
    }
}

impl fmt::Display for CubemapLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CubemapLayout {
    type Err = ProjectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "3x2" | "c3x2" => Ok(CubemapLayout::ThreeByTwo),
            "6x1" | "c6x1" => Ok(CubemapLayout::SixByOne),
            "1x6" | "c1x6" => Ok(CubemapLayout::OneBySix),
            "2x3" | "c2x3" => Ok(CubemapLayout::TwoByThree),
            _ => Err(ProjectionParseError(s.to_string())),
        }
    }
}

/// Spherical projection of a video frame.
///
/// Serialized as a plain string (`"equirectangular"`, `"cubemap_3x2"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum ProjectionType {
    /// Full sphere, longitude/latitude grid.
    #[default]
    Equirectangular,
    /// Front hemisphere only (VR180).
    HalfEquirectangular,
    /// Six cube faces in the given layout.
    Cubemap { layout: CubemapLayout },
    /// Equi-angular cubemap.
    Eac,
    /// Single circular fisheye image.
    Fisheye,
    /// Two back-to-back fisheye images.
    DualFisheye,
    /// Cylindrical panorama.
    Cylindrical,
    /// "Little planet" disk.
    Stereographic,
    /// Pannini panorama.
    Pannini,
    /// Mercator.
    Mercator,
    /// Ordinary perspective video.
    Flat,
    /// Could not be determined.
    Unknown,
}

impl ProjectionType {
    /// Every projection, cubemap in its default layout.
    pub const ALL: &'static [ProjectionType] = &[
        ProjectionType::Equirectangular,
        ProjectionType::HalfEquirectangular,
        ProjectionType::Cubemap {
            layout: CubemapLayout::ThreeByTwo,
        },
        ProjectionType::Eac,
        ProjectionType::Fisheye,
        ProjectionType::DualFisheye,
        ProjectionType::Cylindrical,
        ProjectionType::Stereographic,
        ProjectionType::Pannini,
        ProjectionType::Mercator,
        ProjectionType::Flat,
        ProjectionType::Unknown,
    ];

    /// Cubemap in the default 3x2 layout.
    pub const fn cubemap() -> Self {
        ProjectionType::Cubemap {
            layout: CubemapLayout::ThreeByTwo,
        }
    }

    /// Returns the projection family name, without layout.
    pub fn family(&self) -> &'static str {
        match self {
            ProjectionType::Equirectangular => "equirectangular",
            ProjectionType::HalfEquirectangular => "half_equirectangular",
            ProjectionType::Cubemap { .. } => "cubemap",
            ProjectionType::Eac => "eac",
            ProjectionType::Fisheye => "fisheye",
            ProjectionType::DualFisheye => "dual_fisheye",
            ProjectionType::Cylindrical => "cylindrical",
            ProjectionType::Stereographic => "stereographic",
            ProjectionType::Pannini => "pannini",
            ProjectionType::Mercator => "mercator",
            ProjectionType::Flat => "flat",
            ProjectionType::Unknown => "unknown",
        }
    }

    /// Returns true for projections that cover (part of) the sphere.
    pub fn is_spherical(&self) -> bool {
        !matches!(self, ProjectionType::Flat | ProjectionType::Unknown)
    }

    /// Cubemap layout, if this is a cubemap.
    pub fn cubemap_layout(&self) -> Option<CubemapLayout> {
        match self {
            ProjectionType::Cubemap { layout } => Some(*layout),
            _ => None,
        }
    }

    /// Natural (horizontal, vertical) field of view in degrees.
    pub fn default_fov(&self) -> (f64, f64) {
        match self {
            ProjectionType::Equirectangular
            | ProjectionType::Cubemap { .. }
            | ProjectionType::Eac
            | ProjectionType::DualFisheye
            | ProjectionType::Stereographic
            | ProjectionType::Mercator
            | ProjectionType::Unknown => (360.0, 180.0),
            ProjectionType::HalfEquirectangular | ProjectionType::Fisheye => (180.0, 180.0),
            ProjectionType::Cylindrical => (360.0, 120.0),
            ProjectionType::Pannini => (120.0, 90.0),
            ProjectionType::Flat => (90.0, 60.0),
        }
    }
}

impl fmt::Display for ProjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionType::Cubemap { layout } => write!(f, "cubemap_{}", layout),
            other => write!(f, "{}", other.family()),
        }
    }
}

impl FromStr for ProjectionType {
    type Err = ProjectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase().replace('-', "_");

        if let Some(layout) = lower.strip_prefix("cubemap_") {
            return layout
                .parse()
                .map(|layout| ProjectionType::Cubemap { layout })
                .map_err(|_| ProjectionParseError(s.to_string()));
        }

        match lower.as_str() {
            "equirectangular" | "equirect" | "erp" | "e" => Ok(ProjectionType::Equirectangular),
            "half_equirectangular" | "hequirect" | "vr180" => Ok(ProjectionType::HalfEquirectangular),
            "cubemap" | "cube" => Ok(ProjectionType::cubemap()),
            "eac" | "equi_angular_cubemap" => Ok(ProjectionType::Eac),
            "fisheye" => Ok(ProjectionType::Fisheye),
            "dual_fisheye" | "dfisheye" => Ok(ProjectionType::DualFisheye),
            "cylindrical" => Ok(ProjectionType::Cylindrical),
            "stereographic" | "little_planet" | "sg" => Ok(ProjectionType::Stereographic),
            "pannini" => Ok(ProjectionType::Pannini),
            "mercator" => Ok(ProjectionType::Mercator),
            "flat" | "rectilinear" => Ok(ProjectionType::Flat),
            "unknown" => Ok(ProjectionType::Unknown),
            _ => Err(ProjectionParseError(s.to_string())),
        }
    }
}

impl From<ProjectionType> for String {
    fn from(projection: ProjectionType) -> Self {
        projection.to_string()
    }
}

impl TryFrom<String> for ProjectionType {
    type Error = ProjectionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl JsonSchema for ProjectionType {
    fn schema_name() -> String {
        "ProjectionType".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

#[derive(Debug, Error)]
#[error("Unknown projection: {0}")]
pub struct ProjectionParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_parse() {
        assert_eq!(
            "equirectangular".parse::<ProjectionType>().unwrap(),
            ProjectionType::Equirectangular
        );
        assert_eq!("vr180".parse::<ProjectionType>().unwrap(), ProjectionType::HalfEquirectangular);
        assert_eq!("cubemap".parse::<ProjectionType>().unwrap(), ProjectionType::cubemap());
        assert_eq!(
            "cubemap_6x1".parse::<ProjectionType>().unwrap(),
            ProjectionType::Cubemap {
                layout: CubemapLayout::SixByOne
            }
        );
        assert_eq!("little-planet".parse::<ProjectionType>().unwrap(), ProjectionType::Stereographic);
        assert!("cubemap_4x4".parse::<ProjectionType>().is_err());
        assert!("toroidal".parse::<ProjectionType>().is_err());
    }

    #[test]
    fn test_projection_display_round_trips_through_serde() {
        let projection = ProjectionType::Cubemap {
            layout: CubemapLayout::TwoByThree,
        };
        let json = serde_json::to_string(&projection).unwrap();
        assert_eq!(json, "\"cubemap_2x3\"");
        assert_eq!(serde_json::from_str::<ProjectionType>(&json).unwrap(), projection);
    }

    #[test]
    fn test_spherical_flags() {
        assert!(ProjectionType::Equirectangular.is_spherical());
        assert!(ProjectionType::Eac.is_spherical());
        assert!(!ProjectionType::Flat.is_spherical());
        assert!(!ProjectionType::Unknown.is_spherical());
    }

    #[test]
    fn test_default_fov_within_sphere() {
        for projection in ProjectionType::ALL {
            let (h, v) = projection.default_fov();
            assert!(h > 0.0 && h <= 360.0, "{}", projection);
            assert!(v > 0.0 && v <= 180.0, "{}", projection);
        }
    }

    #[test]
    fn test_cubemap_layout_grid() {
        assert_eq!(CubemapLayout::ThreeByTwo.grid(), (3, 2));
        assert_eq!(CubemapLayout::OneBySix.grid(), (1, 6));
        assert_eq!("c6x1".parse::<CubemapLayout>().unwrap(), CubemapLayout::SixByOne);
    }
}
