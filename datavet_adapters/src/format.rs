//! Input format detection.

use std::path::Path;

/// Supported source formats. Detection is by extension on the staged path,
/// after any archive wrapper has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Parquet,
    Geopackage,
    Shapefile,
}

impl InputFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(InputFormat::Csv),
            "parquet" => Some(InputFormat::Parquet),
            "gpkg" => Some(InputFormat::Geopackage),
            "shp" => Some(InputFormat::Shapefile),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Csv => "CSV",
            InputFormat::Parquet => "PARQUET",
            InputFormat::Geopackage => "GEOPACKAGE",
            InputFormat::Shapefile => "SHAPEFILE",
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "parquet" => Ok(InputFormat::Parquet),
            "geopackage" | "gpkg" => Ok(InputFormat::Geopackage),
            "shapefile" | "shp" => Ok(InputFormat::Shapefile),
            other => Err(format!(
                "unknown format '{other}' (expected csv, parquet, geopackage, or shapefile)"
            )),
        }
    }
}
