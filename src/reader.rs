//! Parsers for the whitespace-separated text formats the reference data and
//! evaluation tooling use.
//!
//! Every `read_*` function loads a file and defers to a `parse_*` function that
//! works on text, so formats can be tested without touching the filesystem.
//! Blank lines are ignored everywhere.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::engine::ConfigError;
use crate::image_impl::{Point, Point2d, Point2i};
use crate::marker::{BoundingBox, NormalizedMarker};
use crate::types::DataFileConfig;
use crate::window::{Window, WindowStructure};

fn read_text(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
}

fn parse_field<T: FromStr>(
    token: Option<&str>,
    what: &str,
    path: &Path,
    line: usize,
) -> Result<T, ConfigError> {
    let token = token.ok_or_else(|| ConfigError::parse(path, line, format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| ConfigError::parse(path, line, format!("invalid {} `{}`", what, token)))
}

/// An unsigned integer is taken as the identity, anything else is looked up
/// in the names list (the line number there is the identity).
pub fn resolve_id(token: &str, names: &[String], path: &Path) -> Result<u32, ConfigError> {
    if let Ok(id) = token.parse::<u32>() {
        return Ok(id);
    }
    names
        .iter()
        .position(|n| n == token)
        .map(|i| i as u32)
        .ok_or_else(|| ConfigError::UnknownName {
            path: path.to_path_buf(),
            name: token.to_string(),
        })
}

pub fn parse_data_file(text: &str, path: &Path) -> Result<DataFileConfig, ConfigError> {
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut window_names = None;
    let mut marker_names = None;
    let mut building_info_dir = None;

    for (line, content) in numbered_lines(text) {
        let mut tokens = content.split_whitespace();
        let key = tokens.next().unwrap_or_default();
        if tokens.next() != Some("=") {
            return Err(ConfigError::parse(path, line, "wrong format of data file, expected `key = value`"));
        }
        let value: PathBuf = match tokens.next() {
            Some(v) => base.join(v.trim_end_matches('/')),
            None => return Err(ConfigError::parse(path, line, format!("no value for `{}`", key))),
        };

        match key {
            "windowNames" => window_names = Some(value),
            "markerNames" => marker_names = Some(value),
            "buildingInfoDir" => building_info_dir = Some(value),
            _ => {
                return Err(ConfigError::UnknownKey {
                    path: path.to_path_buf(),
                    key: key.to_string(),
                })
            }
        }
    }

    Ok(DataFileConfig {
        window_names: window_names.ok_or(ConfigError::MissingKey(path.to_path_buf(), "windowNames"))?,
        marker_names: marker_names.ok_or(ConfigError::MissingKey(path.to_path_buf(), "markerNames"))?,
        building_info_dir: building_info_dir
            .ok_or(ConfigError::MissingKey(path.to_path_buf(), "buildingInfoDir"))?,
    })
}

pub fn read_data_file(path: &Path) -> Result<DataFileConfig, ConfigError> {
    parse_data_file(&read_text(path)?, path)
}

/// One name per line; unlike the other formats, blank lines keep their slot.
pub fn read_names(path: &Path) -> Result<Vec<String>, ConfigError> {
    Ok(read_text(path)?.lines().map(|l| l.trim().to_string()).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRecord {
    pub name: String,
    pub marker_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildingRecord {
    pub name: String,
    pub surfaces: Vec<SurfaceRecord>,
}

/// Split `<count> <name with spaces>` into its two parts.
fn count_and_name(content: &str, path: &Path, line: usize) -> Result<(usize, String), ConfigError> {
    let (count, rest) = content
        .split_once(char::is_whitespace)
        .unwrap_or((content, ""));
    let count = parse_field(Some(count), "count", path, line)?;
    let name = rest.trim();
    if name.is_empty() {
        return Err(ConfigError::parse(path, line, "missing name"));
    }
    Ok((count, name.to_string()))
}

pub fn parse_topology(text: &str, path: &Path) -> Result<Vec<BuildingRecord>, ConfigError> {
    let mut lines = numbered_lines(text);
    let mut buildings = Vec::new();

    while let Some((line, content)) = lines.next() {
        let (surface_count, name) = count_and_name(content, path, line)?;
        let mut surfaces = Vec::with_capacity(surface_count);

        for _ in 0..surface_count {
            let (line, content) = lines
                .next()
                .ok_or_else(|| ConfigError::parse(path, line, format!("building `{}` is missing surfaces", name)))?;
            let (marker_count, surface_name) = count_and_name(content, path, line)?;

            let (ids_line, ids) = lines.next().ok_or_else(|| {
                ConfigError::parse(path, line, format!("surface `{}` is missing its marker list", surface_name))
            })?;
            let marker_ids = ids
                .split_whitespace()
                .map(|t| parse_field::<u32>(Some(t), "marker identity", path, ids_line))
                .collect::<Result<Vec<_>, _>>()?;
            if marker_ids.len() != marker_count {
                return Err(ConfigError::parse(
                    path,
                    ids_line,
                    format!("expected {} marker identities, found {}", marker_count, marker_ids.len()),
                ));
            }

            surfaces.push(SurfaceRecord {
                name: surface_name,
                marker_ids,
            });
        }

        buildings.push(BuildingRecord { name, surfaces });
    }

    if buildings.is_empty() {
        return Err(ConfigError::Empty(path.to_path_buf()));
    }
    Ok(buildings)
}

pub fn read_topology(path: &Path) -> Result<Vec<BuildingRecord>, ConfigError> {
    parse_topology(&read_text(path)?, path)
}

pub fn parse_markers(text: &str, path: &Path, names: &[String]) -> Result<Vec<NormalizedMarker>, ConfigError> {
    numbered_lines(text)
        .map(|(line, content)| {
            let mut tokens = content.split_whitespace();
            let token = tokens.next().unwrap_or_default();
            let id = resolve_id(token, names, path)?;
            let x = parse_field::<f64>(tokens.next(), "x", path, line)?;
            let y = parse_field::<f64>(tokens.next(), "y", path, line)?;
            Ok(NormalizedMarker::reference(id, Point2d::new(x, y)))
        })
        .collect()
}

pub fn read_markers(path: &Path, names: &[String]) -> Result<Vec<NormalizedMarker>, ConfigError> {
    parse_markers(&read_text(path)?, path, names)
}

fn parse_quad<T: FromStr + Copy + Default>(
    content: &str,
    path: &Path,
    line: usize,
    names: &[String],
) -> Result<Window<T>, ConfigError> {
    let mut tokens = content.split_whitespace();
    let token = tokens.next().unwrap_or_default();
    let id = resolve_id(token, names, path)?;
    let mut vertices = [Point::<T>::default(); 4];
    for (i, v) in vertices.iter_mut().enumerate() {
        v.x = parse_field(tokens.next(), &format!("x{}", i + 1), path, line)?;
        v.y = parse_field(tokens.next(), &format!("y{}", i + 1), path, line)?;
    }
    Ok(Window::new(id, vertices))
}

pub fn parse_windows(text: &str, path: &Path, names: &[String]) -> Result<Vec<Window<f64>>, ConfigError> {
    numbered_lines(text)
        .map(|(line, content)| parse_quad::<f64>(content, path, line, names))
        .collect()
}

pub fn read_windows(path: &Path, names: &[String]) -> Result<Vec<Window<f64>>, ConfigError> {
    parse_windows(&read_text(path)?, path, names)
}

/// Ground-truth quadrangles in absolute pixels. Fractional coordinates are
/// truncated.
pub fn parse_ground_truth(text: &str, path: &Path, names: &[String]) -> Result<WindowStructure, ConfigError> {
    let mut ws = WindowStructure::new();
    for (line, content) in numbered_lines(text) {
        let quad = parse_quad::<f64>(content, path, line, names)?;
        ws.push_window(Window::new(
            quad.id,
            quad.vertices.map(|v| Point2i::new(v.x as i32, v.y as i32)),
        ));
    }
    Ok(ws)
}

pub fn read_ground_truth(path: &Path, names: &[String]) -> Result<WindowStructure, ConfigError> {
    parse_ground_truth(&read_text(path)?, path, names)
}

pub fn parse_detections(text: &str, path: &Path) -> Result<Vec<BoundingBox>, ConfigError> {
    numbered_lines(text)
        .map(|(line, content)| {
            let mut t = content.split_whitespace();
            let b = BoundingBox::new(
                parse_field(t.next(), "class id", path, line)?,
                parse_field(t.next(), "confidence", path, line)?,
                parse_field(t.next(), "x", path, line)?,
                parse_field(t.next(), "y", path, line)?,
                parse_field(t.next(), "w", path, line)?,
                parse_field(t.next(), "h", path, line)?,
            );
            // pixel coordinates must stay representable as i32 corners
            let limit = i32::MAX as u64;
            if b.x as u64 + b.w as u64 > limit || b.y as u64 + b.h as u64 > limit {
                return Err(ConfigError::parse(
                    path,
                    line,
                    format!("box {} {} {} {} out of range", b.x, b.y, b.w, b.h),
                ));
            }
            Ok(b)
        })
        .collect()
}

pub fn read_detections(path: &Path) -> Result<Vec<BoundingBox>, ConfigError> {
    parse_detections(&read_text(path)?, path)
}
