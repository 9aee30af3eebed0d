//! Reference model of buildings, their surfaces and the markers and windows
//! painted on them.
//!
//! Buildings and surfaces live in flat arenas addressed by `BuildingId` /
//! `SurfaceId`. A dense identity→surface table answers "which surface owns
//! marker N" in O(1); it is rebuilt whenever a model is built.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::ConfigError;
use crate::marker::NormalizedMarker;
use crate::reader;
use crate::types::DataFileConfig;
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildingId(pub usize);

/// One planar face of a building.
#[derive(Debug, Clone)]
pub struct Surface {
    pub name: String,
    pub building: BuildingId,
    /// Identities listed for this surface in the topology file.
    pub marker_ids: Vec<u32>,
    /// Reference marker locations, normalized to `0..1`.
    pub markers: Vec<NormalizedMarker>,
    /// Reference windows, normalized to `0..1`.
    pub windows: Vec<Window<f64>>,
}

#[derive(Debug, Clone)]
pub struct Building {
    pub name: String,
    pub surfaces: Vec<SurfaceId>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildingModel {
    buildings: Vec<Building>,
    surfaces: Vec<Surface>,
    surface_by_marker: Vec<Option<SurfaceId>>,
    marker_names: Vec<String>,
    window_names: Vec<String>,
}

impl BuildingModel {
    pub fn builder() -> BuildingModelBuilder {
        BuildingModelBuilder::default()
    }

    /// Load names, topology and every surface's reference files.
    pub fn from_config(cfg: &DataFileConfig) -> Result<Self, ConfigError> {
        let marker_names = reader::read_names(&cfg.marker_names)?;
        let window_names = reader::read_names(&cfg.window_names)?;
        let topology = reader::read_topology(&cfg.building_info_path())?;

        let mut builder = BuildingModel::builder().names(marker_names.clone(), window_names.clone());
        for record in topology {
            let building = builder.add_building(&record.name);
            for surface in record.surfaces {
                let markers = reader::read_markers(&cfg.surface_file(&surface.name, "markers"), &marker_names)?;
                let windows = reader::read_windows(&cfg.surface_file(&surface.name, "windows"), &window_names)?;
                builder.add_surface(building, Surface {
                    name: surface.name,
                    building,
                    marker_ids: surface.marker_ids,
                    markers,
                    windows,
                })?;
            }
        }
        Ok(builder.build())
    }

    pub fn from_data_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_config(&reader::read_data_file(path)?)
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn building(&self, id: BuildingId) -> &Building {
        &self.buildings[id.0]
    }

    pub fn surface(&self, id: SurfaceId) -> &Surface {
        &self.surfaces[id.0]
    }

    /// Owning surface of a marker identity, if any.
    pub fn surface_of(&self, marker_id: u32) -> Option<SurfaceId> {
        self.surface_by_marker.get(marker_id as usize).copied().flatten()
    }

    pub fn marker_names(&self) -> &[String] {
        &self.marker_names
    }

    pub fn window_names(&self) -> &[String] {
        &self.window_names
    }

    pub fn window_name(&self, id: u32) -> Option<&str> {
        self.window_names.get(id as usize).map(String::as_str)
    }

    /// Human readable dump of buildings, surfaces and their marker identities.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for building in &self.buildings {
            let _ = writeln!(out, "building name: {}", building.name);
            for &sid in &building.surfaces {
                let surface = self.surface(sid);
                let ids: Vec<String> = surface.marker_ids.iter().map(u32::to_string).collect();
                let _ = writeln!(
                    out,
                    "\tsurface name: {} ({} markers, {} windows)",
                    surface.name,
                    surface.markers.len(),
                    surface.windows.len()
                );
                let _ = writeln!(out, "\t\tmarker ids: {}", ids.join(" "));
            }
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct BuildingModelBuilder {
    model: BuildingModel,
}

impl BuildingModelBuilder {
    pub fn names(mut self, marker_names: Vec<String>, window_names: Vec<String>) -> Self {
        self.model.marker_names = marker_names;
        self.model.window_names = window_names;
        self
    }

    pub fn add_building(&mut self, name: &str) -> BuildingId {
        let id = BuildingId(self.model.buildings.len());
        self.model.buildings.push(Building {
            name: name.to_string(),
            surfaces: Vec::new(),
        });
        id
    }

    /// Register `surface` under `building`.
    ///
    /// Every identity in `marker_ids` and in the reference markers is mapped
    /// to the new surface; an identity already owned by another surface is
    /// rejected.
    pub fn add_surface(&mut self, building: BuildingId, mut surface: Surface) -> Result<SurfaceId, ConfigError> {
        let sid = SurfaceId(self.model.surfaces.len());
        surface.building = building;

        let owner = &self.model.buildings[building.0];
        if owner.surfaces.iter().any(|&s| self.model.surfaces[s.0].name == surface.name) {
            return Err(ConfigError::DuplicateSurface {
                building: owner.name.clone(),
                surface: surface.name,
            });
        }

        let mut ids: Vec<u32> = surface
            .marker_ids
            .iter()
            .copied()
            .chain(surface.markers.iter().map(|m| m.id))
            .collect();
        ids.sort_unstable();
        ids.dedup();

        for &id in &ids {
            if let Some(owner) = self.model.surface_of(id) {
                return Err(ConfigError::DuplicateMarker {
                    id,
                    first: self.model.surface(owner).name.clone(),
                    second: surface.name,
                });
            }
        }
        for &id in &ids {
            let slot = id as usize;
            if slot >= self.model.surface_by_marker.len() {
                self.model.surface_by_marker.resize(slot + 1, None);
            }
            self.model.surface_by_marker[slot] = Some(sid);
        }

        self.model.surfaces.push(surface);
        self.model.buildings[building.0].surfaces.push(sid);
        Ok(sid)
    }

    pub fn build(self) -> BuildingModel {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_impl::{Point, Point2d};

    fn surface(name: &str, ids: &[u32]) -> Surface {
        Surface {
            name: name.to_string(),
            building: BuildingId(0),
            marker_ids: ids.to_vec(),
            markers: ids
                .iter()
                .map(|&id| NormalizedMarker::reference(id, Point2d::new(id as f64 / 10.0, 0.5)))
                .collect(),
            windows: Vec::new(),
        }
    }

    #[test]
    fn test_identity_index() {
        let mut b = BuildingModel::builder();
        let hall = b.add_building("Hall");
        let front = b.add_surface(hall, surface("Front", &[1, 2, 3])).unwrap();
        let side = b.add_surface(hall, surface("Side", &[9])).unwrap();
        let model = b.build();

        assert_eq!(model.surface_of(2), Some(front));
        assert_eq!(model.surface_of(9), Some(side));
        assert_eq!(model.surface_of(5), None);
        assert_eq!(model.surface_of(1000), None);
        assert_eq!(model.building(hall).surfaces, vec![front, side]);
        assert_eq!(model.surface(side).building, hall);
    }

    #[test]
    fn test_duplicate_marker_rejected() {
        let mut b = BuildingModel::builder();
        let hall = b.add_building("Hall");
        b.add_surface(hall, surface("Front", &[1, 2])).unwrap();
        let err = b.add_surface(hall, surface("Back", &[2, 3])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateMarker { id: 2, ref first, ref second } if first == "Front" && second == "Back"
        ));
    }

    #[test]
    fn test_duplicate_surface_name_rejected() {
        let mut b = BuildingModel::builder();
        let hall = b.add_building("Hall");
        let annex = b.add_building("Annex");
        b.add_surface(hall, surface("Front", &[1, 2])).unwrap();
        let err = b.add_surface(hall, surface("Front", &[3])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateSurface { ref building, ref surface } if building == "Hall" && surface == "Front"
        ));
        // the rejected surface left no trace in the identity index
        assert!(b.add_surface(annex, surface("Front", &[3])).is_ok());
    }

    #[test]
    fn test_duplicate_surface_in_topology() {
        let dir = std::env::temp_dir().join(format!("winlay_building_dup_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("obj.data"), "windowNames = w\nmarkerNames = m\nbuildingInfoDir = .\n").unwrap();
        std::fs::write(dir.join("w"), "").unwrap();
        std::fs::write(dir.join("m"), "").unwrap();
        std::fs::write(dir.join("building.info"), "2 Hall\n1 Front\n1\n1 Front\n2\n").unwrap();
        std::fs::write(dir.join("Front.markers"), "1 0.1 0.1\n").unwrap();
        std::fs::write(dir.join("Front.windows"), "").unwrap();

        let err = BuildingModel::from_data_file(&dir.join("obj.data")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSurface { .. }), "{}", err);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_describe_lists_surfaces() {
        let mut b = BuildingModel::builder();
        let lib = b.add_building("Library");
        b.add_surface(lib, surface("Main Entrance", &[4, 5])).unwrap();
        let text = b.build().describe();
        assert!(text.contains("building name: Library"));
        assert!(text.contains("surface name: Main Entrance"));
        assert!(text.contains("marker ids: 4 5"));
    }

    #[test]
    fn test_from_data_file() {
        let dir = std::env::temp_dir().join(format!("winlay_building_{}", std::process::id()));
        let info = dir.join("info");
        std::fs::create_dir_all(&info).unwrap();
        std::fs::write(dir.join("obj.data"), "windowNames = win.names\nmarkerNames = marker.names\nbuildingInfoDir = info/\n").unwrap();
        std::fs::write(dir.join("win.names"), "w0\nw1\n").unwrap();
        std::fs::write(dir.join("marker.names"), "m0\nm1\nm2\nm3\nm4\n").unwrap();
        std::fs::write(info.join("building.info"), "1 Hall\n4 Front Face\n1 2 3 4\n").unwrap();
        std::fs::write(info.join("Front_Face.markers"), "1 0.1 0.1\nm2 0.9 0.1\n3 0.9 0.9\n4 0.1 0.9\n").unwrap();
        std::fs::write(info.join("Front_Face.windows"), "w1 0.2 0.2 0.2 0.4 0.4 0.4 0.4 0.2\n").unwrap();

        let model = BuildingModel::from_data_file(&dir.join("obj.data")).unwrap();
        let sid = model.surface_of(3).unwrap();
        let s = model.surface(sid);
        assert_eq!(s.name, "Front Face");
        assert_eq!(s.markers[1].id, 2);
        assert_eq!(s.windows[0].id, 1);
        assert_eq!(s.windows[0].vertices[2], Point::new(0.4, 0.4));
        assert_eq!(model.window_name(1), Some("w1"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_surface_file_is_config_error() {
        let dir = std::env::temp_dir().join(format!("winlay_building_missing_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("obj.data"), "windowNames = w\nmarkerNames = m\nbuildingInfoDir = .\n").unwrap();
        std::fs::write(dir.join("w"), "").unwrap();
        std::fs::write(dir.join("m"), "").unwrap();
        std::fs::write(dir.join("building.info"), "1 Hall\n1 Roof\n7\n").unwrap();

        let err = BuildingModel::from_data_file(&dir.join("obj.data")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
