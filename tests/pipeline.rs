use std::path::{Path, PathBuf};

use nalgebra::Matrix3;
use winlay::geometry::scale_to_absolute;
use winlay::{
    imwrite, BoundingBox, ConfigError, Detector, EngineError, Frame, Homography, Mat, Point2d, Point2i,
    Window, WindowOverlay, WindowOverlayConfig, WindowStructure,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

const MARKERS: [(u32, f64, f64); 5] = [(1, 0.1, 0.1), (2, 0.9, 0.1), (3, 0.9, 0.9), (4, 0.1, 0.9), (5, 0.5, 0.5)];
const WINDOW: [(f64, f64); 4] = [(0.3, 0.3), (0.3, 0.6), (0.6, 0.6), (0.6, 0.3)];

fn camera() -> Homography {
    Homography::new(Matrix3::new(
        0.8, 0.05, 40.0,
        0.02, 0.85, 20.0,
        0.0001, 0.00005, 1.0,
    ))
}

/// Places each reference marker where the camera transform puts it.
struct ProjectedMarkers {
    h: Homography,
}

impl Detector for ProjectedMarkers {
    fn detect(&self, frame: &Frame, _thresh: f32) -> Result<Vec<BoundingBox>, EngineError> {
        let size = frame.size();
        Ok(MARKERS
            .iter()
            .map(|&(id, x, y)| {
                let p = scale_to_absolute(Point2d::new(x, y), size.width, size.height);
                let q = self.h.project(p.to_f64());
                BoundingBox::new(id, 0.9, q.x.round() as u32 - 1, q.y.round() as u32 - 1, 2, 2)
            })
            .collect())
    }
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("winlay_it_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("info")).unwrap();
    dir
}

fn write_model(dir: &Path) -> PathBuf {
    std::fs::write(dir.join("window.names"), "unused\nliving room\n").unwrap();
    std::fs::write(dir.join("marker.names"), "m0\nm1\nm2\nm3\nm4\nm5\n").unwrap();
    std::fs::write(
        dir.join("info/building.info"),
        "1 Cheonnong Hall\n5 Front Side\n1 2 3 4 5\n",
    )
    .unwrap();

    let markers: String = MARKERS.iter().map(|(id, x, y)| format!("{} {} {}\n", id, x, y)).collect();
    std::fs::write(dir.join("info/Front_Side.markers"), markers).unwrap();
    let coords: Vec<String> = WINDOW.iter().map(|(x, y)| format!("{} {}", x, y)).collect();
    std::fs::write(dir.join("info/Front_Side.windows"), format!("1 {}\n", coords.join(" "))).unwrap();

    let data = dir.join("obj.data");
    std::fs::write(
        &data,
        "windowNames = window.names\nmarkerNames = marker.names\nbuildingInfoDir = info/\n",
    )
    .unwrap();
    data
}

fn reference_window() -> [Point2i; 4] {
    WINDOW.map(|(x, y)| scale_to_absolute(Point2d::new(x, y), WIDTH as i32, HEIGHT as i32))
}

fn ground_truth() -> WindowStructure {
    let h = camera();
    let vertices = reference_window().map(|p| {
        let q = h.project(p.to_f64());
        Point2i::new(q.x as i32, q.y as i32)
    });
    WindowStructure::from_windows(&[Window::new(1, vertices)])
}

fn overlay(data: &Path) -> WindowOverlay {
    WindowOverlay::with_detector(WindowOverlayConfig::new(data), Box::new(ProjectedMarkers { h: camera() })).unwrap()
}

#[test]
fn projected_windows_round_trip() {
    let dir = scratch("round_trip");
    let data = write_model(&dir);
    let image = dir.join("front.png");
    imwrite(&image, &Mat::blank(WIDTH, HEIGHT)).unwrap();

    let mut overlay = overlay(&data);
    let output = overlay.overlay(&image).unwrap();

    assert_eq!(output.surfaces.len(), 1);
    assert_eq!(output.surfaces[0].matches, 5);
    assert_eq!(output.windows.ids(), &[1]);

    let inverse = camera().inverse().unwrap();
    for (v, r) in output.windows.polygon(0).iter().zip(reference_window()) {
        let back = inverse.project(v.to_f64());
        assert!(
            (back.x - r.x as f64).abs() < 3.0 && (back.y - r.y as f64).abs() < 3.0,
            "{:?} vs {:?}",
            back,
            r
        );
    }

    let report = overlay.evaluate(&output.windows, &ground_truth());
    assert!(report.mean_iou > 0.9, "{}", report.mean_iou);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn iou_batch_counts_unreadable_images() {
    let dir = scratch("batch");
    let data = write_model(&dir);
    let photos = dir.join("photos");
    std::fs::create_dir_all(&photos).unwrap();

    imwrite(photos.join("good.png"), &Mat::blank(WIDTH, HEIGHT)).unwrap();
    let gt: Vec<String> = ground_truth().vertices().iter().map(|p| format!("{} {}", p.x, p.y)).collect();
    std::fs::write(photos.join("good.quads"), format!("1 {}\n", gt.join(" "))).unwrap();
    std::fs::write(photos.join("broken.jpg"), b"not a jpeg").unwrap();
    imwrite(photos.join("no_truth.png"), &Mat::blank(WIDTH, HEIGHT)).unwrap();

    let mut overlay = overlay(&data);
    let summary = overlay.iou_dir(&photos, "quads").unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 2);
    assert!(summary.mean_iou().unwrap() > 0.9);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn overlay_batch_writes_images() {
    let dir = scratch("overlay");
    let data = write_model(&dir);
    let photos = dir.join("photos");
    std::fs::create_dir_all(&photos).unwrap();
    imwrite(photos.join("front.png"), &Mat::blank(WIDTH, HEIGHT)).unwrap();

    let out = dir.join("out");
    let mut overlay = overlay(&data);
    let summary = overlay.overlay_dir(&photos, Some(&out)).unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.results[0].windows, 1);
    assert!(out.join("front_overlay.png").is_file());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bad_data_file_is_fatal() {
    let dir = scratch("bad_config");
    let data = write_model(&dir);
    std::fs::write(&data, "windowNames = window.names\ncolour = red\n").unwrap();

    let err = WindowOverlay::new(WindowOverlayConfig::new(&data)).err().unwrap();
    assert!(matches!(err, EngineError::Config(ConfigError::UnknownKey { .. })));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reload_keeps_model_on_failure() {
    let dir = scratch("reload");
    let data = write_model(&dir);
    let mut overlay = overlay(&data);
    assert_eq!(overlay.model().surfaces().len(), 1);

    std::fs::remove_file(dir.join("info/Front_Side.windows")).unwrap();
    assert!(overlay.reload().is_err());
    assert_eq!(overlay.model().surfaces()[0].windows.len(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn out_of_range_sidecar_fails_only_its_image() {
    let dir = scratch("sidecar");
    let data = write_model(&dir);
    let photos = dir.join("photos");
    std::fs::create_dir_all(&photos).unwrap();

    let gt: Vec<String> = ground_truth().vertices().iter().map(|p| format!("{} {}", p.x, p.y)).collect();
    let frame = Frame {
        path: photos.join("b.png"),
        mat: Mat::blank(WIDTH, HEIGHT),
    };
    let boxes = ProjectedMarkers { h: camera() }.detect(&frame, 0.0).unwrap();
    let lines: String = boxes
        .iter()
        .map(|b| format!("{} {} {} {} {} {}\n", b.obj_id, b.prob, b.x, b.y, b.w, b.h))
        .collect();

    for stem in ["a", "b"] {
        imwrite(photos.join(format!("{}.png", stem)), &Mat::blank(WIDTH, HEIGHT)).unwrap();
        std::fs::write(photos.join(format!("{}.quads", stem)), format!("1 {}\n", gt.join(" "))).unwrap();
    }
    std::fs::write(photos.join("a.detections"), "1 0.9 4294967290 0 20 20\n").unwrap();
    std::fs::write(photos.join("b.detections"), lines).unwrap();

    let mut overlay = WindowOverlay::new(WindowOverlayConfig::new(&data)).unwrap();
    let summary = overlay.iou_dir(&photos, "quads").unwrap();

    assert_eq!((summary.processed, summary.failed), (1, 1));
    assert!(summary.results[0].error.is_some());
    assert!(summary.results[1].iou.unwrap() > 0.9);

    let _ = std::fs::remove_dir_all(&dir);
}
