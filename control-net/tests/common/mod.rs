//! Synthetic control networks for integration tests and benches.

#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use control_net::codec::{self, HeaderRecord, MeasureRecord, PointRecord, SurfaceRecord};
use control_net::{MeasureType, PointType};
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn header(network_id: &str, target: &str) -> HeaderRecord {
    HeaderRecord {
        network_id: network_id.to_string(),
        target_name: target.to_string(),
        description: "synthetic network".to_string(),
        user_name: "tester".to_string(),
        created: "2024-03-01T12:00:00Z".to_string(),
        last_modified: "2024-03-02T08:30:00Z".to_string(),
    }
}

pub fn measure(serial: &str, sample: f64, line: f64) -> MeasureRecord {
    MeasureRecord {
        serial_number: serial.to_string(),
        measure_type: MeasureType::RegisteredSubPixel,
        sample,
        line,
        sample_residual: 0.0,
        line_residual: 0.0,
        ignored: false,
        edit_lock: false,
        chooser_name: None,
        date_time: None,
    }
}

pub fn point(id: &str, serials: &[&str]) -> PointRecord {
    PointRecord {
        id: id.to_string(),
        point_type: PointType::Free,
        ignored: false,
        edit_lock: false,
        reference_index: None,
        apriori: None,
        adjusted: None,
        chooser_name: None,
        date_time: None,
        measures: serials
            .iter()
            .enumerate()
            .map(|(i, s)| measure(s, 100.0 + i as f64, 200.0 + i as f64))
            .collect(),
    }
}

/// Two points on Mars: PA seen in img1/img2, PB seen in img1/img3.
pub fn mars_network() -> (HeaderRecord, Vec<PointRecord>) {
    (
        header("net1", "MARS"),
        vec![point("PA", &["img1", "img2"]), point("PB", &["img1", "img3"])],
    )
}

/// Random network where every point is measured on 2 to 4 of `num_images`
/// images. Same seed, same network.
pub fn synthetic_network(
    seed: u64,
    num_points: usize,
    num_images: usize,
) -> (HeaderRecord, Vec<PointRecord>) {
    assert!(num_images >= 4, "need at least 4 images");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let serials: Vec<String> = (0..num_images).map(|i| format!("CAM/{i:05}")).collect();

    let points = (0..num_points)
        .map(|p| {
            let count = rng.random_range(2..=4);
            let chosen: Vec<&String> = serials.choose_multiple(&mut rng, count).collect();
            let measures = chosen
                .iter()
                .map(|serial| MeasureRecord {
                    sample_residual: rng.random_range(-0.5..0.5),
                    line_residual: rng.random_range(-0.5..0.5),
                    ..measure(serial, rng.random_range(0.0..1024.0), rng.random_range(0.0..1024.0))
                })
                .collect();
            PointRecord {
                id: format!("pt_{p:06}"),
                point_type: PointType::Free,
                ignored: rng.random_bool(0.05),
                edit_lock: false,
                reference_index: Some(0),
                apriori: Some(SurfaceRecord {
                    latitude: rng.random_range(-80.0..80.0),
                    longitude: rng.random_range(0.0..360.0),
                    radius_meters: None,
                }),
                adjusted: None,
                chooser_name: Some("synthetic".to_string()),
                date_time: None,
                measures,
            }
        })
        .collect();

    (header(&format!("synthetic-{seed}"), "Mars"), points)
}

/// Encode a network into `dir/name`.
pub fn write_container(
    dir: &Path,
    name: &str,
    header: &HeaderRecord,
    points: &[PointRecord],
) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).expect("create network file");
    codec::encode(BufWriter::new(file), header, points).expect("encode network");
    path
}
