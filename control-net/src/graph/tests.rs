use super::*;
use approx::assert_relative_eq;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn point(id: &str, serials: &[&str]) -> ControlPoint {
    ControlPoint::with_measures(
        id,
        serials
            .iter()
            .enumerate()
            .map(|(i, s)| ControlMeasure::new(*s, i as f64, i as f64)),
    )
    .unwrap()
}

fn mars_network() -> NetworkGraph {
    let mut graph = NetworkGraph::with_header(NetworkHeader::new("net1", "MARS"));
    graph.add_point(point("PA", &["img1", "img2"])).unwrap();
    graph.add_point(point("PB", &["img1", "img3"])).unwrap();
    graph
}

#[test]
fn test_two_point_scenario() {
    let graph = mars_network();

    assert_eq!(
        graph.serial_numbers().collect::<Vec<_>>(),
        vec!["img1", "img2", "img3"]
    );
    assert_eq!(graph.adjacent_serials("img1").unwrap(), vec!["img2", "img3"]);
    assert!(graph.is_connected("img1", "img2"));
    assert!(graph.is_connected("img3", "img1"));
    assert!(!graph.is_connected("img2", "img3"));
    assert_eq!(graph.num_measures(), 4);
    graph.check_consistency().unwrap();
}

#[test]
fn test_measure_lookup_after_add() {
    let graph = mars_network();
    for p in graph.points() {
        for m in p.measures() {
            let found = graph.node_measure(&m.serial_number, &p.id).unwrap();
            assert!(std::ptr::eq(found, m));
            assert!(graph.node(&m.serial_number).unwrap().contains_point(&p.id));
        }
    }

    assert_eq!(
        graph.node_measure("img2", "PB"),
        Err(GraphError::MeasureNotFound {
            serial_number: "img2".to_string(),
            point_id: "PB".to_string()
        })
    );
    assert_eq!(
        graph.node_measure("img9", "PA"),
        Err(GraphError::NodeNotFound("img9".to_string()))
    );
}

#[test]
fn test_duplicate_measure_rolls_back_whole_point() {
    let mut graph = mars_network();

    let mut bad = point("PC", &["img1", "img4"]);
    // Bypass ControlPoint's own duplicate check to simulate a corrupted record.
    bad.measures.push(ControlMeasure::new("img1", 9.0, 9.0));

    let err = graph.add_point(bad).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateMeasure { .. }));

    assert!(!graph.contains_point("PC"));
    assert!(graph.node("img4").is_none());
    assert!(!graph.node("img1").unwrap().contains_point("PC"));
    assert!(graph.edge_points("img1", "img4").is_none());
    assert_eq!(graph.num_nodes(), 3);
    graph.check_consistency().unwrap();
}

#[test]
fn test_duplicate_point_id_rejected() {
    let mut graph = mars_network();
    let err = graph.add_point(point("PA", &["img5", "img6"])).unwrap_err();
    assert_eq!(err, GraphError::DuplicatePoint("PA".to_string()));
    assert!(graph.node("img5").is_none());
    graph.check_consistency().unwrap();
}

#[test]
fn test_empty_point_rejected() {
    let mut graph = NetworkGraph::new();
    assert_eq!(
        graph.add_point(ControlPoint::new("P0")),
        Err(GraphError::EmptyPoint("P0".to_string()))
    );
}

#[test]
fn test_shared_edge_survives_until_last_point_removed() {
    let mut graph = NetworkGraph::new();
    graph.add_point(point("P1", &["a", "b", "c"])).unwrap();
    graph.add_point(point("P2", &["a", "b"])).unwrap();

    let tags: Vec<&str> = graph
        .edge_points("a", "b")
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(tags, vec!["P1", "P2"]);

    graph.remove_point("P1").unwrap();
    assert!(graph.is_connected("a", "b"));
    assert!(!graph.is_connected("a", "c"));
    assert!(graph.node("c").is_none());

    graph.remove_point("P2").unwrap();
    assert!(!graph.is_connected("a", "b"));
    assert_eq!(graph.num_nodes(), 0);
    graph.check_consistency().unwrap();
}

#[test]
fn test_remove_point_twice_is_not_found() {
    let mut graph = mars_network();
    let removed = graph.remove_point("PA").unwrap();
    assert_eq!(removed.num_measures(), 2);
    assert_eq!(
        graph.remove_point("PA"),
        Err(GraphError::PointNotFound("PA".to_string()))
    );
    assert!(graph.node("img2").is_none());
    assert_eq!(graph.point_ids(), &["PB".to_string()]);
    graph.check_consistency().unwrap();
}

#[test]
fn test_add_and_remove_measure_on_live_point() {
    let mut graph = mars_network();
    graph
        .add_measure("PA", ControlMeasure::new("img3", 5.0, 5.0))
        .unwrap();
    assert!(graph.is_connected("img2", "img3"));
    assert_eq!(graph.edge_points("img1", "img3").unwrap().len(), 2);

    assert!(matches!(
        graph.add_measure("PA", ControlMeasure::new("img3", 1.0, 1.0)),
        Err(GraphError::DuplicateSerial { .. })
    ));

    let removed = graph.remove_measure("PA", "img3").unwrap();
    assert_relative_eq!(removed.sample, 5.0);
    assert!(!graph.is_connected("img2", "img3"));
    graph.check_consistency().unwrap();

    graph.remove_measure("PB", "img3").unwrap();
    graph.remove_measure("PB", "img1").unwrap();
    assert!(!graph.contains_point("PB"));
    assert!(graph.node("img3").is_none());
    graph.check_consistency().unwrap();
}

#[test]
fn test_valid_measures_exclude_ignored() {
    let mut graph = mars_network();
    graph.set_measure_ignored("PA", "img1", true).unwrap();
    assert_eq!(graph.measures_on("img1").unwrap().len(), 2);
    assert_eq!(graph.valid_measures_on("img1").unwrap().len(), 1);

    graph.set_point_ignored("PB", true).unwrap();
    assert!(graph.valid_measures_on("img1").unwrap().is_empty());
    assert_eq!(graph.num_valid_points(), 1);
    assert_eq!(graph.num_valid_measures(), 1);

    assert!(matches!(
        graph.set_measure_ignored("PA", "img9", true),
        Err(GraphError::MeasureNotFound { .. })
    ));
}

#[test]
fn test_residual_statistics() {
    let mut graph = NetworkGraph::new();
    let p = ControlPoint::with_measures(
        "P1",
        [
            ControlMeasure::new("a", 0.0, 0.0).with_residuals(3.0, 4.0),
            ControlMeasure::new("b", 0.0, 0.0).with_residuals(1.0, 0.0),
        ],
    )
    .unwrap();
    graph.add_point(p).unwrap();
    assert_relative_eq!(graph.average_residual(), 3.0, epsilon = 1e-12);
    assert_relative_eq!(graph.maximum_residual(), 5.0, epsilon = 1e-12);

    assert_relative_eq!(NetworkGraph::new().average_residual(), 0.0);
}

#[test]
fn test_islands() {
    let mut graph = mars_network();
    graph.add_point(point("PX", &["x2", "x1"])).unwrap();
    graph.add_point(point("PS", &["solo"])).unwrap();

    assert_eq!(
        graph.islands(),
        vec![
            vec!["img1".to_string(), "img2".to_string(), "img3".to_string()],
            vec!["solo".to_string()],
            vec!["x1".to_string(), "x2".to_string()],
        ]
    );
}

#[test]
fn test_random_add_remove_keeps_consistency() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let images: Vec<String> = (0..12).map(|i| format!("img{i:02}")).collect();
    let mut graph = NetworkGraph::new();
    let mut live: Vec<String> = Vec::new();

    for round in 0..300 {
        if live.is_empty() || rng.random_bool(0.6) {
            let count = rng.random_range(1..=4);
            let serials: Vec<&str> = images
                .choose_multiple(&mut rng, count)
                .map(String::as_str)
                .collect();
            let id = format!("P{round}");
            graph.add_point(point(&id, &serials)).unwrap();
            live.push(id);
        } else {
            let idx = rng.random_range(0..live.len());
            let id = live.swap_remove(idx);
            graph.remove_point(&id).unwrap();
        }
        graph.check_consistency().unwrap();
    }

    // Edge iff some live point spans both images.
    for a in &images {
        for b in &images {
            if a == b {
                continue;
            }
            let spanned = graph.points().any(|p| p.has_serial(a) && p.has_serial(b));
            assert_eq!(graph.is_connected(a, b), spanned, "{a} - {b}");
        }
    }
}
