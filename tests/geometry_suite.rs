use fragment_sync::element::{MemoryElement, STYLE_TRANSITION_MS, VisualTag};
use fragment_sync::error::SyncError;
use fragment_sync::fragment::{Fragment, FragmentId, Position};
use fragment_sync::geometry::{GeometryConfig, GeometryEngine, PlacementIssue, Viewport, safe_zone_for};
use fragment_sync::lifecycle::ResourceTracker;
use fragment_sync::telemetry::EventLog;
use std::rc::Rc;
use std::time::Duration;

fn new_engine(width: f32, height: f32) -> (GeometryEngine, EventLog) {
    let log = EventLog::new();
    let engine = GeometryEngine::new(
        GeometryConfig::default(),
        Viewport::new(width, height),
        Rc::new(log.clone()),
        fastrand::Rng::with_seed(7),
    );
    (engine, log)
}

fn fragment_at(id: &str, text: &str, x: f32, y: f32) -> Fragment {
    let mut fragment = Fragment::new(FragmentId::new(id), text, Box::new(MemoryElement::new()));
    fragment.move_to(Position::new(x, y));
    fragment
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[test]
fn reference_viewport_produces_expected_zone() {
    let (engine, _) = new_engine(1024.0, 768.0);
    let zone = engine.calculate_safe_zone();
    assert_eq!(zone.x_min, 40.0);
    assert_eq!(zone.x_max, 984.0);
    assert_eq!(zone.y_min, 60.0);
    assert_eq!(zone.y_max, 708.0);
    assert_eq!(zone.center, Position::new(512.0, 384.0));
    assert_eq!(zone, engine.safe_zone());
}

#[test]
fn safe_zone_never_shrinks_below_floor() {
    let config = GeometryConfig::default();
    for w in (200..=1600).step_by(37) {
        for h in (150..=1200).step_by(41) {
            let zone = safe_zone_for(&config, Viewport::new(w as f32, h as f32));
            assert!(zone.width >= 200.0, "{w}x{h} gave width {}", zone.width);
            assert!(zone.height >= 150.0, "{w}x{h} gave height {}", zone.height);
        }
    }
}

#[test]
fn narrow_viewport_recenters_the_floor_zone() {
    let zone = safe_zone_for(&GeometryConfig::default(), Viewport::new(240.0, 160.0));
    assert_eq!(zone.x_min, 20.0);
    assert_eq!(zone.x_max, 220.0);
    assert_eq!(zone.y_min, 5.0);
    assert_eq!(zone.y_max, 155.0);
}

#[test]
fn optimal_speed_stays_within_bounds() {
    let (engine, _) = new_engine(1024.0, 768.0);
    assert_eq!(engine.calculate_optimal_speed(""), 15.0);
    assert_eq!(engine.calculate_optimal_speed("   "), 15.0);
    let long = "x".repeat(500);
    for text in ["a", "hello world", "a somewhat longer drifting line of text", long.as_str()] {
        let speed = engine.calculate_optimal_speed(text);
        assert!((15.0..=60.0).contains(&speed), "{text:?} -> {speed}");
    }
    assert_eq!(engine.calculate_optimal_speed(&long), 15.0);
    assert!(approx(engine.calculate_optimal_speed("hello world"), 60.0 - 11.0 * 0.3));
}

#[test]
fn safe_position_returns_points_already_inside_unchanged() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    let mut rng = fastrand::Rng::with_seed(99);
    for _ in 0..200 {
        let p = Position::new(40.0 + rng.f32() * 944.0, 60.0 + rng.f32() * 648.0);
        assert!(engine.is_in_safe_zone(p));
        assert_eq!(engine.get_safe_position(Some(p)), p);
    }
}

#[test]
fn safe_position_pulls_outside_points_into_the_zone() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    for preferred in [
        Some(Position::new(-50.0, 10.0)),
        Some(Position::new(2000.0, 900.0)),
        Some(Position::new(f32::NAN, 300.0)),
        None,
    ] {
        let p = engine.get_safe_position(preferred);
        assert!(engine.is_in_safe_zone(p), "{preferred:?} -> {p:?}");
    }
}

#[test]
fn edge_detection_uses_fraction_of_smaller_side() {
    let (engine, _) = new_engine(1024.0, 768.0);
    // 0.08 * 768 = 61.44
    assert!(engine.is_near_edge(Position::new(10.0, 300.0)));
    assert!(engine.is_near_edge(Position::new(500.0, 710.0)));
    assert!(!engine.is_near_edge(Position::new(512.0, 384.0)));
    assert!(!engine.is_near_edge(Position::new(62.0, 62.0)));
    assert!(!engine.is_near_edge(Position::new(f32::NAN, 0.0)));

    // exactly on the threshold counts as near
    let t = GeometryConfig::default().edge_threshold * 768.0;
    assert!(engine.is_near_edge(Position::new(t, 300.0)));
    assert!(engine.is_near_edge(Position::new(500.0, 768.0 - t)));
    assert!(engine.is_near_edge(Position::new(1024.0 - t, 300.0)));
}

#[test]
fn centered_slow_fragment_is_valid() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    let mut fragment = fragment_at("a", "hello world", 512.0, 384.0);
    fragment.speed = 20.0;
    let report = engine.validate_fragment_placement(&fragment);
    assert!(report.is_valid);
    assert!(approx(report.score, 1.0));
    assert!(report.issues.is_empty());
    assert_eq!(report.recommended_position, None);
}

#[test]
fn placement_issues_name_each_failing_dimension() {
    let (mut engine, _) = new_engine(1024.0, 768.0);

    let mut outside = fragment_at("out", "hello world", 5.0, 5.0);
    outside.speed = 20.0;
    let report = engine.validate_fragment_placement(&outside);
    assert!(!report.is_valid);
    assert_eq!(report.score, 0.0);
    assert!(report.issues.contains(&PlacementIssue::OutsideSafeZone));
    assert!(report.issues.contains(&PlacementIssue::NearEdge));
    let target = report.recommended_position.expect("invalid placement should recommend a position");
    assert!(engine.is_in_safe_zone(target));

    let mut fast = fragment_at("fast", "hello world", 512.0, 384.0);
    fast.speed = 200.0;
    let report = engine.validate_fragment_placement(&fast);
    assert!(!report.is_valid);
    assert_eq!(report.issues, vec![PlacementIssue::TooFast]);
    assert_eq!(PlacementIssue::TooFast.as_str(), "Moving too fast for content length");

    let mut faint = Fragment::new(
        FragmentId::new("faint"),
        "hello world",
        Box::new(MemoryElement::new().with_font(6.0, 0.1)),
    );
    faint.move_to(Position::new(512.0, 384.0));
    faint.speed = 20.0;
    let report = engine.validate_fragment_placement(&faint);
    assert!(!report.is_valid);
    assert_eq!(report.issues, vec![PlacementIssue::LowVisibility]);

    let broken = fragment_at("nan", "hello world", f32::NAN, 100.0);
    let report = engine.validate_fragment_placement(&broken);
    assert!(!report.is_valid);
    assert_eq!(report.score, 0.0);
    assert_eq!(report.issues, vec![PlacementIssue::InvalidPosition]);
    assert!(report.recommended_position.is_some());
}

#[test]
fn center_distance_alone_lowers_readability() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    let fragment = fragment_at("a", "hello world", 512.0, 384.0);
    // inside the zone, slow, default font: only the center term is below 1
    let off_center = Position::new(832.0, 384.0);
    assert!(engine.is_in_safe_zone(off_center));
    assert!(!engine.is_near_edge(off_center));

    // distance 320 over a half diagonal of 640
    assert!(approx(engine.calculate_readability_score(&fragment, off_center, 10.0), 0.85));
    assert!(approx(engine.calculate_readability_score(&fragment, Position::new(512.0, 384.0), 10.0), 1.0));

    engine.set_center_bias(0.6);
    assert!(approx(engine.calculate_readability_score(&fragment, off_center, 10.0), 0.7));
    engine.set_center_bias(0.0);
    assert!(approx(engine.calculate_readability_score(&fragment, off_center, 10.0), 1.0));
}

#[test]
fn readability_is_zero_for_non_finite_input() {
    let (engine, _) = new_engine(1024.0, 768.0);
    let fragment = fragment_at("a", "hello", 512.0, 384.0);
    assert_eq!(
        engine.calculate_readability_score(&fragment, Position::new(f32::INFINITY, 1.0), 10.0),
        0.0
    );
    assert_eq!(
        engine.calculate_readability_score(&fragment, Position::new(512.0, 384.0), f32::NAN),
        0.0
    );
}

#[test]
fn reposition_moves_mounted_fragment_and_records_reason() {
    let (mut engine, log) = new_engine(1024.0, 768.0);
    let mut fragment = fragment_at("m", "hello world", 5.0, 5.0);
    fragment.speed = 20.0;

    let target = engine
        .reposition_if_needed(&mut fragment)
        .expect("unreadable fragment should move");
    assert_eq!(fragment.position, target);
    assert!(engine.is_in_safe_zone(target));
    assert!(fragment.element().has_tag(VisualTag::Repositioning));
    assert_eq!(fragment.element().style_var(STYLE_TRANSITION_MS), Some(800.0));

    let event = log
        .last("fragment_repositioned")
        .expect("repositioning should be recorded");
    assert_eq!(event.payload.text("id"), Some("m"));
    assert_eq!(event.payload.text("reason"), Some("Outside safe zone"));
    assert_eq!(event.payload.num("old_x"), Some(5.0));

    // Now readable, so a second pass leaves it alone and clears the tag.
    assert_eq!(engine.reposition_if_needed(&mut fragment), None);
    assert!(!fragment.element().has_tag(VisualTag::Repositioning));
}

#[test]
fn unmounted_fragment_is_never_repositioned() {
    let (mut engine, log) = new_engine(1024.0, 768.0);
    let mut fragment = Fragment::new(FragmentId::new("ghost"), "boo", Box::new(MemoryElement::detached()));
    fragment.move_to(Position::new(-100.0, -100.0));
    assert_eq!(engine.reposition_if_needed(&mut fragment), None);
    assert_eq!(fragment.position, Position::new(-100.0, -100.0));
    assert_eq!(log.count("fragment_repositioned"), 0);
}

#[test]
fn degradation_lowers_center_bias_to_a_floor() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    assert!(approx(engine.center_bias(), 0.3));
    let bias = engine.apply_degradation(0.4).expect("healthy viewport should accept degradation");
    assert!(approx(bias, 0.2));
    let bias = engine.apply_degradation(1.0).expect("healthy viewport should accept degradation");
    assert!(approx(bias, 0.05));
    assert!(matches!(
        engine.apply_degradation(f32::NAN),
        Err(SyncError::InvalidLevel(_))
    ));

    engine.set_bias_scale(2.0);
    assert!(approx(engine.center_bias(), 0.1));
}

#[test]
fn degenerate_viewport_rejects_degradation() {
    let (mut engine, _) = new_engine(0.0, 0.0);
    let err = engine.apply_degradation(0.5).unwrap_err();
    assert_eq!(
        err,
        SyncError::DegenerateViewport {
            width: 0.0,
            height: 0.0
        }
    );
}

#[test]
fn viewport_updates_follow_threshold_and_orientation() {
    let (mut engine, _) = new_engine(1000.0, 700.0);
    assert!(!engine.update_viewport(Viewport::new(1050.0, 700.0)));
    assert_eq!(engine.viewport(), Viewport::new(1000.0, 700.0));
    assert!(engine.update_viewport(Viewport::new(1200.0, 700.0)));
    assert_eq!(engine.safe_zone().x_max, 1160.0);

    let (mut square, _) = new_engine(800.0, 780.0);
    assert!(square.update_viewport(Viewport::new(780.0, 800.0)));
}

#[test]
fn resize_requests_are_debounced() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    let mut fragments: Vec<Fragment> = Vec::new();
    engine.request_viewport_resize(Viewport::new(600.0, 400.0), Duration::ZERO);
    engine.request_viewport_resize(Viewport::new(800.0, 600.0), Duration::from_millis(50));

    engine.tick(Duration::from_millis(150), &mut fragments);
    assert_eq!(engine.viewport(), Viewport::new(1024.0, 768.0));
    engine.tick(Duration::from_millis(200), &mut fragments);
    assert_eq!(engine.viewport(), Viewport::new(800.0, 600.0));
}

#[test]
fn monitor_repositions_on_its_interval_only() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    let mut fragments = vec![fragment_at("a", "hi", 5.0, 5.0), fragment_at("b", "hi", 512.0, 384.0)];
    assert_eq!(engine.tick(Duration::from_secs(1), &mut fragments), 0);
    assert_eq!(engine.tick(Duration::from_secs(2), &mut fragments), 1);
    assert!(engine.is_in_safe_zone(fragments[0].position));
    assert_eq!(fragments[1].position, Position::new(512.0, 384.0));
}

#[test]
fn teardown_stops_the_monitor() {
    let (mut engine, _) = new_engine(1024.0, 768.0);
    let tracker = ResourceTracker::new();
    engine.attach(&tracker);
    assert_eq!(tracker.pending(), 1);
    tracker.teardown();

    let mut fragments = vec![fragment_at("a", "hi", 5.0, 5.0)];
    assert_eq!(engine.tick(Duration::from_secs(10), &mut fragments), 0);
    assert_eq!(fragments[0].position, Position::new(5.0, 5.0));

    engine.destroy();
    assert!(engine.is_destroyed());
    assert_eq!(engine.apply_degradation(0.2), Err(SyncError::Destroyed));
}
