use fragment_sync::capability::{FixedPower, PowerStatus};
use fragment_sync::element::{MemoryElement, STYLE_DRIFT_DURATION};
use fragment_sync::fragment::{Fragment, FragmentId};
use fragment_sync::lifecycle::ResourceTracker;
use fragment_sync::motion::{MotionConfig, MotionController, speed_to_duration};
use std::rc::Rc;
use std::time::Duration;

fn controller(seed: u64) -> MotionController {
    MotionController::new(MotionConfig::default(), fastrand::Rng::with_seed(seed))
}

fn fragment(id: &str, text: &str) -> Fragment {
    Fragment::new(FragmentId::new(id), text, Box::new(MemoryElement::new()))
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn small_deltas_snap_and_large_deltas_are_rate_limited() {
    let motion = controller(1);
    assert_eq!(motion.calculate_smooth_transition(60.0, 62.0), 62.0);

    let up = motion.calculate_smooth_transition(20.0, 120.0);
    assert!(up > 20.0 && up < 120.0, "got {up}");
    // 40 px/s² over a 0.5 s update interval
    assert_eq!(up, 40.0);

    // slowing down uses the larger deceleration limit
    assert_eq!(motion.calculate_smooth_transition(120.0, 20.0), 90.0);
}

#[test]
fn non_finite_inputs_fall_back() {
    let motion = controller(1);
    assert_eq!(motion.calculate_smooth_transition(f32::NAN, 30.0), 30.0);
    assert_eq!(motion.calculate_smooth_transition(30.0, f32::INFINITY), 30.0);
    assert_eq!(motion.calculate_smooth_transition(f32::NAN, f32::NAN), 15.0);
}

#[test]
fn duration_scenarios() {
    assert_eq!(speed_to_duration(60.0, 300.0), 5.0);
    assert_eq!(speed_to_duration(0.0, 100.0), 5.0);
    assert_eq!(speed_to_duration(-3.0, 100.0), 5.0);
    assert_eq!(speed_to_duration(f32::NAN, 100.0), 5.0);
    assert_eq!(speed_to_duration(10.0, 0.0), 5.0);
    assert_eq!(speed_to_duration(1000.0, 300.0), 1.0);
    assert_eq!(speed_to_duration(1.0, 300.0), 30.0);
    assert_eq!(controller(1).speed_to_duration(30.0, 300.0), 10.0);
}

#[test]
fn optimal_speed_is_bounded_and_blank_content_is_slowest() {
    let motion = controller(1);
    assert_eq!(motion.calculate_optimal_speed("", None), 15.0);
    assert_eq!(motion.calculate_optimal_speed(" \t ", None), 15.0);
    let long = "word ".repeat(80);
    for text in ["hi", "hello world", "the signal remembers you", long.as_str()] {
        let speed = motion.calculate_optimal_speed(text, None);
        assert!((15.0..=60.0).contains(&speed), "{text:?} -> {speed}");
    }
    // "hi": length penalty (59.4) beats reading time (150)
    assert!(approx(motion.calculate_optimal_speed("hi", None), 59.4));
    assert_eq!(motion.calculate_optimal_speed(&long, None), 15.0);
}

#[test]
fn optimal_speed_with_current_is_smoothed() {
    let motion = controller(1);
    let smoothed = motion.calculate_optimal_speed("hi", Some(15.0));
    // target 59.4, step limited to 20
    assert!(approx(smoothed, 35.0));
}

#[test]
fn registry_tracks_overrides_and_forgets_on_unregister() {
    let mut motion = controller(1);
    let mut f = fragment("a", "hello");
    let unknown = FragmentId::new("nope");

    let speed = motion.register_fragment(&mut f, Duration::ZERO);
    assert!(approx(speed, 58.5));
    assert_eq!(f.speed, speed);
    assert!(f.element().style_var(STYLE_DRIFT_DURATION).is_some());
    assert_eq!(motion.tracked_content_len(f.id()), Some(5));

    assert_eq!(motion.get_fragment_speed(&unknown), None);
    assert_eq!(motion.update_fragment_speed(&unknown, 20.0), None);
    assert_eq!(motion.update_fragment_speed(f.id(), 500.0), Some(60.0));
    assert_eq!(motion.update_fragment_speed(f.id(), f32::NAN), Some(15.0));
    assert_eq!(motion.update_fragment_speed(f.id(), 33.0), Some(33.0));
    assert_eq!(motion.get_fragment_speed(f.id()), Some(33.0));

    assert!(motion.unregister_fragment(f.id()));
    assert!(!motion.unregister_fragment(f.id()));
    assert_eq!(motion.get_fragment_speed(f.id()), None);
    assert_eq!(motion.tracked_count(), 0);
}

#[test]
fn degradation_reshapes_the_speed_table() {
    let mut motion = controller(1);
    motion.update_degradation_level(1.0);
    let limits = motion.limits();
    assert!(approx(limits.max_speed, 108.0));
    assert!(approx(limits.min_speed, 10.5));
    assert!(approx(limits.speed_factor, 1.5));
    assert!(approx(limits.length_ratio, 0.15));
    assert!(approx(limits.acceleration, 80.0));
    assert!(!limits.smoothing);
    // smoothing off: straight to target
    assert_eq!(motion.calculate_smooth_transition(20.0, 120.0), 120.0);

    motion.update_degradation_level(f32::NAN);
    assert_eq!(motion.degradation_level(), 0.0);
    assert!(motion.limits().smoothing);
}

#[test]
fn chaos_stays_within_factor_bounds_above_threshold() {
    let mut motion = controller(42);
    let mut fragments: Vec<Fragment> = (0..50).map(|i| fragment(&format!("f{i}"), "signal")).collect();
    for f in &mut fragments {
        motion.register_fragment(f, Duration::ZERO);
    }

    motion.update_degradation_level(0.3);
    let calm = motion.calculate_optimal_speed("signal", None);
    for f in &fragments {
        assert_eq!(motion.get_fragment_speed(f.id()), Some(calm));
    }

    motion.update_degradation_level(0.9);
    let optimal = motion.calculate_optimal_speed("signal", None);
    let limits = motion.limits();
    let lo = (optimal * 0.8).clamp(limits.min_speed, limits.max_speed);
    let hi = (optimal * 1.2).clamp(limits.min_speed, limits.max_speed);
    let mut speeds = Vec::new();
    for f in &fragments {
        let s = motion
            .get_fragment_speed(f.id())
            .expect("registered fragment should have a speed");
        assert!(s >= lo - 1e-3 && s <= hi + 1e-3, "{s} outside [{lo}, {hi}]");
        speeds.push(s);
    }
    speeds.sort_by(f32::total_cmp);
    speeds.dedup();
    assert!(speeds.len() > 1, "chaos should vary speeds");
}

#[test]
fn chaos_is_reproducible_for_a_seed() {
    let run = |seed| {
        let mut motion = controller(seed);
        let mut fragments: Vec<Fragment> = (0..10).map(|i| fragment(&format!("f{i}"), "a b c")).collect();
        for f in &mut fragments {
            motion.register_fragment(f, Duration::ZERO);
        }
        motion.update_degradation_level(0.8);
        fragments
            .iter()
            .map(|f| motion.get_fragment_speed(f.id()))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(5), run(5));
}

#[test]
fn skip_probability_rises_with_crowding_and_low_battery() {
    let power = Rc::new(FixedPower::new(None));
    let mut motion = controller(3).with_power_probe(power.clone());
    assert_eq!(motion.skip_probability(), 0.0);
    assert!(!motion.should_skip_update());

    let mut fragments: Vec<Fragment> = (0..21).map(|i| fragment(&format!("f{i}"), "x")).collect();
    for f in &mut fragments {
        motion.register_fragment(f, Duration::ZERO);
    }
    let crowded = motion.skip_probability();
    assert!(approx(crowded, 0.5));

    power.set(Some(PowerStatus {
        level: 0.1,
        charging: true,
    }));
    assert!(approx(motion.skip_probability(), crowded));

    power.set(Some(PowerStatus {
        level: 0.1,
        charging: false,
    }));
    let both = motion.skip_probability();
    assert!(both > crowded);
    assert!(approx(both, 0.7));
}

#[test]
fn tick_moves_speeds_toward_new_targets() {
    let mut motion = controller(1);
    let mut fragments = vec![fragment("a", "hello")];
    motion.register_fragment(&mut fragments[0], Duration::ZERO);

    motion.set_phase_speed_scale(0.25);
    assert_eq!(motion.tick(Duration::from_millis(100), &mut fragments), 0);
    assert_eq!(motion.tick(Duration::from_millis(500), &mut fragments), 1);

    // 58.5 -> 15, decelerating by 30 per interval
    let speed = fragments[0].speed;
    assert!(approx(speed, 28.5), "got {speed}");
    let duration = fragments[0]
        .element()
        .style_var(STYLE_DRIFT_DURATION)
        .expect("tick should paint the drift duration");
    assert!(approx(duration, 300.0 / 28.5));
}

#[test]
fn teardown_and_destroy_make_tick_inert() {
    let mut motion = controller(1);
    let mut fragments = vec![fragment("a", "hello")];
    motion.register_fragment(&mut fragments[0], Duration::ZERO);
    motion.set_phase_speed_scale(0.25);

    let tracker = ResourceTracker::new();
    motion.attach(&tracker);
    tracker.teardown();
    assert_eq!(motion.tick(Duration::from_secs(5), &mut fragments), 0);

    motion.destroy();
    assert!(motion.is_destroyed());
    assert_eq!(motion.tracked_count(), 0);
}

#[test]
fn inverted_speed_config_never_panics() {
    let config = MotionConfig {
        min_speed: 80.0,
        ..MotionConfig::default()
    };
    let mut motion = MotionController::new(config, fastrand::Rng::with_seed(1));
    let limits = motion.limits();
    assert!(limits.max_speed >= limits.min_speed);

    let mut f = fragment("a", "hello");
    assert_eq!(motion.register_fragment(&mut f, Duration::ZERO), 80.0);
    assert_eq!(motion.update_fragment_speed(f.id(), 10.0), Some(80.0));
    motion.update_degradation_level(0.9);
    let limits = motion.limits();
    let speed = motion.get_fragment_speed(f.id()).expect("still tracked");
    assert!(speed >= limits.min_speed && speed <= limits.max_speed);
}
