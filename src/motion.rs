use crate::capability::PowerProbe;
use crate::element::STYLE_DRIFT_DURATION;
use crate::fragment::{Fragment, FragmentId};
use crate::geometry::length_penalty_speed;
use crate::lifecycle::{RepeatingTask, ResourceTracker};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

pub const FALLBACK_DURATION_S: f32 = 5.0;
pub const MIN_DURATION_S: f32 = 1.0;
pub const MAX_DURATION_S: f32 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    pub min_speed: f32,
    pub max_speed: f32,
    pub length_ratio: f32,
    pub words_per_minute: f32,
    pub reading_buffer: f32,
    pub min_reading_time_s: f32,
    pub travel_distance: f32,
    pub speed_factor: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub update_interval: Duration,
    pub snap_threshold: f32,
    pub smoothing_cutoff: f32,
    pub chaos_threshold: f32,
    pub chaos_min: f32,
    pub chaos_max: f32,
    pub crowding_threshold: usize,
    pub crowding_skip: f32,
    pub low_battery_level: f32,
    pub low_battery_skip: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_speed: 15.0,
            max_speed: 60.0,
            length_ratio: 0.3,
            words_per_minute: 200.0,
            reading_buffer: 1.5,
            min_reading_time_s: 2.0,
            travel_distance: 300.0,
            speed_factor: 1.0,
            acceleration: 40.0,
            deceleration: 60.0,
            update_interval: Duration::from_millis(500),
            snap_threshold: 5.0,
            smoothing_cutoff: 0.7,
            chaos_threshold: 0.5,
            chaos_min: 0.8,
            chaos_max: 1.2,
            crowding_threshold: 20,
            crowding_skip: 0.5,
            low_battery_level: 0.2,
            low_battery_skip: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimits {
    pub min_speed: f32,
    pub max_speed: f32,
    pub speed_factor: f32,
    pub length_ratio: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub smoothing: bool,
}

impl SpeedLimits {
    fn derive(config: &MotionConfig, level: f32) -> Self {
        let min_speed = config.min_speed * (1.0 - 0.3 * level);
        Self {
            max_speed: (config.max_speed * (1.0 + 0.8 * level)).max(min_speed),
            min_speed,
            speed_factor: config.speed_factor * (1.0 + 0.5 * level),
            length_ratio: config.length_ratio * (1.0 - 0.5 * level),
            acceleration: config.acceleration * (1.0 + level),
            deceleration: config.deceleration * (1.0 + level),
            smoothing: level <= config.smoothing_cutoff,
        }
    }

    fn clamp(&self, speed: f32) -> f32 {
        speed.clamp(self.min_speed, self.max_speed)
    }
}

#[derive(Debug, Clone)]
struct TrackedSpeed {
    content: String,
    content_len: usize,
    current: f32,
    target: f32,
    last_update: Duration,
}

pub struct MotionController {
    config: MotionConfig,
    limits: SpeedLimits,
    degradation: f32,
    phase_scale: f32,
    fragments: BTreeMap<FragmentId, TrackedSpeed>,
    task: RepeatingTask,
    rng: fastrand::Rng,
    power: Option<Rc<dyn PowerProbe>>,
    destroyed: bool,
}

impl fmt::Debug for MotionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionController")
            .field("limits", &self.limits)
            .field("degradation", &self.degradation)
            .field("phase_scale", &self.phase_scale)
            .field("tracked", &self.fragments.len())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl MotionController {
    pub fn new(config: MotionConfig, rng: fastrand::Rng) -> Self {
        let limits = SpeedLimits::derive(&config, 0.0);
        let task = RepeatingTask::new(config.update_interval, Duration::ZERO);
        Self {
            config,
            limits,
            degradation: 0.0,
            phase_scale: 1.0,
            fragments: BTreeMap::new(),
            task,
            rng,
            power: None,
            destroyed: false,
        }
    }

    pub fn with_power_probe(mut self, power: Rc<dyn PowerProbe>) -> Self {
        self.power = Some(power);
        self
    }

    pub fn attach(&self, tracker: &ResourceTracker) {
        tracker.register_token("motion update interval", self.task.token());
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn limits(&self) -> SpeedLimits {
        self.limits
    }

    pub fn degradation_level(&self) -> f32 {
        self.degradation
    }

    pub fn tracked_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn set_phase_speed_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.phase_scale = scale;
        }
    }

    pub fn calculate_optimal_speed(&self, content: &str, current: Option<f32>) -> f32 {
        let target = self.optimal_target(content);
        match current {
            Some(c) => self.calculate_smooth_transition(c, target),
            None => target,
        }
    }

    pub fn calculate_smooth_transition(&self, current: f32, target: f32) -> f32 {
        if !target.is_finite() {
            return if current.is_finite() {
                current
            } else {
                self.limits.min_speed
            };
        }
        if !current.is_finite() {
            return target;
        }
        let delta = target - current;
        if delta.abs() < self.config.snap_threshold || !self.limits.smoothing {
            return target;
        }
        let dt = self.config.update_interval.as_secs_f32();
        let limit = if delta > 0.0 {
            self.limits.acceleration
        } else {
            self.limits.deceleration
        };
        let step = (limit * dt).min(delta.abs());
        current + step * delta.signum()
    }

    pub fn speed_to_duration(&self, speed: f32, distance: f32) -> f32 {
        speed_to_duration(speed, distance)
    }

    pub fn register_fragment(&mut self, fragment: &mut Fragment, now: Duration) -> f32 {
        let content = fragment.original_text().to_string();
        let speed = self.optimal_target(&content);
        self.fragments.insert(
            fragment.id().clone(),
            TrackedSpeed {
                content_len: content.chars().count(),
                content,
                current: speed,
                target: speed,
                last_update: now,
            },
        );
        self.apply_to_fragment(fragment);
        speed
    }

    pub fn update_fragment_speed(&mut self, id: &FragmentId, speed: f32) -> Option<f32> {
        let limits = self.limits;
        let entry = self.fragments.get_mut(id)?;
        let speed = if speed.is_finite() {
            limits.clamp(speed)
        } else {
            limits.min_speed
        };
        entry.current = speed;
        entry.target = speed;
        Some(speed)
    }

    pub fn unregister_fragment(&mut self, id: &FragmentId) -> bool {
        self.fragments.remove(id).is_some()
    }

    pub fn get_fragment_speed(&self, id: &FragmentId) -> Option<f32> {
        self.fragments.get(id).map(|t| t.current)
    }

    pub fn tracked_content_len(&self, id: &FragmentId) -> Option<usize> {
        self.fragments.get(id).map(|t| t.content_len)
    }

    pub fn apply_to_fragment(&self, fragment: &mut Fragment) -> Option<f32> {
        let speed = self.get_fragment_speed(fragment.id())?;
        fragment.speed = speed;
        let duration = speed_to_duration(speed, self.config.travel_distance);
        fragment
            .element_mut()
            .set_style_var(STYLE_DRIFT_DURATION, duration);
        Some(speed)
    }

    pub fn update_degradation_level(&mut self, level: f32) {
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.degradation = level;
        self.limits = SpeedLimits::derive(&self.config, level);

        let chaotic = level > self.config.chaos_threshold;
        let keys: Vec<FragmentId> = self.fragments.keys().cloned().collect();
        for id in keys {
            let Some(content) = self.fragments.get(&id).map(|t| t.content.clone()) else {
                continue;
            };
            let mut speed = self.optimal_target(&content);
            if chaotic {
                let span = self.config.chaos_max - self.config.chaos_min;
                let factor = self.config.chaos_min + self.rng.f32() * span;
                speed = self.limits.clamp(speed * factor);
            }
            if let Some(entry) = self.fragments.get_mut(&id) {
                entry.current = speed;
                entry.target = speed;
            }
        }
        log::debug!(
            "motion degradation {level:.2}: speed [{:.1},{:.1}] factor {:.2} smoothing={} chaos={chaotic}",
            self.limits.min_speed,
            self.limits.max_speed,
            self.limits.speed_factor,
            self.limits.smoothing
        );
    }

    pub fn skip_probability(&self) -> f32 {
        let crowding = if self.fragments.len() > self.config.crowding_threshold {
            self.config.crowding_skip
        } else {
            0.0
        };
        let battery = match self.power.as_ref().and_then(|p| p.status()) {
            Some(status) if status.is_low(self.config.low_battery_level) => {
                self.config.low_battery_skip
            }
            _ => 0.0,
        };
        (1.0 - (1.0 - crowding) * (1.0 - battery)).clamp(0.0, 1.0)
    }

    pub fn should_skip_update(&mut self) -> bool {
        let p = self.skip_probability();
        p > 0.0 && self.rng.f32() < p
    }

    pub fn tick(&mut self, now: Duration, fragments: &mut [Fragment]) -> usize {
        if self.destroyed || !self.task.poll(now) || self.should_skip_update() {
            return 0;
        }
        let chaotic = self.degradation > self.config.chaos_threshold;
        let interval = self.config.update_interval;
        let keys: Vec<FragmentId> = self.fragments.keys().cloned().collect();
        let mut moved = 0;
        for id in keys {
            let Some(entry) = self.fragments.get(&id).cloned() else {
                continue;
            };
            if now.saturating_sub(entry.last_update) < interval {
                continue;
            }
            let target = if chaotic {
                entry.target
            } else {
                self.optimal_target(&entry.content)
            };
            let next = self.calculate_smooth_transition(entry.current, target);
            if let Some(slot) = self.fragments.get_mut(&id) {
                if slot.current != next {
                    moved += 1;
                }
                slot.current = next;
                slot.target = target;
                slot.last_update = now;
            }
        }
        for fragment in fragments.iter_mut() {
            self.apply_to_fragment(fragment);
        }
        moved
    }

    pub fn destroy(&mut self) {
        self.task.token().cancel();
        self.fragments.clear();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn optimal_target(&self, content: &str) -> f32 {
        let content = content.trim();
        if content.is_empty() {
            return self.limits.min_speed;
        }
        let reading = self.reading_time_speed(content);
        let by_length = length_penalty_speed(
            content,
            self.limits.min_speed,
            self.limits.max_speed,
            self.limits.length_ratio,
        );
        let speed = reading.min(by_length) * self.limits.speed_factor * self.phase_scale;
        if speed.is_finite() {
            self.limits.clamp(speed)
        } else {
            self.limits.min_speed
        }
    }

    fn reading_time_speed(&self, content: &str) -> f32 {
        let words = content.split_whitespace().count() as f32;
        let wpm = self.config.words_per_minute.max(1.0);
        let secs = (words / wpm * 60.0 * self.config.reading_buffer).max(self.config.min_reading_time_s.max(0.1));
        self.config.travel_distance / secs
    }
}

/// `distance / speed` clamped to [1, 30] s; unusable input gives 5 s.
pub fn speed_to_duration(speed: f32, distance: f32) -> f32 {
    if !speed.is_finite() || !distance.is_finite() || speed <= 0.0 || distance <= 0.0 {
        return FALLBACK_DURATION_S;
    }
    (distance / speed).clamp(MIN_DURATION_S, MAX_DURATION_S)
}
