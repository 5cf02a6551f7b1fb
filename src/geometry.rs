use crate::element::{STYLE_TRANSITION_MS, VisualTag};
use crate::error::SyncError;
use crate::fragment::{Fragment, Position};
use crate::lifecycle::{RepeatingTask, ResourceTracker};
use crate::telemetry::{Payload, TelemetrySink};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        let fix = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self {
            width: fix(width),
            height: fix(height),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }

    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }

    pub fn center(&self) -> Position {
        Position::new(self.width * 0.5, self.height * 0.5)
    }

    pub fn half_diagonal(&self) -> f32 {
        (self.width * self.width + self.height * self.height).sqrt() * 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 60.0,
            bottom: 60.0,
            left: 40.0,
            right: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeZone {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
    pub center: Position,
    pub width: f32,
    pub height: f32,
}

impl SafeZone {
    fn from_bounds(x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            center: Position::new((x_min + x_max) * 0.5, (y_min + y_max) * 0.5),
            width: x_max - x_min,
            height: y_max - y_min,
        }
    }

    pub fn contains(&self, p: Position) -> bool {
        p.is_finite() && p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    pub fn distance_outside(&self, p: Position) -> f32 {
        let dx = (self.x_min - p.x).max(0.0).max(p.x - self.x_max);
        let dy = (self.y_min - p.y).max(0.0).max(p.y - self.y_max);
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryConfig {
    pub margins: Margins,
    pub min_zone_width: f32,
    pub min_zone_height: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub length_ratio: f32,
    pub readability_threshold: f32,
    pub center_bias: f32,
    pub degradation_bias_slope: f32,
    pub min_center_bias: f32,
    pub edge_threshold: f32,
    pub min_font_size: f32,
    pub min_opacity: f32,
    pub resize_threshold: f32,
    pub resize_debounce: Duration,
    pub monitor_interval: Duration,
    pub reposition_transition_ms: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            margins: Margins::default(),
            min_zone_width: 200.0,
            min_zone_height: 150.0,
            min_speed: 15.0,
            max_speed: 60.0,
            length_ratio: 0.3,
            readability_threshold: 0.6,
            center_bias: 0.3,
            degradation_bias_slope: 0.25,
            min_center_bias: 0.05,
            edge_threshold: 0.08,
            min_font_size: 12.0,
            min_opacity: 0.3,
            resize_threshold: 0.10,
            resize_debounce: Duration::from_millis(150),
            monitor_interval: Duration::from_secs(2),
            reposition_transition_ms: 800.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementIssue {
    OutsideSafeZone,
    TooFast,
    NearEdge,
    LowVisibility,
    InvalidPosition,
}

impl PlacementIssue {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutsideSafeZone => "Outside safe zone",
            Self::TooFast => "Moving too fast for content length",
            Self::NearEdge => "Too close to viewport edge",
            Self::LowVisibility => "Low visibility",
            Self::InvalidPosition => "Invalid position",
        }
    }
}

impl fmt::Display for PlacementIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementReport {
    pub is_valid: bool,
    pub score: f32,
    pub issues: Vec<PlacementIssue>,
    pub recommended_position: Option<Position>,
}

pub struct GeometryEngine {
    config: GeometryConfig,
    viewport: Viewport,
    zone: SafeZone,
    center_bias: f32,
    bias_scale: f32,
    pending_resize: Option<(Viewport, Duration)>,
    monitor: RepeatingTask,
    rng: fastrand::Rng,
    telemetry: Rc<dyn TelemetrySink>,
    destroyed: bool,
}

impl fmt::Debug for GeometryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryEngine")
            .field("viewport", &self.viewport)
            .field("zone", &self.zone)
            .field("center_bias", &self.center_bias)
            .field("bias_scale", &self.bias_scale)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl GeometryEngine {
    pub fn new(
        config: GeometryConfig,
        viewport: Viewport,
        telemetry: Rc<dyn TelemetrySink>,
        rng: fastrand::Rng,
    ) -> Self {
        let zone = safe_zone_for(&config, viewport);
        let center_bias = config.center_bias.clamp(0.0, 1.0);
        let monitor = RepeatingTask::new(config.monitor_interval, Duration::ZERO);
        Self {
            config,
            viewport,
            zone,
            center_bias,
            bias_scale: 1.0,
            pending_resize: None,
            monitor,
            rng,
            telemetry,
            destroyed: false,
        }
    }

    pub fn attach(&self, tracker: &ResourceTracker) {
        tracker.register_token("geometry readability monitor", self.monitor.token());
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn safe_zone(&self) -> SafeZone {
        self.zone
    }

    pub fn calculate_safe_zone(&self) -> SafeZone {
        safe_zone_for(&self.config, self.viewport)
    }

    /// Adopts `viewport` when it moved past the resize threshold or flipped
    /// orientation. Returns whether the safe zone was recomputed.
    pub fn update_viewport(&mut self, viewport: Viewport) -> bool {
        let old = self.viewport;
        let rel = |new: f32, old: f32| {
            if old <= 0.0 {
                new != old
            } else {
                ((new - old) / old).abs() > self.config.resize_threshold
            }
        };
        let flipped = !old.is_degenerate()
            && !viewport.is_degenerate()
            && old.is_landscape() != viewport.is_landscape()
            && old.width != old.height;
        if !(rel(viewport.width, old.width) || rel(viewport.height, old.height) || flipped) {
            return false;
        }
        self.viewport = viewport;
        self.zone = safe_zone_for(&self.config, viewport);
        log::debug!(
            "viewport {}x{} -> safe zone x[{:.0},{:.0}] y[{:.0},{:.0}]",
            viewport.width,
            viewport.height,
            self.zone.x_min,
            self.zone.x_max,
            self.zone.y_min,
            self.zone.y_max
        );
        true
    }

    pub fn request_viewport_resize(&mut self, viewport: Viewport, now: Duration) {
        self.pending_resize = Some((viewport, now + self.config.resize_debounce));
    }

    pub fn tick(&mut self, now: Duration, fragments: &mut [Fragment]) -> usize {
        if self.destroyed {
            return 0;
        }
        if let Some((viewport, due)) = self.pending_resize {
            if now >= due {
                self.pending_resize = None;
                self.update_viewport(viewport);
            }
        }
        if !self.monitor.poll(now) {
            return 0;
        }
        fragments
            .iter_mut()
            .filter_map(|f| self.reposition_if_needed(f))
            .count()
    }

    pub fn calculate_optimal_speed(&self, text: &str) -> f32 {
        length_penalty_speed(
            text,
            self.config.min_speed,
            self.config.max_speed,
            self.config.length_ratio,
        )
    }

    pub fn center_bias(&self) -> f32 {
        (self.center_bias * self.bias_scale).clamp(0.0, 1.0)
    }

    pub fn set_center_bias(&mut self, bias: f32) {
        if bias.is_finite() {
            self.center_bias = bias.clamp(0.0, 1.0);
        }
    }

    pub fn set_bias_scale(&mut self, scale: f32) {
        if scale.is_finite() {
            self.bias_scale = scale.max(0.0);
        }
    }

    pub fn apply_degradation(&mut self, level: f32) -> Result<f32, SyncError> {
        if self.destroyed {
            return Err(SyncError::Destroyed);
        }
        if !level.is_finite() {
            return Err(SyncError::InvalidLevel(level));
        }
        if self.viewport.is_degenerate() {
            return Err(SyncError::DegenerateViewport {
                width: self.viewport.width,
                height: self.viewport.height,
            });
        }
        let level = level.clamp(0.0, 1.0);
        let bias = (self.config.center_bias - level * self.config.degradation_bias_slope)
            .max(self.config.min_center_bias);
        self.set_center_bias(bias);
        Ok(self.center_bias)
    }

    pub fn is_in_safe_zone(&self, p: Position) -> bool {
        self.zone.contains(p)
    }

    pub fn is_near_edge(&self, p: Position) -> bool {
        if !p.is_finite() {
            return false;
        }
        let t = self.config.edge_threshold * self.viewport.min_side();
        p.x <= t || p.y <= t || p.x >= self.viewport.width - t || p.y >= self.viewport.height - t
    }

    /// `preferred` comes back untouched when it is already inside the zone.
    pub fn get_safe_position(&mut self, preferred: Option<Position>) -> Position {
        if let Some(p) = preferred {
            if self.zone.contains(p) {
                return p;
            }
        }
        let z = self.zone;
        let bias = self.center_bias();
        let x = z.x_min + self.rng.f32() * z.width;
        let y = z.y_min + self.rng.f32() * z.height;
        Position::new(x + (z.center.x - x) * bias, y + (z.center.y - y) * bias)
    }

    pub fn calculate_readability_score(&self, fragment: &Fragment, position: Position, speed: f32) -> f32 {
        if !position.is_finite() {
            return 0.0;
        }
        let element = fragment.element();
        let score = self.position_score(position)
            * self.speed_score(fragment.original_text(), speed)
            * self.visibility_score(element.font_size(), element.opacity())
            * self.center_score(position);
        clamp01(score)
    }

    pub fn validate_fragment_placement(&mut self, fragment: &Fragment) -> PlacementReport {
        let position = fragment.position;
        if !position.is_finite() {
            return PlacementReport {
                is_valid: false,
                score: 0.0,
                issues: vec![PlacementIssue::InvalidPosition],
                recommended_position: Some(self.get_safe_position(None)),
            };
        }

        let element = fragment.element();
        let score = self.calculate_readability_score(fragment, position, fragment.speed);
        let mut issues = Vec::new();
        if !self.zone.contains(position) {
            issues.push(PlacementIssue::OutsideSafeZone);
        }
        if self.speed_score(fragment.original_text(), fragment.speed) < 0.8 {
            issues.push(PlacementIssue::TooFast);
        }
        if self.is_near_edge(position) {
            issues.push(PlacementIssue::NearEdge);
        }
        if self.visibility_score(element.font_size(), element.opacity()) < 1.0 {
            issues.push(PlacementIssue::LowVisibility);
        }

        let is_valid = score >= self.config.readability_threshold;
        let recommended_position = (!is_valid).then(|| self.get_safe_position(Some(position)));
        PlacementReport {
            is_valid,
            score,
            issues,
            recommended_position,
        }
    }

    pub fn reposition_if_needed(&mut self, fragment: &mut Fragment) -> Option<Position> {
        if self.destroyed || !fragment.is_mounted() {
            return None;
        }
        let report = self.validate_fragment_placement(fragment);
        if report.is_valid {
            fragment.element_mut().remove_tag(VisualTag::Repositioning);
            return None;
        }
        let target = report.recommended_position?;
        let old = fragment.position;
        if old == target {
            return None;
        }

        let reason = report
            .issues
            .first()
            .map(|i| i.as_str())
            .unwrap_or("Low readability");
        let element = fragment.element_mut();
        element.set_style_var(STYLE_TRANSITION_MS, self.config.reposition_transition_ms);
        element.add_tag(VisualTag::Repositioning);
        fragment.move_to(target);

        self.telemetry.record_event(
            "fragment_repositioned",
            Payload::new()
                .with("id", fragment.id().as_str())
                .with("old_x", old.x)
                .with("old_y", old.y)
                .with("new_x", target.x)
                .with("new_y", target.y)
                .with("score", report.score)
                .with("reason", reason),
        );
        Some(target)
    }

    pub fn destroy(&mut self) {
        self.monitor.token().cancel();
        self.pending_resize = None;
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn position_score(&self, p: Position) -> f32 {
        if self.zone.contains(p) {
            return 1.0;
        }
        let band = (self.config.edge_threshold * self.viewport.min_side()).max(1.0);
        clamp01(1.0 - self.zone.distance_outside(p) / band)
    }

    fn speed_score(&self, text: &str, speed: f32) -> f32 {
        if !speed.is_finite() {
            return 0.0;
        }
        let optimal = self.calculate_optimal_speed(text);
        if speed <= optimal {
            1.0
        } else {
            clamp01(optimal / speed)
        }
    }

    fn visibility_score(&self, font_size: f32, opacity: f32) -> f32 {
        if !font_size.is_finite() || !opacity.is_finite() {
            return 0.0;
        }
        let font = (font_size / self.config.min_font_size.max(1e-3)).min(1.0);
        let alpha = (opacity / self.config.min_opacity.max(1e-3)).min(1.0);
        clamp01(font * alpha)
    }

    fn center_score(&self, p: Position) -> f32 {
        let half = self.viewport.half_diagonal();
        if half <= 0.0 {
            return 1.0;
        }
        let dist = clamp01(p.distance(self.zone.center) / half);
        clamp01(1.0 - self.center_bias() * dist)
    }
}

pub fn safe_zone_for(config: &GeometryConfig, viewport: Viewport) -> SafeZone {
    let m = config.margins;
    let center = viewport.center();
    let (mut x_min, mut x_max) = (m.left, viewport.width - m.right);
    let (mut y_min, mut y_max) = (m.top, viewport.height - m.bottom);
    if x_max - x_min < config.min_zone_width {
        x_min = center.x - config.min_zone_width * 0.5;
        x_max = center.x + config.min_zone_width * 0.5;
    }
    if y_max - y_min < config.min_zone_height {
        y_min = center.y - config.min_zone_height * 0.5;
        y_max = center.y + config.min_zone_height * 0.5;
    }
    SafeZone::from_bounds(x_min, x_max, y_min, y_max)
}

pub fn length_penalty_speed(text: &str, min_speed: f32, max_speed: f32, ratio: f32) -> f32 {
    let text = text.trim();
    if text.is_empty() {
        return min_speed;
    }
    let len = text.chars().count() as f32;
    (max_speed - len * ratio).clamp(min_speed, max_speed.max(min_speed))
}

fn clamp01(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}
