use crate::audio::{
    AudioStatusProvider, DegradationLabel, DegradationSignal, RecognitionFeedback,
    parse_audio_level,
};
use crate::capability::TierMonitor;
use crate::config::{PerformanceTier, SyncQuality};
use crate::corruption::CorruptionEngine;
use crate::element::{STYLE_GUIDANCE, VisualTag};
use crate::error::SyncError;
use crate::fragment::{Fragment, FragmentId, KarmaVector};
use crate::geometry::GeometryEngine;
use crate::lifecycle::{Clock, RepeatingTask, ResourceTracker};
use crate::motion::MotionController;
use crate::telemetry::{Payload, TelemetrySink};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub throttle_window: Duration,
    pub sync_interval: Duration,
    pub sync_threshold: f32,
    pub enhance_after: u32,
    pub guidance_multiplier: f32,
    pub initial_tier: PerformanceTier,
    pub adaptive_tier: bool,
    pub pass_budget_ms: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_window: Duration::from_millis(200),
            sync_interval: Duration::from_millis(250),
            sync_threshold: 0.05,
            enhance_after: 2,
            guidance_multiplier: 1.5,
            initial_tier: PerformanceTier::High,
            adaptive_tier: false,
            pass_budget_ms: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Recognition,
    Degradation,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recognition => "recognition",
            Self::Degradation => "degradation",
        }
    }

    pub fn preset(self) -> PhasePreset {
        match self {
            Self::Idle => PhasePreset {
                center_bias_scale: 1.0,
                speed_scale: 1.0,
            },
            Self::Recognition => PhasePreset {
                center_bias_scale: 1.5,
                speed_scale: 0.75,
            },
            Self::Degradation => PhasePreset {
                center_bias_scale: 0.5,
                speed_scale: 1.25,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePreset {
    pub center_bias_scale: f32,
    pub speed_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMode {
    AudioVisual,
    VisualOnly,
}

impl FeedbackMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::AudioVisual => "audio-visual",
            Self::VisualOnly => "visual-only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualCompensation {
    pub enabled: bool,
    pub enhanced: bool,
    pub guidance_multiplier: f32,
}

impl Default for VisualCompensation {
    fn default() -> Self {
        Self {
            enabled: false,
            enhanced: false,
            guidance_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegradationState {
    pub level: f32,
    pub label: DegradationLabel,
    pub applied_at: Option<Duration>,
}

impl Default for DegradationState {
    fn default() -> Self {
        Self {
            level: 0.0,
            label: DegradationLabel::Minimal,
            applied_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub phase: Phase,
    pub tier: PerformanceTier,
    pub quality: SyncQuality,
    pub compensation: VisualCompensation,
    pub feedback_mode: FeedbackMode,
    pub degradation: DegradationState,
    pub global_corruption_level: f32,
    pub last_sync_at: Option<Duration>,
    pub last_sync_error: Option<SyncError>,
    pub sync_count: usize,
    pub pending_sync: bool,
    pub throttle_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub synced: bool,
    pub repositioned: usize,
    pub speed_updates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackOutcome {
    pub mode: FeedbackMode,
    pub affected: usize,
}

pub struct SyncOrchestrator {
    config: SyncConfig,
    geometry: GeometryEngine,
    motion: MotionController,
    corruption: CorruptionEngine,
    audio: Option<Rc<dyn AudioStatusProvider>>,
    telemetry: Rc<dyn TelemetrySink>,
    clock: Rc<dyn Clock>,
    tracker: Rc<ResourceTracker>,
    state: DegradationState,
    last_sync_at: Option<Duration>,
    pending_sync: bool,
    sync_task: RepeatingTask,
    tier: PerformanceTier,
    quality: SyncQuality,
    tier_monitor: TierMonitor,
    compensation: VisualCompensation,
    audio_failures: u32,
    audio_checked: bool,
    phase: Phase,
    feedback_mode: FeedbackMode,
    last_sync_error: Option<SyncError>,
    sync_count: usize,
    destroyed: bool,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("phase", &self.phase)
            .field("tier", &self.tier)
            .field("state", &self.state)
            .field("compensation", &self.compensation)
            .field("sync_count", &self.sync_count)
            .field("geometry", &self.geometry)
            .field("motion", &self.motion)
            .field("corruption", &self.corruption)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        geometry: GeometryEngine,
        motion: MotionController,
        corruption: CorruptionEngine,
        clock: Rc<dyn Clock>,
        telemetry: Rc<dyn TelemetrySink>,
    ) -> Self {
        let tracker = ResourceTracker::new();
        let now = clock.now();
        let sync_task = RepeatingTask::new(config.sync_interval, now);
        geometry.attach(&tracker);
        motion.attach(&tracker);
        tracker.register_token("sync interval", sync_task.token());

        let tier = config.initial_tier;
        let quality = tier.sync_quality();
        let tier_monitor = TierMonitor::new(tier, config.adaptive_tier, config.pass_budget_ms);
        let mut this = Self {
            config,
            geometry,
            motion,
            corruption,
            audio: None,
            telemetry,
            clock,
            tracker,
            state: DegradationState::default(),
            last_sync_at: None,
            pending_sync: false,
            sync_task,
            tier,
            quality,
            tier_monitor,
            compensation: VisualCompensation::default(),
            audio_failures: 0,
            audio_checked: false,
            phase: Phase::Idle,
            feedback_mode: FeedbackMode::AudioVisual,
            last_sync_error: None,
            sync_count: 0,
            destroyed: false,
        };
        this.apply_quality(quality);
        this
    }

    pub fn with_audio(mut self, audio: Rc<dyn AudioStatusProvider>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn geometry(&self) -> &GeometryEngine {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut GeometryEngine {
        &mut self.geometry
    }

    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut MotionController {
        &mut self.motion
    }

    pub fn corruption(&self) -> &CorruptionEngine {
        &self.corruption
    }

    pub fn corruption_mut(&mut self) -> &mut CorruptionEngine {
        &mut self.corruption
    }

    pub fn tracker(&self) -> Rc<ResourceTracker> {
        self.tracker.clone()
    }

    pub fn global_corruption_level(&self) -> f32 {
        self.corruption.global_level()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn compensation(&self) -> VisualCompensation {
        self.compensation
    }

    pub fn feedback_mode(&self) -> FeedbackMode {
        self.feedback_mode
    }

    pub fn last_sync_error(&self) -> Option<&SyncError> {
        self.last_sync_error.as_ref()
    }

    pub fn sync_count(&self) -> usize {
        self.sync_count
    }

    pub fn sync_quality(&self) -> SyncQuality {
        self.quality
    }

    pub fn performance_tier(&self) -> PerformanceTier {
        self.tier
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn throttle_window(&self) -> Duration {
        self.config.throttle_window * self.quality.throttle_scale()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            phase: self.phase,
            tier: self.tier,
            quality: self.quality,
            compensation: self.compensation,
            feedback_mode: self.feedback_mode,
            degradation: self.state,
            global_corruption_level: self.corruption.global_level(),
            last_sync_at: self.last_sync_at,
            last_sync_error: self.last_sync_error.clone(),
            sync_count: self.sync_count,
            pending_sync: self.pending_sync,
            throttle_window: self.throttle_window(),
        }
    }

    pub fn register_fragment(&mut self, fragment: &mut Fragment) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();
        let placed = self.geometry.get_safe_position(Some(fragment.position));
        if placed != fragment.position {
            fragment.move_to(placed);
        }
        self.corruption.initialize_clean_fragment(fragment);
        self.motion.register_fragment(fragment, now);
    }

    pub fn unregister_fragment(&mut self, id: &FragmentId) {
        self.corruption.unregister_fragment(id);
        self.motion.unregister_fragment(id);
    }

    pub fn parse_audio_level(&self, signal: &DegradationSignal) -> f32 {
        parse_audio_level(signal)
    }

    pub fn check_audio_status(&mut self) -> bool {
        let needs_compensation = match &self.audio {
            Some(audio) => !audio.is_initialized(),
            None => true,
        };
        if needs_compensation {
            self.audio_failures = self.audio_failures.saturating_add(1);
            self.enable_visual_compensation();
        } else {
            self.audio_failures = 0;
            if self.compensation.enabled {
                self.disable_visual_compensation();
            }
        }
        needs_compensation
    }

    pub fn enable_visual_compensation(&mut self) {
        if !self.compensation.enabled {
            self.compensation.enabled = true;
            self.feedback_mode = FeedbackMode::VisualOnly;
            log::warn!("audio unavailable; visual compensation enabled");
            self.telemetry
                .record_event("visual_compensation_enabled", Payload::new());
        }
        if !self.compensation.enhanced && self.audio_failures >= self.config.enhance_after {
            self.compensation.enhanced = true;
            self.compensation.guidance_multiplier = self.config.guidance_multiplier.max(1.0);
            log::warn!(
                "audio still unavailable after {} checks; guidance x{:.2}",
                self.audio_failures,
                self.compensation.guidance_multiplier
            );
            self.telemetry.record_event(
                "visual_compensation_enhanced",
                Payload::new()
                    .with("failures", self.audio_failures as usize)
                    .with("guidance", self.compensation.guidance_multiplier),
            );
        }
    }

    fn disable_visual_compensation(&mut self) {
        self.compensation = VisualCompensation::default();
        self.feedback_mode = FeedbackMode::AudioVisual;
        log::info!("audio recovered; visual compensation disabled");
        self.telemetry
            .record_event("visual_compensation_disabled", Payload::new());
    }

    /// One full pass: read audio, normalize, fan out Corruption → Geometry →
    /// Motion. Returns the level the leaves now track.
    pub fn sync_visual_with_audio(&mut self) -> f32 {
        if self.destroyed {
            return self.state.level;
        }
        let now = self.clock.now();
        // A feedback handler that just checked audio already counted this failure.
        let compensating = if self.audio_checked {
            self.compensation.enabled
        } else {
            self.check_audio_status()
        };
        let signal = match (&self.audio, compensating) {
            (Some(audio), false) => audio.degradation_state(),
            // Without audio the visuals hold the last level they tracked.
            _ => DegradationSignal::Level(self.state.level),
        };
        let level = parse_audio_level(&signal);

        let unchanged = self.state.applied_at.is_some()
            && (level - self.state.level).abs() < self.config.sync_threshold;
        if unchanged {
            return self.state.level;
        }

        let mut errors = Vec::new();
        self.corruption
            .sync_with_audio_degradation(&DegradationSignal::Level(level));
        if let Err(err) = self.geometry.apply_degradation(level) {
            errors.push(err);
        }
        if self.motion.is_destroyed() {
            errors.push(SyncError::Destroyed);
        } else {
            self.motion.update_degradation_level(level);
        }

        for err in &errors {
            log::warn!("sync leaf failure: {err}");
        }
        self.last_sync_error = errors.last().cloned();
        self.state = DegradationState {
            level,
            label: DegradationLabel::from_level(level),
            applied_at: Some(now),
        };
        self.telemetry.record_event(
            "visual_audio_synced",
            Payload::new()
                .with("level", level)
                .with("label", self.state.label.as_str())
                .with("compensating", compensating)
                .with("errors", errors.len()),
        );
        level
    }

    /// Leading-edge throttle. Returns whether a pass ran now.
    pub fn request_sync(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let now = self.clock.now();
        let open = match self.last_sync_at {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.throttle_window(),
        };
        if open {
            self.perform_sync();
            true
        } else {
            self.pending_sync = true;
            false
        }
    }

    pub fn perform_sync(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();
        self.last_sync_at = Some(now);
        self.pending_sync = false;
        self.sync_count += 1;
        let level = self.sync_visual_with_audio();
        log::debug!("sync #{} at {:?}: level {:.2}", self.sync_count, now, level);
        self.telemetry.record_event(
            "sync_performed",
            Payload::new()
                .with("count", self.sync_count)
                .with("level", level)
                .with("quality", self.quality.label()),
        );
    }

    pub fn tick(&mut self, fragments: &mut [Fragment]) -> TickReport {
        let mut report = TickReport::default();
        if self.destroyed {
            return report;
        }
        let now = self.clock.now();
        let periodic = self.sync_task.poll(now);
        if self.pending_sync || periodic {
            report.synced = self.request_sync();
        }
        report.repositioned = self.geometry.tick(now, fragments);
        report.speed_updates = self.motion.tick(now, fragments);
        self.corruption.refresh(fragments.iter_mut());
        self.paint_guidance(fragments);
        report
    }

    pub fn handle_recognition_feedback(
        &mut self,
        feedback: &RecognitionFeedback,
        fragments: &mut [Fragment],
    ) -> FeedbackOutcome {
        let mode = self.route_to_audio(|audio| audio.on_recognition(feedback));
        let affected = if feedback.fragment_ids.is_empty() {
            self.corruption.purify_on_recognition(fragments.iter_mut())
        } else {
            self.corruption.purify_on_recognition(
                fragments
                    .iter_mut()
                    .filter(|f| feedback.fragment_ids.contains(f.id())),
            )
        };
        self.telemetry.record_event(
            "recognition_feedback",
            Payload::new()
                .with("mode", mode.label())
                .with("strength", feedback.strength)
                .with("purified", affected),
        );
        self.sync_after_feedback(mode);
        FeedbackOutcome { mode, affected }
    }

    pub fn handle_karma_change(&mut self, karma: &KarmaVector, fragments: &mut [Fragment]) -> FeedbackOutcome {
        let mode = self.route_to_audio(|audio| audio.on_karma(karma));
        let mut affected = 0;
        for fragment in fragments.iter_mut() {
            self.corruption.apply_progressive_corruption(fragment, karma);
            affected += 1;
        }
        self.telemetry.record_event(
            "karma_changed",
            Payload::new()
                .with("mode", mode.label())
                .with("sum", karma.sum())
                .with("fragments", affected),
        );
        self.sync_after_feedback(mode);
        FeedbackOutcome { mode, affected }
    }

    pub fn start_recognition_phase(&mut self) {
        self.enter_phase(Phase::Recognition);
    }

    pub fn start_degradation_phase(&mut self) {
        self.enter_phase(Phase::Degradation);
    }

    pub fn end_phase(&mut self) {
        self.enter_phase(Phase::Idle);
    }

    pub fn set_performance_tier(&mut self, tier: PerformanceTier) {
        self.tier_monitor.set_base_tier(tier);
        self.apply_tier(tier);
    }

    pub fn report_pass_time(&mut self, ms: f32) {
        if let Some(tier) = self.tier_monitor.update(ms) {
            self.apply_tier(tier);
        }
    }

    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.tracker.teardown();
        self.geometry.destroy();
        self.motion.destroy();
        self.corruption.destroy();
        self.pending_sync = false;
        self.destroyed = true;
        self.telemetry.record_event(
            "sync_destroyed",
            Payload::new().with("syncs", self.sync_count),
        );
    }

    fn route_to_audio(&mut self, forward: impl FnOnce(&dyn AudioStatusProvider)) -> FeedbackMode {
        match self.audio.clone() {
            Some(audio) if audio.is_initialized() => {
                forward(audio.as_ref());
                FeedbackMode::AudioVisual
            }
            _ => {
                self.check_audio_status();
                self.feedback_mode = FeedbackMode::VisualOnly;
                FeedbackMode::VisualOnly
            }
        }
    }

    fn sync_after_feedback(&mut self, mode: FeedbackMode) {
        self.audio_checked = mode == FeedbackMode::VisualOnly;
        self.request_sync();
        self.audio_checked = false;
    }

    fn enter_phase(&mut self, phase: Phase) {
        let from = self.phase;
        self.phase = phase;
        let preset = phase.preset();
        self.geometry.set_bias_scale(preset.center_bias_scale);
        self.motion.set_phase_speed_scale(preset.speed_scale);
        log::info!("phase {} -> {}", from.label(), phase.label());
        self.telemetry.record_event(
            "phase_changed",
            Payload::new()
                .with("from", from.label())
                .with("to", phase.label()),
        );
    }

    fn apply_tier(&mut self, tier: PerformanceTier) {
        let before = self.tier;
        self.tier = tier;
        let quality = tier.sync_quality();
        self.apply_quality(quality);
        if before != tier {
            log::info!("performance tier {} -> {}", before.label(), tier.label());
        }
        self.telemetry.record_event(
            "performance_tier_changed",
            Payload::new()
                .with("tier", tier.label())
                .with("quality", quality.label()),
        );
    }

    fn apply_quality(&mut self, quality: SyncQuality) {
        self.quality = quality;
        self.corruption.set_text_fidelity(quality);
        let now = self.clock.now();
        self.sync_task
            .set_interval(self.config.sync_interval * quality.throttle_scale(), now);
    }

    fn paint_guidance(&self, fragments: &mut [Fragment]) {
        for fragment in fragments.iter_mut() {
            let element = fragment.element_mut();
            if self.compensation.enabled {
                element.add_tag(VisualTag::Compensated);
                element.set_style_var(STYLE_GUIDANCE, self.compensation.guidance_multiplier);
            } else if element.has_tag(VisualTag::Compensated) {
                element.remove_tag(VisualTag::Compensated);
                element.set_style_var(STYLE_GUIDANCE, 1.0);
            }
        }
    }
}
