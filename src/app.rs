use crate::audio::{AudioStatusProvider, DegradationLabel, RecognitionFeedback, SimulatedAudio};
use crate::capability::probe_runtime;
use crate::config::{AudioMode, Config, PerformanceTier};
use crate::corruption::CorruptionEngine;
use crate::element::{MemoryElement, STYLE_DRIFT_DURATION};
use crate::fragment::{CorruptionTier, Fragment, KarmaVector, Position};
use crate::geometry::{GeometryEngine, Viewport};
use crate::lifecycle::{Clock, ManualClock, SystemClock};
use crate::motion::{FALLBACK_DURATION_S, MotionController};
use crate::script::FragmentScript;
use crate::sync::{Phase, SyncOrchestrator, TickReport};
use crate::telemetry::{LogSink, TelemetrySink};
use crate::terminal::TerminalGuard;
use crate::tuning::Tuning;
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{cursor, queue};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

const MAX_FRAGMENTS: usize = 24;
const LIFETIME_SPANS: f32 = 2.0;
const FLAKY_PERIOD_S: f32 = 10.0;
const FLAKY_OUTAGE_S: f32 = 3.0;
const NEGATIVE_KARMA: KarmaVector = KarmaVector::uniform(-40.0);
// Pixel size of one terminal cell.
const CELL_W: f32 = 8.0;
const CELL_H: f32 = 16.0;
const HUD_ROWS: u16 = 2;

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let tuning = match cfg.tuning.as_deref() {
        Some(path) => Tuning::load(Path::new(path))
            .with_context(|| format!("load tuning file {path}"))?,
        None => Tuning::default(),
    };
    let script = match cfg.script.as_deref() {
        Some(path) => {
            FragmentScript::load(path).with_context(|| format!("load fragment script {path}"))?
        }
        None => FragmentScript::builtin(),
    };

    let probe = probe_runtime(cfg.tier, cfg.adaptive_tier, None);
    for note in probe.notes() {
        log::info!("capability: {note}");
    }
    let seed = cfg.seed.unwrap_or_else(|| fastrand::u64(..));
    log::info!(
        "seed {seed}, capability {}, {} script lines",
        probe.status_label(),
        script.len()
    );

    if cfg.headless {
        run_headless(&cfg, tuning, script, probe.tier, seed)
    } else {
        run_terminal(&cfg, tuning, script, probe.tier, seed)
    }
}

fn run_headless(
    cfg: &Config,
    tuning: Tuning,
    script: FragmentScript,
    tier: PerformanceTier,
    seed: u64,
) -> anyhow::Result<()> {
    let clock = ManualClock::new();
    let viewport = Viewport::new(cfg.width, cfg.height);
    let mut scene = Scene::new(cfg, tuning, script, tier, seed, Rc::new(clock.clone()), viewport);

    let tick = Duration::from_millis(cfg.tick_ms.max(1));
    let dt = tick.as_secs_f32();
    let mut prev_t = 0.0f32;
    let mut last_second = 0u64;
    for _ in 0..cfg.ticks {
        clock.advance(tick);
        let t = clock.now().as_secs_f32();
        scene.scripted_input(prev_t, t);
        scene.step(prev_t, t, dt);
        let second = clock.now().as_secs();
        if second > last_second {
            last_second = second;
            println!("{}", scene.status_line(t));
        }
        prev_t = t;
    }

    scene.shutdown();
    println!("{}", scene.status_line(prev_t));
    Ok(())
}

fn run_terminal(
    cfg: &Config,
    tuning: Tuning,
    script: FragmentScript,
    tier: PerformanceTier,
    seed: u64,
) -> anyhow::Result<()> {
    let mut last_size = TerminalGuard::size()?;
    if last_size.0 < 20 || last_size.1 < HUD_ROWS + 2 {
        return Err(anyhow::anyhow!(
            "terminal too small (need at least 20x{}, got {}x{})",
            HUD_ROWS + 2,
            last_size.0,
            last_size.1
        ));
    }

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());

    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());
    let mut scene = Scene::new(
        cfg,
        tuning,
        script,
        tier,
        seed,
        clock.clone(),
        viewport_for(last_size),
    );

    let frame = Duration::from_millis(cfg.tick_ms.max(1));
    let mut prev_t = clock.now().as_secs_f32();
    loop {
        let started = Instant::now();

        // Drain input events (non-blocking).
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    if handle_key(k.code, k.modifiers, &mut scene) {
                        scene.shutdown();
                        return Ok(());
                    }
                }
                Event::Resize(c, r) => {
                    last_size = (c, r);
                    scene.request_resize(viewport_for(last_size));
                }
                _ => {}
            }
        }

        let t = clock.now().as_secs_f32();
        let dt = (t - prev_t).max(1e-6);
        scene.step(prev_t, t, dt);
        prev_t = t;

        draw(&mut out, &scene, last_size, t)?;

        let elapsed = started.elapsed();
        if elapsed < frame {
            std::thread::sleep(frame - elapsed);
        }
    }
}

fn handle_key(code: KeyCode, mods: KeyModifiers, scene: &mut Scene) -> bool {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
        return true;
    }
    match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => return true,
        KeyCode::Char('r') | KeyCode::Char('R') => scene.toggle_recognition(),
        KeyCode::Char('d') | KeyCode::Char('D') => scene.toggle_degradation(),
        KeyCode::Char('k') | KeyCode::Char('K') => scene.negative_karma(),
        KeyCode::Char('a') | KeyCode::Char('A') => scene.toggle_audio_failure(),
        _ => {}
    }
    false
}

fn viewport_for(size: (u16, u16)) -> Viewport {
    let rows = size.1.saturating_sub(HUD_ROWS);
    Viewport::new(size.0 as f32 * CELL_W, rows as f32 * CELL_H)
}

fn tier_color(tier: CorruptionTier) -> Color {
    match tier {
        CorruptionTier::Clean => Color::White,
        CorruptionTier::Minimal => Color::Grey,
        CorruptionTier::Moderate => Color::Yellow,
        CorruptionTier::Severe => Color::Magenta,
        CorruptionTier::Complete => Color::DarkRed,
    }
}

fn draw(out: &mut impl Write, scene: &Scene, size: (u16, u16), t: f32) -> anyhow::Result<()> {
    let (cols, rows) = size;
    let visual_rows = rows.saturating_sub(HUD_ROWS);
    queue!(out, Clear(ClearType::All))?;

    for fragment in &scene.fragments {
        let p = fragment.position;
        if !p.is_finite() || p.x < 0.0 || p.y < 0.0 {
            continue;
        }
        let col = (p.x / CELL_W) as u16;
        let row = (p.y / CELL_H) as u16;
        if col >= cols || row >= visual_rows {
            continue;
        }
        let room = (cols - col) as usize;
        let text: String = fragment.current_text().chars().take(room).collect();
        queue!(
            out,
            cursor::MoveTo(col, row),
            SetForegroundColor(tier_color(fragment.tier())),
            Print(text)
        )?;
    }

    let status: String = scene.status_line(t).chars().take(cols as usize).collect();
    let help: String = "q quit  r recognition  d degradation  k karma  a audio on/off"
        .chars()
        .take(cols as usize)
        .collect();
    queue!(
        out,
        ResetColor,
        cursor::MoveTo(0, visual_rows),
        Print(status),
        cursor::MoveTo(0, visual_rows + 1),
        Print(help)
    )?;
    out.flush()?;
    Ok(())
}

struct Scene {
    sync: SyncOrchestrator,
    clock: Rc<dyn Clock>,
    fragments: Vec<Fragment>,
    births: Vec<f32>,
    audio: Option<Rc<SimulatedAudio>>,
    audio_mode: AudioMode,
    audio_forced_off: bool,
    script: FragmentScript,
    script_loop: bool,
    seconds_per_label: f32,
    rng: fastrand::Rng,
}

impl Scene {
    fn new(
        cfg: &Config,
        tuning: Tuning,
        script: FragmentScript,
        tier: PerformanceTier,
        seed: u64,
        clock: Rc<dyn Clock>,
        viewport: Viewport,
    ) -> Self {
        let telemetry: Rc<dyn TelemetrySink> = Rc::new(LogSink);
        let geometry = GeometryEngine::new(
            tuning.geometry,
            viewport,
            telemetry.clone(),
            fastrand::Rng::with_seed(seed ^ 0x6765_6f6d),
        );
        let motion = MotionController::new(tuning.motion, fastrand::Rng::with_seed(seed ^ 0x6d6f_7469));
        let corruption = CorruptionEngine::new(tuning.corruption, telemetry.clone());

        let mut sync_config = tuning.sync;
        sync_config.initial_tier = tier;
        sync_config.adaptive_tier |= cfg.adaptive_tier;
        let mut sync =
            SyncOrchestrator::new(sync_config, geometry, motion, corruption, clock.clone(), telemetry);

        let audio = match cfg.audio {
            AudioMode::Absent => None,
            AudioMode::Simulated | AudioMode::Flaky => Some(Rc::new(SimulatedAudio::new())),
        };
        if let Some(audio) = &audio {
            let provider: Rc<dyn AudioStatusProvider> = audio.clone();
            sync = sync.with_audio(provider);
        }

        Self {
            sync,
            clock,
            fragments: Vec::new(),
            births: Vec::new(),
            audio,
            audio_mode: cfg.audio,
            audio_forced_off: false,
            script,
            script_loop: cfg.script_loop,
            seconds_per_label: cfg.seconds_per_label.max(0.1),
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    fn step(&mut self, prev_t: f32, t: f32, dt: f32) -> TickReport {
        self.drive_audio(t);
        self.spawn_due(prev_t, t);
        self.retire_expired(t);

        for fragment in &mut self.fragments {
            let p = fragment.position;
            fragment.move_to(Position::new(p.x - fragment.speed * dt, p.y));
        }

        let started = Instant::now();
        let report = self.sync.tick(&mut self.fragments);
        self.sync
            .report_pass_time(started.elapsed().as_secs_f32() * 1000.0);
        if report.repositioned > 0 || report.speed_updates > 0 {
            log::debug!(
                "tick: synced={} repositioned={} speed_updates={}",
                report.synced,
                report.repositioned,
                report.speed_updates
            );
        }
        report
    }

    fn drive_audio(&mut self, t: f32) {
        let Some(audio) = &self.audio else {
            return;
        };
        let labels = DegradationLabel::all();
        let idx = (t / self.seconds_per_label) as usize % labels.len();
        audio.set_signal(labels[idx]);

        let outage = self.audio_mode == AudioMode::Flaky
            && t % FLAKY_PERIOD_S >= FLAKY_PERIOD_S - FLAKY_OUTAGE_S;
        audio.set_initialized(!(outage || self.audio_forced_off));
    }

    fn spawn_due(&mut self, prev_t: f32, t: f32) {
        let due: Vec<String> = self
            .script
            .due(prev_t, t, self.script_loop)
            .into_iter()
            .map(str::to_string)
            .collect();
        for text in due {
            if self.fragments.len() >= MAX_FRAGMENTS {
                log::debug!("scene full; dropping '{text}'");
                continue;
            }
            let viewport = self.sync.geometry().viewport();
            let mut fragment = Fragment::spawn(text, Box::new(MemoryElement::new()), &mut self.rng);
            let x = viewport.width * (0.55 + self.rng.f32() * 0.4);
            let y = viewport.height * self.rng.f32();
            fragment.move_to(Position::new(x, y));
            self.sync.register_fragment(&mut fragment);
            self.fragments.push(fragment);
            self.births.push(t);
        }
    }

    fn retire_expired(&mut self, t: f32) {
        let mut i = 0;
        while i < self.fragments.len() {
            let drift = self.fragments[i]
                .element()
                .style_var(STYLE_DRIFT_DURATION)
                .unwrap_or(FALLBACK_DURATION_S);
            if t - self.births[i] > drift * LIFETIME_SPANS {
                let gone = self.fragments.swap_remove(i);
                self.births.swap_remove(i);
                self.sync.unregister_fragment(gone.id());
            } else {
                i += 1;
            }
        }
    }

    fn scripted_input(&mut self, prev_t: f32, t: f32) {
        if crossed(prev_t, t, 4.0, 3.0) {
            self.negative_karma();
        }
        if crossed(prev_t, t, 20.0, 8.0) {
            self.toggle_recognition();
        }
        if crossed(prev_t, t, 20.0, 12.0) {
            self.toggle_recognition();
        }
        if crossed(prev_t, t, 20.0, 14.0) {
            self.toggle_degradation();
        }
        if crossed(prev_t, t, 20.0, 18.0) {
            self.toggle_degradation();
        }
        if crossed(prev_t, t, 60.0, 25.0) {
            let v = self.sync.geometry().viewport();
            self.request_resize(Viewport::new(v.width * 0.75, v.height * 0.75));
        }
    }

    fn request_resize(&mut self, viewport: Viewport) {
        let now = self.clock.now();
        self.sync
            .geometry_mut()
            .request_viewport_resize(viewport, now);
    }

    fn toggle_recognition(&mut self) {
        if self.sync.phase() == Phase::Recognition {
            self.sync.end_phase();
            return;
        }
        self.sync.start_recognition_phase();
        let feedback = RecognitionFeedback {
            fragment_ids: Vec::new(),
            strength: 1.0,
        };
        self.sync
            .handle_recognition_feedback(&feedback, &mut self.fragments);
    }

    fn toggle_degradation(&mut self) {
        if self.sync.phase() == Phase::Degradation {
            self.sync.end_phase();
        } else {
            self.sync.start_degradation_phase();
        }
    }

    fn negative_karma(&mut self) {
        self.sync
            .handle_karma_change(&NEGATIVE_KARMA, &mut self.fragments);
    }

    fn toggle_audio_failure(&mut self) {
        if self.audio.is_none() {
            log::warn!("no audio source configured; nothing to toggle");
            return;
        }
        self.audio_forced_off = !self.audio_forced_off;
        log::info!(
            "simulated audio {}",
            if self.audio_forced_off { "failed" } else { "restored" }
        );
    }

    fn status_line(&self, t: f32) -> String {
        let status = self.sync.status();
        let stats = self.sync.corruption().get_corruption_stats();
        let compensation = if status.compensation.enhanced {
            "enhanced"
        } else if status.compensation.enabled {
            "on"
        } else {
            "off"
        };
        let error = status
            .last_sync_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "t={t:6.1}s phase={:<11} tier={}/{} feedback={:<12} level={:.2} ({}) frags={:>2} avg={:.2} max={:.2} syncs={} comp={compensation} err={error}",
            status.phase.label(),
            status.tier.label(),
            status.quality.label(),
            status.feedback_mode.label(),
            status.global_corruption_level,
            status.degradation.label.as_str(),
            self.fragments.len(),
            stats.average,
            stats.max,
            status.sync_count,
        )
    }

    fn shutdown(&mut self) {
        self.sync.destroy();
        log::info!("scene shut down after {} syncs", self.sync.sync_count());
    }
}

fn crossed(prev_t: f32, t: f32, period: f32, offset: f32) -> bool {
    let slot = |x: f32| ((x - offset) / period).floor();
    t >= offset && slot(t) > slot(prev_t)
}
