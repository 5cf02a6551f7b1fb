use crate::audio::{DegradationLabel, DegradationSignal, parse_audio_level};
use crate::config::SyncQuality;
use crate::element::{STYLE_CORRUPTION_INTENSITY, VisualTag};
use crate::fragment::{CorruptionTier, Fragment, FragmentId, KarmaVector};
use crate::telemetry::{Payload, TelemetrySink};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

const FULL_GLYPHS: [char; 16] = [
    '#', '%', '&', '@', '*', '\u{2591}', '\u{2592}', '\u{2593}', '\u{2588}', '\u{00a4}', '\u{00a7}',
    '\u{00d8}', '\u{2206}', '\u{2260}', '\u{00bf}', '/',
];
const REDUCED_GLYPHS: [char; 3] = ['#', '*', '%'];
const ALT_GLYPH: char = '?';

#[derive(Debug, Clone, PartialEq)]
pub struct CorruptionConfig {
    pub weight_computational: f32,
    pub weight_emotional: f32,
    pub weight_temporal: f32,
    pub weight_void: f32,
    pub rate: f32,
    pub max_step: f32,
    pub purification_strength: f32,
    pub sync_pull: f32,
    pub fidelity: SyncQuality,
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            weight_computational: 0.25,
            weight_emotional: 0.25,
            weight_temporal: 0.2,
            weight_void: 0.3,
            rate: 0.01,
            max_step: 0.1,
            purification_strength: 0.3,
            sync_pull: 0.25,
            fidelity: SyncQuality::Full,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CorruptionRecord {
    level: f32,
    seed: u32,
    purifications: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CorruptionStats {
    pub total: usize,
    pub average: f32,
    pub min: f32,
    pub max: f32,
    pub global_level: f32,
}

pub struct CorruptionEngine {
    config: CorruptionConfig,
    records: BTreeMap<FragmentId, CorruptionRecord>,
    global_level: f32,
    global_label: DegradationLabel,
    telemetry: Rc<dyn TelemetrySink>,
    destroyed: bool,
}

impl fmt::Debug for CorruptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorruptionEngine")
            .field("global_level", &self.global_level)
            .field("global_label", &self.global_label)
            .field("tracked", &self.records.len())
            .field("fidelity", &self.config.fidelity)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl CorruptionEngine {
    pub fn new(config: CorruptionConfig, telemetry: Rc<dyn TelemetrySink>) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
            global_level: 0.0,
            global_label: DegradationLabel::Minimal,
            telemetry,
            destroyed: false,
        }
    }

    pub fn config(&self) -> &CorruptionConfig {
        &self.config
    }

    pub fn global_level(&self) -> f32 {
        self.global_level
    }

    pub fn global_label(&self) -> DegradationLabel {
        self.global_label
    }

    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }

    pub fn corruption_level(&self, id: &FragmentId) -> Option<f32> {
        self.records.get(id).map(|r| r.level)
    }

    pub fn purification_count(&self, id: &FragmentId) -> Option<u32> {
        self.records.get(id).map(|r| r.purifications)
    }

    pub fn set_text_fidelity(&mut self, fidelity: SyncQuality) {
        self.config.fidelity = fidelity;
    }

    /// Starts tracking `fragment` at the global floor and paints it. An
    /// already tracked fragment keeps its level and is only repainted.
    pub fn initialize_clean_fragment(&mut self, fragment: &mut Fragment) -> f32 {
        if self.destroyed {
            return self.global_level;
        }
        let floor = self.global_level;
        self.records
            .entry(fragment.id().clone())
            .or_insert_with(|| CorruptionRecord {
                level: floor,
                seed: seed_for(fragment.id()),
                purifications: 0,
            });
        self.apply_visual_corruption(fragment);
        fragment.corruption()
    }

    pub fn karma_delta(&self, karma: &KarmaVector) -> f32 {
        let k = karma.sanitized();
        let weighted = k.computational * self.config.weight_computational
            + k.emotional * self.config.weight_emotional
            + k.temporal * self.config.weight_temporal
            + k.void * self.config.weight_void;
        let delta = ((-weighted).max(0.0) * self.config.rate).min(self.config.max_step);
        if delta.is_finite() { delta.max(0.0) } else { 0.0 }
    }

    pub fn apply_progressive_corruption(&mut self, fragment: &mut Fragment, karma: &KarmaVector) -> f32 {
        if self.destroyed {
            return fragment.corruption();
        }
        if !self.records.contains_key(fragment.id()) {
            self.initialize_clean_fragment(fragment);
        }
        let delta = self.karma_delta(karma);
        if let Some(record) = self.records.get_mut(fragment.id()) {
            record.level = (record.level + delta).min(1.0);
        }
        if delta > 0.0 {
            fragment.element_mut().remove_tag(VisualTag::Purifying);
        }
        self.apply_visual_corruption(fragment);
        fragment.corruption()
    }

    pub fn apply_visual_corruption(&mut self, fragment: &mut Fragment) -> CorruptionTier {
        let (level, seed) = match self.records.get(fragment.id()) {
            Some(r) => (r.level, r.seed),
            None => (clamp01(fragment.corruption()), seed_for(fragment.id())),
        };
        let tier = CorruptionTier::from_level(level);
        let text = corrupt_text(fragment.original_text(), level, seed, self.config.fidelity);

        let element = fragment.element_mut();
        for other in CorruptionTier::all() {
            if other != tier {
                element.remove_tag(VisualTag::Corruption(other));
            }
        }
        element.add_tag(VisualTag::Corruption(tier));
        element.set_style_var(STYLE_CORRUPTION_INTENSITY, level);
        fragment.set_corruption(level, text);
        tier
    }

    pub fn purify_on_recognition<'a, I>(&mut self, fragments: I) -> usize
    where
        I: IntoIterator<Item = &'a mut Fragment>,
    {
        if self.destroyed {
            return 0;
        }
        let strength = self.config.purification_strength.max(0.0);
        let mut attempted = 0;
        for fragment in fragments {
            if !self.records.contains_key(fragment.id()) {
                self.initialize_clean_fragment(fragment);
            }
            if let Some(record) = self.records.get_mut(fragment.id()) {
                record.level = (record.level - strength).max(0.0);
                record.purifications += 1;
            }
            fragment.element_mut().add_tag(VisualTag::Purifying);
            self.apply_visual_corruption(fragment);
            attempted += 1;
        }
        self.telemetry.record_event(
            "fragments_purified",
            Payload::new()
                .with("count", attempted)
                .with("strength", strength),
        );
        attempted
    }

    pub fn sync_with_audio_degradation(&mut self, signal: &DegradationSignal) -> f32 {
        let level = parse_audio_level(signal);
        if self.destroyed {
            return level;
        }
        self.global_level = level;
        self.global_label = DegradationLabel::from_level(level);

        let pull = self.config.sync_pull.clamp(0.0, 1.0);
        let mut raised = 0usize;
        for record in self.records.values_mut() {
            if record.level < level {
                record.level = (record.level + (level - record.level) * pull).min(level);
                raised += 1;
            }
        }
        self.telemetry.record_event(
            "corruption_synced",
            Payload::new()
                .with("level", level)
                .with("label", self.global_label.as_str())
                .with("raised", raised),
        );
        level
    }

    pub fn refresh<'a, I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = &'a mut Fragment>,
    {
        for fragment in fragments {
            if self.records.contains_key(fragment.id()) {
                self.apply_visual_corruption(fragment);
            }
        }
    }

    pub fn get_corruption_stats(&self) -> CorruptionStats {
        let total = self.records.len();
        if total == 0 {
            return CorruptionStats {
                global_level: self.global_level,
                ..CorruptionStats::default()
            };
        }
        let mut sum = 0.0f32;
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for r in self.records.values() {
            sum += r.level;
            min = min.min(r.level);
            max = max.max(r.level);
        }
        CorruptionStats {
            total,
            average: sum / total as f32,
            min,
            max,
            global_level: self.global_level,
        }
    }

    pub fn unregister_fragment(&mut self, id: &FragmentId) -> bool {
        self.records.remove(id).is_some()
    }

    pub fn destroy(&mut self) {
        self.records.clear();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Deterministic glyph corruption: character `i` is replaced when its hash
/// falls under `level`, so anything replaced at one level stays replaced at
/// every higher level. Whitespace is kept so word shapes survive.
pub fn corrupt_text(original: &str, level: f32, seed: u32, fidelity: SyncQuality) -> String {
    let level = clamp01(level);
    if level <= 0.0 {
        return original.to_string();
    }
    let glyphs: &[char] = match fidelity {
        SyncQuality::Full => &FULL_GLYPHS,
        SyncQuality::Reduced => &REDUCED_GLYPHS,
        SyncQuality::Minimal => &['#'],
    };
    original
        .chars()
        .enumerate()
        .map(|(i, ch)| {
            if ch.is_whitespace() {
                return ch;
            }
            let key = seed ^ (i as u32).wrapping_mul(0x9e37_79b9);
            if hash01(key) >= level {
                return ch;
            }
            let pick = (hash01(key ^ 0x51ed_270b) * glyphs.len() as f32) as usize;
            let glyph = glyphs[pick.min(glyphs.len() - 1)];
            if glyph != ch {
                glyph
            } else {
                glyphs.iter().copied().find(|g| *g != ch).unwrap_or(ALT_GLYPH)
            }
        })
        .collect()
}

fn seed_for(id: &FragmentId) -> u32 {
    // FNV-1a over the id bytes.
    id.as_str()
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193))
}

fn hash01(x: u32) -> f32 {
    let mut v = x;
    v ^= v >> 16;
    v = v.wrapping_mul(0x7feb_352d);
    v ^= v >> 15;
    v = v.wrapping_mul(0x846c_a68b);
    v ^= v >> 16;
    // top 24 bits are exact in f32, so the result stays below 1.0
    (v >> 8) as f32 / (1u32 << 24) as f32
}

fn clamp01(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}
