use crate::fragment::{FragmentId, KarmaVector};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DegradationLabel {
    Minimal,
    Moderate,
    Severe,
    Complete,
}

impl DegradationLabel {
    pub fn all() -> [Self; 4] {
        [Self::Minimal, Self::Moderate, Self::Severe, Self::Complete]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "moderate" => Some(Self::Moderate),
            "severe" => Some(Self::Severe),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Complete => "complete",
        }
    }

    pub fn anchor(self) -> f32 {
        match self {
            Self::Minimal => 0.15,
            Self::Moderate => 0.45,
            Self::Severe => 0.75,
            Self::Complete => 1.0,
        }
    }

    pub fn from_level(level: f32) -> Self {
        let level = normalize_level(level);
        if level < 0.3 {
            Self::Minimal
        } else if level < 0.6 {
            Self::Moderate
        } else if level < 0.875 {
            Self::Severe
        } else {
            Self::Complete
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DegradationSignal {
    Level(f32),
    Label(DegradationLabel),
    Text(String),
}

impl From<f32> for DegradationSignal {
    fn from(v: f32) -> Self {
        Self::Level(v)
    }
}

impl From<DegradationLabel> for DegradationSignal {
    fn from(v: DegradationLabel) -> Self {
        Self::Label(v)
    }
}

impl From<&str> for DegradationSignal {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

pub fn normalize_level(level: f32) -> f32 {
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn parse_audio_level(signal: &DegradationSignal) -> f32 {
    match signal {
        DegradationSignal::Level(v) => normalize_level(*v),
        DegradationSignal::Label(label) => label.anchor(),
        DegradationSignal::Text(raw) => {
            if let Some(label) = DegradationLabel::parse(raw) {
                return label.anchor();
            }
            raw.trim()
                .parse::<f32>()
                .map(normalize_level)
                .unwrap_or(0.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioParameters {
    pub distortion: f32,
    pub reverb: f32,
    pub filter: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecognitionFeedback {
    pub fragment_ids: Vec<FragmentId>,
    pub strength: f32,
}

pub trait AudioStatusProvider {
    fn is_initialized(&self) -> bool;
    fn degradation_state(&self) -> DegradationSignal;
    fn audio_parameters(&self) -> AudioParameters;

    fn on_recognition(&self, _feedback: &RecognitionFeedback) {}
    fn on_karma(&self, _karma: &KarmaVector) {}
}

#[derive(Debug)]
pub struct SimulatedAudio {
    initialized: Cell<bool>,
    signal: RefCell<DegradationSignal>,
    params: Cell<AudioParameters>,
    recognitions: Cell<usize>,
    karma_updates: Cell<usize>,
}

impl Default for SimulatedAudio {
    fn default() -> Self {
        Self {
            initialized: Cell::new(true),
            signal: RefCell::new(DegradationSignal::Level(0.0)),
            params: Cell::new(AudioParameters::default()),
            recognitions: Cell::new(0),
            karma_updates: Cell::new(0),
        }
    }
}

impl SimulatedAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uninitialized() -> Self {
        let audio = Self::default();
        audio.initialized.set(false);
        audio
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.set(initialized);
    }

    pub fn set_signal(&self, signal: impl Into<DegradationSignal>) {
        let signal = signal.into();
        let level = parse_audio_level(&signal);
        self.params.set(AudioParameters {
            distortion: level,
            reverb: 0.2 + level * 0.6,
            filter: 1.0 - level * 0.7,
        });
        *self.signal.borrow_mut() = signal;
    }

    pub fn recognitions(&self) -> usize {
        self.recognitions.get()
    }

    pub fn karma_updates(&self) -> usize {
        self.karma_updates.get()
    }
}

impl AudioStatusProvider for SimulatedAudio {
    fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    fn degradation_state(&self) -> DegradationSignal {
        self.signal.borrow().clone()
    }

    fn audio_parameters(&self) -> AudioParameters {
        self.params.get()
    }

    fn on_recognition(&self, _feedback: &RecognitionFeedback) {
        self.recognitions.set(self.recognitions.get() + 1);
    }

    fn on_karma(&self, _karma: &KarmaVector) {
        self.karma_updates.set(self.karma_updates.get() + 1);
    }
}
