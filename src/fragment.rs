use crate::element::VisualElement;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: Position) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(String);

impl FragmentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn generate(rng: &mut fastrand::Rng) -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let suffix: String = (0..6).map(|_| rng.alphanumeric()).collect();
        Self(format!("{ms}-{}", suffix.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CorruptionTier {
    Clean,
    Minimal,
    Moderate,
    Severe,
    Complete,
}

impl CorruptionTier {
    pub fn all() -> [Self; 5] {
        [
            Self::Clean,
            Self::Minimal,
            Self::Moderate,
            Self::Severe,
            Self::Complete,
        ]
    }

    pub fn from_level(level: f32) -> Self {
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if level <= 0.0 {
            Self::Clean
        } else if level < 0.3 {
            Self::Minimal
        } else if level < 0.6 {
            Self::Moderate
        } else if level < 0.85 {
            Self::Severe
        } else {
            Self::Complete
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Minimal => "minimal",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Complete => "complete",
        }
    }
}

pub const KARMA_AXIS_LIMIT: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KarmaVector {
    pub computational: f32,
    pub emotional: f32,
    pub temporal: f32,
    pub void: f32,
}

impl KarmaVector {
    pub const fn new(computational: f32, emotional: f32, temporal: f32, void: f32) -> Self {
        Self {
            computational,
            emotional,
            temporal,
            void,
        }
    }

    pub const fn uniform(v: f32) -> Self {
        Self::new(v, v, v, v)
    }

    pub fn sanitized(self) -> Self {
        let fix = |v: f32| {
            if v.is_finite() {
                v.clamp(-KARMA_AXIS_LIMIT, KARMA_AXIS_LIMIT)
            } else {
                0.0
            }
        };
        Self::new(
            fix(self.computational),
            fix(self.emotional),
            fix(self.temporal),
            fix(self.void),
        )
    }

    pub fn sum(&self) -> f32 {
        let k = self.sanitized();
        k.computational + k.emotional + k.temporal + k.void
    }
}

pub struct Fragment {
    id: FragmentId,
    original_text: String,
    current_text: String,
    pub position: Position,
    pub speed: f32,
    corruption: f32,
    tier: CorruptionTier,
    element: Box<dyn VisualElement>,
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.id)
            .field("original_text", &self.original_text)
            .field("current_text", &self.current_text)
            .field("position", &self.position)
            .field("speed", &self.speed)
            .field("corruption", &self.corruption)
            .field("tier", &self.tier)
            .field("mounted", &self.element.is_mounted())
            .finish()
    }
}

impl Fragment {
    pub fn new(id: FragmentId, text: impl Into<String>, mut element: Box<dyn VisualElement>) -> Self {
        let original_text = text.into();
        element.set_text(&original_text);
        let bounds = element.bounds();
        Self {
            id,
            current_text: original_text.clone(),
            original_text,
            position: Position::new(bounds.x, bounds.y),
            speed: 0.0,
            corruption: 0.0,
            tier: CorruptionTier::Clean,
            element,
        }
    }

    pub fn spawn(text: impl Into<String>, element: Box<dyn VisualElement>, rng: &mut fastrand::Rng) -> Self {
        Self::new(FragmentId::generate(rng), text, element)
    }

    pub fn id(&self) -> &FragmentId {
        &self.id
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn current_text(&self) -> &str {
        &self.current_text
    }

    pub fn corruption(&self) -> f32 {
        self.corruption
    }

    pub fn tier(&self) -> CorruptionTier {
        self.tier
    }

    pub fn element(&self) -> &dyn VisualElement {
        self.element.as_ref()
    }

    pub fn element_mut(&mut self) -> &mut dyn VisualElement {
        self.element.as_mut()
    }

    pub fn is_mounted(&self) -> bool {
        self.element.is_mounted()
    }

    pub fn move_to(&mut self, position: Position) {
        self.position = position;
        self.element.set_position(position.x, position.y);
    }

    pub(crate) fn set_corruption(&mut self, level: f32, text: String) {
        self.corruption = level;
        self.tier = CorruptionTier::from_level(level);
        self.element.set_text(&text);
        self.current_text = text;
    }
}
