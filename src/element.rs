use crate::fragment::{CorruptionTier, Position};

pub const STYLE_CORRUPTION_INTENSITY: &str = "corruption-intensity";
pub const STYLE_DRIFT_DURATION: &str = "drift-duration";
pub const STYLE_TRANSITION_MS: &str = "transition-ms";
pub const STYLE_GUIDANCE: &str = "guidance";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualTag {
    Corruption(CorruptionTier),
    Purifying,
    Repositioning,
    Compensated,
}

impl VisualTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Corruption(CorruptionTier::Clean) => "corruption-clean",
            Self::Corruption(CorruptionTier::Minimal) => "corruption-minimal",
            Self::Corruption(CorruptionTier::Moderate) => "corruption-moderate",
            Self::Corruption(CorruptionTier::Severe) => "corruption-severe",
            Self::Corruption(CorruptionTier::Complete) => "corruption-complete",
            Self::Purifying => "purifying",
            Self::Repositioning => "repositioning",
            Self::Compensated => "compensated",
        }
    }
}

pub trait VisualElement {
    fn is_mounted(&self) -> bool;
    fn bounds(&self) -> Rect;
    fn font_size(&self) -> f32;
    fn opacity(&self) -> f32;

    fn set_position(&mut self, x: f32, y: f32);
    fn set_text(&mut self, text: &str);
    fn set_style_var(&mut self, name: &'static str, value: f32);
    fn style_var(&self, name: &str) -> Option<f32>;

    fn add_tag(&mut self, tag: VisualTag);
    fn remove_tag(&mut self, tag: VisualTag);
    fn has_tag(&self, tag: VisualTag) -> bool;
}

#[derive(Debug, Clone)]
pub struct MemoryElement {
    mounted: bool,
    position: Position,
    font_size: f32,
    opacity: f32,
    text: String,
    vars: Vec<(&'static str, f32)>,
    tags: Vec<VisualTag>,
}

impl Default for MemoryElement {
    fn default() -> Self {
        Self {
            mounted: true,
            position: Position::new(0.0, 0.0),
            font_size: 16.0,
            opacity: 1.0,
            text: String::new(),
            vars: Vec::new(),
            tags: Vec::new(),
        }
    }
}

impl MemoryElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, font_size: f32, opacity: f32) -> Self {
        self.font_size = font_size;
        self.opacity = opacity;
        self
    }

    pub fn detached() -> Self {
        Self {
            mounted: false,
            ..Self::default()
        }
    }

    pub fn set_mounted(&mut self, mounted: bool) {
        self.mounted = mounted;
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tags(&self) -> &[VisualTag] {
        &self.tags
    }
}

impl VisualElement for MemoryElement {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn bounds(&self) -> Rect {
        let glyphs = self.text.chars().count().max(1) as f32;
        Rect {
            x: self.position.x,
            y: self.position.y,
            width: glyphs * self.font_size * 0.55,
            height: self.font_size * 1.2,
        }
    }

    fn font_size(&self) -> f32 {
        self.font_size
    }

    fn opacity(&self) -> f32 {
        self.opacity
    }

    fn set_position(&mut self, x: f32, y: f32) {
        self.position = Position::new(x, y);
    }

    fn set_text(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
    }

    fn set_style_var(&mut self, name: &'static str, value: f32) {
        match self.vars.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name, value)),
        }
    }

    fn style_var(&self, name: &str) -> Option<f32> {
        self.vars.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }

    fn add_tag(&mut self, tag: VisualTag) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    fn remove_tag(&mut self, tag: VisualTag) {
        self.tags.retain(|t| *t != tag);
    }

    fn has_tag(&self, tag: VisualTag) -> bool {
        self.tags.contains(&tag)
    }
}
