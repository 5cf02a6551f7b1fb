use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "fragment-sync", version, about = "Drifting text fragments kept readable while they degrade with the audio")]
pub struct Config {
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    #[arg(long, default_value_t = 600)]
    pub ticks: u32,

    #[arg(long, default_value_t = 50)]
    pub tick_ms: u64,

    #[arg(long, default_value_t = 1024.0)]
    pub width: f32,

    #[arg(long, default_value_t = 768.0)]
    pub height: f32,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = PerformanceTier::High)]
    pub tier: PerformanceTier,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub adaptive_tier: bool,

    #[arg(long, value_enum, default_value_t = AudioMode::Simulated)]
    pub audio: AudioMode,

    #[arg(long, default_value_t = 6.0)]
    pub seconds_per_label: f32,

    #[arg(long)]
    pub script: Option<String>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub script_loop: bool,

    #[arg(long)]
    pub tuning: Option<String>,

    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioMode {
    Simulated,
    #[value(alias = "none", alias = "off")]
    Absent,
    Flaky,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum PerformanceTier {
    High,
    Medium,
    Low,
}

impl PerformanceTier {
    pub fn lower(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low => Self::Low,
        }
    }

    pub fn higher(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::High,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub fn sync_quality(self) -> SyncQuality {
        match self {
            Self::High => SyncQuality::Full,
            Self::Medium => SyncQuality::Reduced,
            Self::Low => SyncQuality::Minimal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncQuality {
    Full,
    Reduced,
    Minimal,
}

impl SyncQuality {
    pub fn throttle_scale(self) -> u32 {
        match self {
            Self::Full => 1,
            Self::Reduced => 2,
            Self::Minimal => 4,
        }
    }

    pub fn is_reduced(self) -> bool {
        self != Self::Full
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Reduced => "reduced",
            Self::Minimal => "minimal",
        }
    }
}
