use crate::corruption::CorruptionConfig;
use crate::geometry::GeometryConfig;
use crate::motion::MotionConfig;
use crate::sync::SyncConfig;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TuningError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tuning {
    pub geometry: GeometryConfig,
    pub motion: MotionConfig,
    pub corruption: CorruptionConfig,
    pub sync: SyncConfig,
}

impl Tuning {
    pub fn load(path: &Path) -> Result<Self, TuningError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TuningError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, TuningError> {
        let mut tuning = Self::default();
        let mut geometry_range_line = None;
        let mut motion_range_line = None;
        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once('=') else {
                return Err(TuningError::Parse {
                    line: line_no,
                    message: "expected <section.key>=<value>".to_string(),
                });
            };
            let key = key_raw.trim();
            let value = value_raw.trim();
            if !tuning.set(key, value, line_no)? {
                log::warn!("tuning line {line_no}: unknown key '{key}' ignored");
            }
            match key {
                "geometry.min_speed" | "geometry.max_speed" => geometry_range_line = Some(line_no),
                "motion.min_speed" | "motion.max_speed" => motion_range_line = Some(line_no),
                _ => {}
            }
        }
        if let Some(line) = geometry_range_line {
            speed_range("geometry", tuning.geometry.min_speed, tuning.geometry.max_speed, line)?;
        }
        if let Some(line) = motion_range_line {
            speed_range("motion", tuning.motion.min_speed, tuning.motion.max_speed, line)?;
        }
        Ok(tuning)
    }

    fn set(&mut self, key: &str, value: &str, line: usize) -> Result<bool, TuningError> {
        let num = || parse_num(value, line, key);
        let ms = || parse_num(value, line, key).map(|v| Duration::from_millis(v.max(0.0) as u64));
        let g = &mut self.geometry;
        let m = &mut self.motion;
        let c = &mut self.corruption;
        let s = &mut self.sync;
        match key {
            "geometry.margin_top" => g.margins.top = num()?,
            "geometry.margin_bottom" => g.margins.bottom = num()?,
            "geometry.margin_left" => g.margins.left = num()?,
            "geometry.margin_right" => g.margins.right = num()?,
            "geometry.min_zone_width" => g.min_zone_width = num()?,
            "geometry.min_zone_height" => g.min_zone_height = num()?,
            "geometry.min_speed" => g.min_speed = num()?,
            "geometry.max_speed" => g.max_speed = num()?,
            "geometry.length_ratio" => g.length_ratio = num()?,
            "geometry.readability_threshold" => g.readability_threshold = unit(num()?, line, key)?,
            "geometry.center_bias" => g.center_bias = unit(num()?, line, key)?,
            "geometry.degradation_bias_slope" => g.degradation_bias_slope = num()?,
            "geometry.min_center_bias" => g.min_center_bias = unit(num()?, line, key)?,
            "geometry.edge_threshold" => g.edge_threshold = unit(num()?, line, key)?,
            "geometry.min_font_size" => g.min_font_size = num()?,
            "geometry.min_opacity" => g.min_opacity = unit(num()?, line, key)?,
            "geometry.resize_threshold" => g.resize_threshold = num()?,
            "geometry.resize_debounce_ms" => g.resize_debounce = ms()?,
            "geometry.monitor_interval_ms" => g.monitor_interval = ms()?,
            "geometry.reposition_transition_ms" => g.reposition_transition_ms = num()?,

            "motion.min_speed" => m.min_speed = num()?,
            "motion.max_speed" => m.max_speed = num()?,
            "motion.length_ratio" => m.length_ratio = num()?,
            "motion.words_per_minute" => m.words_per_minute = num()?,
            "motion.reading_buffer" => m.reading_buffer = num()?,
            "motion.min_reading_time_s" => m.min_reading_time_s = num()?,
            "motion.travel_distance" => m.travel_distance = num()?,
            "motion.speed_factor" => m.speed_factor = num()?,
            "motion.acceleration" => m.acceleration = num()?,
            "motion.deceleration" => m.deceleration = num()?,
            "motion.update_interval_ms" => m.update_interval = ms()?,
            "motion.snap_threshold" => m.snap_threshold = num()?,
            "motion.smoothing_cutoff" => m.smoothing_cutoff = unit(num()?, line, key)?,
            "motion.chaos_threshold" => m.chaos_threshold = unit(num()?, line, key)?,
            "motion.chaos_min" => m.chaos_min = num()?,
            "motion.chaos_max" => m.chaos_max = num()?,
            "motion.crowding_threshold" => m.crowding_threshold = num()?.max(0.0) as usize,
            "motion.crowding_skip" => m.crowding_skip = unit(num()?, line, key)?,
            "motion.low_battery_level" => m.low_battery_level = unit(num()?, line, key)?,
            "motion.low_battery_skip" => m.low_battery_skip = unit(num()?, line, key)?,

            "corruption.weight_computational" => c.weight_computational = num()?,
            "corruption.weight_emotional" => c.weight_emotional = num()?,
            "corruption.weight_temporal" => c.weight_temporal = num()?,
            "corruption.weight_void" => c.weight_void = num()?,
            "corruption.rate" => c.rate = num()?,
            "corruption.max_step" => c.max_step = unit(num()?, line, key)?,
            "corruption.purification_strength" => c.purification_strength = unit(num()?, line, key)?,
            "corruption.sync_pull" => c.sync_pull = unit(num()?, line, key)?,

            "sync.throttle_window_ms" => s.throttle_window = ms()?,
            "sync.sync_interval_ms" => s.sync_interval = ms()?,
            "sync.sync_threshold" => s.sync_threshold = unit(num()?, line, key)?,
            "sync.enhance_after" => s.enhance_after = num()?.max(0.0) as u32,
            "sync.guidance_multiplier" => s.guidance_multiplier = num()?,
            "sync.pass_budget_ms" => s.pass_budget_ms = num()?,
            "sync.adaptive_tier" => {
                s.adaptive_tier = parse_bool(value).ok_or_else(|| TuningError::Parse {
                    line,
                    message: format!("{key} must be true/false"),
                })?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_num(raw: &str, line: usize, key: &str) -> Result<f32, TuningError> {
    match raw.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TuningError::Parse {
            line,
            message: format!("{key} expects a number, got '{raw}'"),
        }),
    }
}

fn unit(v: f32, line: usize, key: &str) -> Result<f32, TuningError> {
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(TuningError::Parse {
            line,
            message: format!("{key} must be within [0,1], got {v}"),
        })
    }
}

fn speed_range(section: &str, min: f32, max: f32, line: usize) -> Result<(), TuningError> {
    if min < 0.0 || min > max {
        return Err(TuningError::Parse {
            line,
            message: format!("{section}.min_speed ({min}) must be within [0, {section}.max_speed ({max})]"),
        });
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
