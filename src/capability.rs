use crate::config::PerformanceTier;
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerStatus {
    pub level: f32,
    pub charging: bool,
}

impl PowerStatus {
    pub fn is_low(&self, threshold: f32) -> bool {
        !self.charging && self.level.is_finite() && self.level < threshold
    }
}

pub trait PowerProbe {
    fn status(&self) -> Option<PowerStatus>;
}

#[derive(Debug, Default)]
pub struct FixedPower {
    status: Cell<Option<PowerStatus>>,
}

impl FixedPower {
    pub fn new(status: Option<PowerStatus>) -> Self {
        Self {
            status: Cell::new(status),
        }
    }

    pub fn set(&self, status: Option<PowerStatus>) {
        self.status.set(status);
    }
}

impl PowerProbe for FixedPower {
    fn status(&self) -> Option<PowerStatus> {
        self.status.get()
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityReport {
    pub auto_probe: bool,
    pub requested_tier: PerformanceTier,
    pub tier: PerformanceTier,
    notes: Vec<String>,
}

impl CapabilityReport {
    pub fn changed(&self) -> bool {
        self.tier != self.requested_tier
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn status_label(&self) -> String {
        if !self.auto_probe {
            return format!("off (tier={})", self.tier.label());
        }
        if self.changed() {
            return format!(
                "fallback tier {}->{}",
                self.requested_tier.label(),
                self.tier.label()
            );
        }
        format!("ok tier={}", self.tier.label())
    }
}

pub fn probe_runtime(
    requested: PerformanceTier,
    auto_probe: bool,
    power: Option<&dyn PowerProbe>,
) -> CapabilityReport {
    let mut report = CapabilityReport {
        auto_probe,
        requested_tier: requested,
        tier: requested,
        notes: Vec::new(),
    };

    if !auto_probe {
        report.push_note("capability probe disabled");
        return report;
    }

    if let Some(forced) = forced_tier() {
        report.tier = forced;
        report.push_note(format!("tier forced to {} by FRAGMENT_SYNC_TIER", forced.label()));
        return report;
    }

    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if cores <= 2 && report.tier == PerformanceTier::High {
        report.tier = PerformanceTier::Medium;
        report.push_note(format!("only {cores} cores available; starting at medium tier"));
    }

    if let Some(status) = power.and_then(|p| p.status()) {
        if status.is_low(0.2) {
            report.tier = report.tier.lower();
            report.push_note("battery low and discharging; lowering tier");
        }
    }

    if report.notes.is_empty() {
        report.push_note("probe kept requested tier");
    }

    report
}

fn forced_tier() -> Option<PerformanceTier> {
    let v = std::env::var("FRAGMENT_SYNC_TIER").ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "high" => Some(PerformanceTier::High),
        "medium" => Some(PerformanceTier::Medium),
        "low" => Some(PerformanceTier::Low),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct TierMonitor {
    base_tier: PerformanceTier,
    tier: PerformanceTier,
    adaptive: bool,
    budget_ms: f32,
    ema_ms: f32,
}

impl TierMonitor {
    pub fn new(base_tier: PerformanceTier, adaptive: bool, budget_ms: f32) -> Self {
        Self {
            base_tier,
            tier: base_tier,
            adaptive,
            budget_ms: budget_ms.max(0.1),
            ema_ms: 0.0,
        }
    }

    pub fn tier(&self) -> PerformanceTier {
        self.tier
    }

    pub fn ema_ms(&self) -> f32 {
        self.ema_ms
    }

    pub fn set_base_tier(&mut self, tier: PerformanceTier) {
        self.base_tier = tier;
        self.tier = tier;
    }

    pub fn update(&mut self, pass_ms: f32) -> Option<PerformanceTier> {
        if !self.adaptive || !pass_ms.is_finite() || pass_ms < 0.0 {
            return None;
        }
        self.ema_ms = if self.ema_ms == 0.0 {
            pass_ms
        } else {
            self.ema_ms * 0.95 + pass_ms * 0.05
        };

        let before = self.tier;
        if self.ema_ms > self.budget_ms * 1.22 {
            self.tier = self.tier.lower();
        } else if self.ema_ms < self.budget_ms * 0.72 && self.tier.rank() < self.base_tier.rank() {
            self.tier = self.tier.higher();
        }
        (self.tier != before).then_some(self.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_lowers_under_load_and_recovers_to_base() {
        let mut m = TierMonitor::new(PerformanceTier::High, true, 4.0);
        assert_eq!(m.update(20.0), Some(PerformanceTier::Medium));
        assert_eq!(m.update(20.0), Some(PerformanceTier::Low));
        assert_eq!(m.update(20.0), None);
        let mut recovered = None;
        for _ in 0..200 {
            if let Some(t) = m.update(0.5) {
                recovered = Some(t);
            }
        }
        assert_eq!(recovered, Some(PerformanceTier::High));
        assert_eq!(m.tier(), PerformanceTier::High);
    }

    #[test]
    fn monitor_average_is_heavily_smoothed() {
        let mut m = TierMonitor::new(PerformanceTier::High, true, 100.0);
        m.update(20.0);
        assert_eq!(m.ema_ms(), 20.0);
        m.update(10.0);
        assert!((m.ema_ms() - 19.5).abs() < 1e-4);
    }

    #[test]
    fn fixed_monitor_ignores_measurements() {
        let mut m = TierMonitor::new(PerformanceTier::Medium, false, 4.0);
        assert_eq!(m.update(100.0), None);
        assert_eq!(m.tier(), PerformanceTier::Medium);
    }

    #[test]
    fn low_battery_lowers_probe_tier() {
        let power = FixedPower::new(Some(PowerStatus {
            level: 0.1,
            charging: false,
        }));
        let report = probe_runtime(PerformanceTier::Medium, true, Some(&power));
        if std::env::var("FRAGMENT_SYNC_TIER").is_err() {
            assert_eq!(report.tier, PerformanceTier::Low);
            assert!(report.changed());
        }
    }
}
