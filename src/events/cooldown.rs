//! 告警冷却: 同类事件在冷却期内只上报一次

use chrono::{DateTime, Local, TimeDelta};

use super::EventKind;

pub struct CooldownGate {
    window: TimeDelta,
    last_collision: Option<DateTime<Local>>,
    last_fire: Option<DateTime<Local>>,
}

impl CooldownGate {
    /// `window` 为 0 时每帧都上报
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or_else(|_| TimeDelta::days(365)),
            last_collision: None,
            last_fire: None,
        }
    }

    fn slot(&mut self, kind: EventKind) -> &mut Option<DateTime<Local>> {
        match kind {
            EventKind::Collision => &mut self.last_collision,
            EventKind::Fire => &mut self.last_fire,
        }
    }

    /// 是否允许上报; 允许时记录本次时间
    pub fn admit(&mut self, kind: EventKind, at: DateTime<Local>) -> bool {
        let window = self.window;
        let slot = self.slot(kind);
        let open = match *slot {
            None => true,
            Some(last) => at < last || at - last >= window,
        };
        if open {
            *slot = Some(at);
        }
        open
    }

    pub fn reset(&mut self) {
        self.last_collision = None;
        self.last_fire = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cooldown_per_kind() {
        let mut gate = CooldownGate::new(Duration::from_secs(10));
        let t0 = Local::now();
        assert!(gate.admit(EventKind::Collision, t0));
        assert!(!gate.admit(EventKind::Collision, t0 + TimeDelta::seconds(5)));
        assert!(gate.admit(EventKind::Fire, t0 + TimeDelta::seconds(5)));
        assert!(gate.admit(EventKind::Collision, t0 + TimeDelta::seconds(10)));
    }

    #[test]
    fn test_zero_window_admits_every_frame() {
        let mut gate = CooldownGate::new(Duration::ZERO);
        let t0 = Local::now();
        assert!(gate.admit(EventKind::Fire, t0));
        assert!(gate.admit(EventKind::Fire, t0));
    }

    #[test]
    fn test_reset() {
        let mut gate = CooldownGate::new(Duration::from_secs(60));
        let t0 = Local::now();
        assert!(gate.admit(EventKind::Fire, t0));
        gate.reset();
        assert!(gate.admit(EventKind::Fire, t0));
    }
}
