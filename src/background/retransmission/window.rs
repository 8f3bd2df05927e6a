//! Operating-hours window for the retransmission job

use chrono::NaiveTime;

/// Daily time window `start..end`; wraps midnight when `end <= start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl OperatingWindow {
    /// Parse `"HH:MM-HH:MM"`
    pub fn parse(raw: &str) -> Option<Self> {
        let (start, end) = raw.trim().split_once('-')?;
        Some(Self {
            start: NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?,
            end: NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?,
        })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}
