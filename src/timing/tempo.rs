use std::time::Duration;

use crate::error::TempoError;

pub const DEFAULT_TICKS_PER_QUARTER: u16 = 480;
/// 120 BPM.
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Division {
    Metrical(u16),
    /// SMPTE timing collapses to a fixed tick rate independent of tempo.
    Timecode { ticks_per_second: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u64,
    pub micros_per_quarter: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    tick: u64,
    micros_per_quarter: u32,
    start_micros: u64,
}

/// Converts between tick positions and wall-clock song time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoMap {
    division: Division,
    segments: Vec<Segment>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self {
            division: Division::Metrical(DEFAULT_TICKS_PER_QUARTER),
            segments: vec![Segment {
                tick: 0,
                micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
                start_micros: 0,
            }],
        }
    }
}

impl TempoMap {
    /// Builds a map from unordered tempo changes. A 120 BPM entry is inserted
    /// at tick 0 when the file does not set one there.
    pub fn new(division: Division, mut changes: Vec<TempoChange>) -> Result<Self, TempoError> {
        match division {
            Division::Metrical(0) => return Err(TempoError::ZeroDivision),
            Division::Timecode {
                ticks_per_second: 0,
            } => return Err(TempoError::ZeroDivision),
            _ => {}
        }
        if let Some(bad) = changes.iter().find(|c| c.micros_per_quarter == 0) {
            return Err(TempoError::ZeroTempo { tick: bad.tick });
        }

        // Stable: of two changes on one tick the later one in the file wins.
        changes.sort_by_key(|c| c.tick);
        if changes.first().map_or(true, |c| c.tick > 0) {
            changes.insert(
                0,
                TempoChange {
                    tick: 0,
                    micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
                },
            );
        }

        let mut segments: Vec<Segment> = Vec::with_capacity(changes.len());
        for change in changes {
            let start_micros = match segments.last() {
                Some(prev) => {
                    prev.start_micros
                        + span_micros(division, prev.micros_per_quarter, change.tick - prev.tick)
                }
                None => 0,
            };
            if let Some(prev) = segments.last_mut() {
                if prev.tick == change.tick {
                    prev.micros_per_quarter = change.micros_per_quarter;
                    continue;
                }
            }
            segments.push(Segment {
                tick: change.tick,
                micros_per_quarter: change.micros_per_quarter,
                start_micros,
            });
        }

        Ok(Self { division, segments })
    }

    pub fn division(&self) -> Division {
        self.division
    }

    pub fn ticks_per_quarter(&self) -> Option<u16> {
        match self.division {
            Division::Metrical(tpq) => Some(tpq),
            Division::Timecode { .. } => None,
        }
    }

    pub fn tempo_changes(&self) -> impl Iterator<Item = TempoChange> + '_ {
        self.segments.iter().map(|s| TempoChange {
            tick: s.tick,
            micros_per_quarter: s.micros_per_quarter,
        })
    }

    pub fn micros_at(&self, tick: u64) -> u64 {
        let idx = self.segments.partition_point(|s| s.tick <= tick);
        // segments[0] is always at tick 0
        let seg = &self.segments[idx.saturating_sub(1)];
        seg.start_micros + span_micros(self.division, seg.micros_per_quarter, tick - seg.tick)
    }

    pub fn duration_at(&self, tick: u64) -> Duration {
        Duration::from_micros(self.micros_at(tick))
    }

    /// Last tick whose time is not after `micros`.
    pub fn tick_at(&self, micros: u64) -> u64 {
        let idx = self.segments.partition_point(|s| s.start_micros <= micros);
        let seg = &self.segments[idx.saturating_sub(1)];
        let elapsed = (micros - seg.start_micros) as u128;
        let ticks = match self.division {
            Division::Metrical(tpq) => elapsed * tpq as u128 / seg.micros_per_quarter as u128,
            Division::Timecode { ticks_per_second } => {
                elapsed * ticks_per_second as u128 / 1_000_000
            }
        };
        seg.tick + ticks as u64
    }
}

fn span_micros(division: Division, micros_per_quarter: u32, ticks: u64) -> u64 {
    let ticks = ticks as u128;
    let micros = match division {
        Division::Metrical(tpq) => ticks * micros_per_quarter as u128 / tpq as u128,
        Division::Timecode { ticks_per_second } => ticks * 1_000_000 / ticks_per_second as u128,
    };
    micros as u64
}
