//! Crash-Scenario Replay Driver (C7): deterministic historical bar replay
//! driven by a monotonic simulation clock, never wall-clock time.

use std::fmt;

use crate::error::AppError;

/// Nanoseconds since the Unix epoch. i64 gives ~292 years of range.
pub type Nanos = i64;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Monotonic simulation clock. `advance_to` only moves forward; every
/// replay timestamp is derived from this clock, never from system time.
#[derive(Debug, Clone)]
pub struct SimClock {
    current: Nanos,
}

impl SimClock {
    pub fn new(start_time: Nanos) -> Self {
        Self { current: start_time }
    }

    pub fn now(&self) -> Nanos {
        self.current
    }

    pub fn advance_to(&mut self, new_time: Nanos) {
        debug_assert!(
            new_time >= self.current,
            "SimClock: cannot go backward from {} to {}",
            self.current,
            new_time
        );
        self.current = new_time;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.current / NANOS_PER_SEC;
        let nanos = self.current % NANOS_PER_SEC;
        write!(f, "{secs}.{nanos:09}s")
    }
}

/// A single OHLCV bar belonging to a named scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSample {
    pub ts: Nanos,
    pub symbol: String,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl BarSample {
    pub fn into_replay_bar(self, scenario_id: &str) -> crate::proposal::ReplayBar {
        crate::proposal::ReplayBar {
            scenario_id: scenario_id.to_string(),
            ts: self.ts,
            symbol: self.symbol,
            o: self.o,
            h: self.h,
            l: self.l,
            c: self.c,
            v: self.v,
        }
    }
}

/// Source of historical bars for a named scenario.
pub trait ScenarioStore: Send + Sync {
    fn bars(&self, scenario_id: &str) -> Option<Vec<BarSample>>;
    fn scenario_ids(&self) -> Vec<&'static str>;
}

fn bar(ts_offset_days: i64, symbol: &str, o: f64, h: f64, l: f64, c: f64, v: f64) -> BarSample {
    BarSample {
        ts: ts_offset_days * 86_400 * NANOS_PER_SEC,
        symbol: symbol.to_string(),
        o,
        h,
        l,
        c,
        v,
    }
}

/// The three built-in crash scenarios named in the catalogue. Bar data is
/// a small synthetic OHLCV sequence capturing the shape of each crash
/// (sharp drawdown, partial recovery) rather than a verbatim historical
/// tape.
pub struct BuiltinScenarios;

impl ScenarioStore for BuiltinScenarios {
    fn bars(&self, scenario_id: &str) -> Option<Vec<BarSample>> {
        let mut bars = match scenario_id {
            "2008_crisis" => vec![
                bar(0, "SPY", 130.0, 131.0, 128.0, 129.0, 2.0e8),
                bar(1, "SPY", 129.0, 129.5, 110.0, 112.0, 6.5e8),
                bar(2, "SPY", 112.0, 115.0, 98.0, 101.0, 8.0e8),
                bar(3, "SPY", 101.0, 108.0, 100.0, 106.0, 5.0e8),
            ],
            "2020_covid" => vec![
                bar(0, "SPY", 338.0, 339.0, 330.0, 332.0, 3.0e8),
                bar(1, "SPY", 332.0, 333.0, 282.0, 285.0, 9.0e8),
                bar(2, "SPY", 285.0, 295.0, 240.0, 252.0, 1.1e9),
                bar(3, "SPY", 252.0, 280.0, 250.0, 278.0, 7.0e8),
            ],
            "2022_bear" => vec![
                bar(0, "SPY", 477.0, 479.0, 470.0, 472.0, 2.5e8),
                bar(30, "SPY", 460.0, 462.0, 415.0, 420.0, 4.0e8),
                bar(60, "SPY", 420.0, 425.0, 390.0, 395.0, 4.5e8),
                bar(90, "SPY", 395.0, 410.0, 362.0, 380.0, 5.0e8),
            ],
            _ => return None,
        };
        bars.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.symbol.cmp(&b.symbol)));
        Some(bars)
    }

    fn scenario_ids(&self) -> Vec<&'static str> {
        vec!["2008_crisis", "2020_covid", "2022_bear"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Loaded,
    Running,
    Paused,
    Stopped,
}

/// Drives a loaded scenario's bars one at a time, advancing the
/// simulation clock to each bar's timestamp as it is emitted.
pub struct ReplayDriver {
    scenario_id: Option<String>,
    bars: Vec<BarSample>,
    cursor: usize,
    clock: SimClock,
    speed: f64,
    state: ReplayState,
}

impl ReplayDriver {
    pub fn new() -> Self {
        Self {
            scenario_id: None,
            bars: Vec::new(),
            cursor: 0,
            clock: SimClock::default(),
            speed: 1.0,
            state: ReplayState::Idle,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn load(&mut self, store: &dyn ScenarioStore, scenario_id: &str, speed: f64) -> Result<(), AppError> {
        let bars = store
            .bars(scenario_id)
            .ok_or_else(|| AppError::MalformedProposal(format!("unknown replay scenario {scenario_id}")))?;
        self.scenario_id = Some(scenario_id.to_string());
        self.clock = SimClock::new(bars.first().map(|b| b.ts).unwrap_or(0));
        self.bars = bars;
        self.cursor = 0;
        self.speed = speed;
        self.state = ReplayState::Loaded;
        Ok(())
    }

    pub fn start(&mut self) {
        if self.state == ReplayState::Loaded {
            self.state = ReplayState::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.state == ReplayState::Running {
            self.state = ReplayState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == ReplayState::Paused {
            self.state = ReplayState::Running;
        }
    }

    pub fn stop(&mut self) {
        self.state = ReplayState::Stopped;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Emits the next bar in deterministic order, advancing the clock to
    /// its timestamp. Returns `None` (and transitions to `Stopped`) once
    /// the scenario is exhausted or the driver is not `Running`.
    pub fn step(&mut self) -> Option<BarSample> {
        if self.state != ReplayState::Running {
            return None;
        }
        match self.bars.get(self.cursor).cloned() {
            Some(bar) => {
                self.clock.advance_to(bar.ts);
                self.cursor += 1;
                Some(bar)
            }
            None => {
                self.state = ReplayState::Stopped;
                None
            }
        }
    }

    pub fn remaining(&self) -> usize {
        self.bars.len().saturating_sub(self.cursor)
    }

    pub fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }
}

impl Default for ReplayDriver {
    fn default() -> Self {
        Self::new()
    }
}
