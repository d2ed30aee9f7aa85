//! Frame statistics.
//!
//! Per-phase timings collected by the frame loop, shown by the F2 overlay
//! and logged every 60th frame at debug level.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frames averaged by the overlay.
const WINDOW: usize = 60;

/// Phases of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Build,
    Solve,
    Input,
    Draw,
    Present,
}

impl Phase {
    pub const ALL: [Phase; 5] = [Phase::Build, Phase::Solve, Phase::Input, Phase::Draw, Phase::Present];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Solve => "solve",
            Phase::Input => "input",
            Phase::Draw => "draw",
            Phase::Present => "present",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    phases: [Duration; 5],
    nodes: usize,
    items: usize,
}

/// Rolling frame statistics.
#[derive(Debug, Default)]
pub struct FrameStats {
    frame: u64,
    current: Sample,
    history: VecDeque<Sample>,
    /// Overlay visibility (F2).
    pub visible: bool,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Time `f` and add it to `phase` of the current frame.
    pub fn measure<T>(&mut self, phase: Phase, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(phase, start.elapsed());
        result
    }

    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        self.current.phases[phase as usize] += elapsed;
    }

    pub fn counts(&mut self, nodes: usize, items: usize) {
        self.current.nodes = nodes;
        self.current.items = items;
    }

    /// Close the current frame.
    pub fn end_frame(&mut self) {
        let sample = std::mem::take(&mut self.current);
        if self.frame % 60 == 0 {
            tracing::debug!(
                frame = self.frame,
                nodes = sample.nodes,
                items = sample.items,
                total = ?sample.phases.iter().sum::<Duration>(),
                "frame timing"
            );
        }
        self.history.push_back(sample);
        if self.history.len() > WINDOW {
            self.history.pop_front();
        }
        self.frame += 1;
    }

    /// Mean duration of a phase over the window.
    pub fn average(&self, phase: Phase) -> Duration {
        if self.history.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.history.iter().map(|s| s.phases[phase as usize]).sum();
        sum / self.history.len() as u32
    }

    /// Overlay lines.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("frame {}", self.frame)];
        for phase in Phase::ALL {
            lines.push(format!("{}: {:.2?}", phase.label(), self.average(phase)));
        }
        if let Some(last) = self.history.back() {
            lines.push(format!("nodes: {}  items: {}", last.nodes, last.items));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_returns_value_and_accumulates() {
        let mut stats = FrameStats::new();
        let v = stats.measure(Phase::Solve, || 42);
        assert_eq!(v, 42);
        stats.record(Phase::Draw, Duration::from_millis(4));
        stats.end_frame();
        stats.record(Phase::Draw, Duration::from_millis(2));
        stats.end_frame();
        assert_eq!(stats.frame(), 2);
        assert_eq!(stats.average(Phase::Draw), Duration::from_millis(3));
    }

    #[test]
    fn window_is_bounded() {
        let mut stats = FrameStats::new();
        for _ in 0..(WINDOW + 10) {
            stats.end_frame();
        }
        assert_eq!(stats.history.len(), WINDOW);
        assert!(stats.lines()[0].starts_with("frame 70"));
    }
}
