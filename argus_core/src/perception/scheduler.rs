// argus_core/src/perception/scheduler.rs

use crate::config::ScheduleMode;

/// Decides which active rays a provider casts on a due tick.
///
/// Synchronous mode casts every active ray. Asynchronous mode casts a window of
/// `rays_per_tick` rays and advances a rotating cursor, so every active ray is
/// refreshed once per `ceil(active / rays_per_tick)` due ticks.
#[derive(Debug, Clone)]
pub struct FrameBudgetScheduler {
    mode: ScheduleMode,
    cursor: usize,
    wraps: u64,
}

impl FrameBudgetScheduler {
    pub fn new(mode: ScheduleMode) -> Self {
        Self {
            mode,
            cursor: 0,
            wraps: 0,
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// How many times the cursor has wrapped past the end of the active set.
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.wraps = 0;
    }

    /// Fills `out` with the ray indices to cast this tick, ascending.
    pub fn select(&mut self, active: &[usize], out: &mut Vec<usize>) {
        out.clear();
        let n = active.len();
        if n == 0 {
            return;
        }
        match self.mode {
            ScheduleMode::Synchronous => out.extend_from_slice(active),
            ScheduleMode::Asynchronous { rays_per_tick } => {
                let count = (rays_per_tick as usize).clamp(1, n);
                // The active set may have shrunk since the last tick.
                let start = self.cursor % n;
                out.extend((0..count).map(|j| active[(start + j) % n]));
                out.sort_unstable();

                let next = start + count;
                if next >= n {
                    self.wraps += 1;
                }
                self.cursor = next % n;
            }
        }
    }
}
