//! Lead-time control
//!
//! Decides how many frames the producer may write each cycle so the write cursor
//! settles `target_lead_frames` ahead of the read cursor. Without this clamp a
//! producer that momentarily outpaces the device keeps writing until the ring is
//! full, and latency grows to the whole capacity.
//!
//! When the lead exceeds `max_lead_frames` (for example after the device stalled)
//! the controller latches into [`LeadState::Overrun`] and grants nothing until the
//! lead has fallen back to `reset_lead_frames`.

use crate::ring_buffer::Cursors;

/// Lead parameters, immutable for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadTarget {
    /// Desired steady-state distance between cursors
    pub target_lead_frames: usize,
    /// Ceiling above which writing stops
    pub max_lead_frames: usize,
    /// Lead at which writing resumes after the ceiling was crossed
    pub reset_lead_frames: usize,
}

impl LeadTarget {
    /// Target with `max = 2 * target` and `reset = target`
    pub fn new(target_lead_frames: usize) -> Self {
        LeadTarget {
            target_lead_frames,
            max_lead_frames: target_lead_frames * 2,
            reset_lead_frames: target_lead_frames,
        }
    }
}

/// Producer-side lead condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadState {
    /// Lead within bounds
    Healthy,
    /// Lead exceeded the ceiling; writing is held off
    Overrun,
}

/// Outcome of one budget computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBudget {
    /// Frames the producer may write this cycle
    pub frames: usize,
    /// Lead observed when the budget was computed
    pub lead: usize,
    /// Lead condition after this computation
    pub state: LeadState,
    /// The computation moved Healthy -> Overrun
    pub entered_overrun: bool,
    /// The computation moved Overrun -> Healthy
    pub left_overrun: bool,
}

/// Gate for the producer loop
///
/// The only state is the overrun latch; everything else is recomputed from the
/// cursors every cycle. Owned by the producer thread.
#[derive(Debug, Clone)]
pub struct LeadController {
    target: LeadTarget,
    state: LeadState,
}

impl LeadController {
    /// Create a controller in the Healthy state
    pub fn new(target: LeadTarget) -> Self {
        LeadController {
            target,
            state: LeadState::Healthy,
        }
    }

    /// Lead parameters
    pub fn target(&self) -> LeadTarget {
        self.target
    }

    /// Current lead condition
    pub fn state(&self) -> LeadState {
        self.state
    }

    /// Compute the write budget for the next batch
    ///
    /// `capacity` is the ring capacity in frames. An empty generator is not this
    /// function's concern: the budget only bounds what may be written.
    pub fn budget(&mut self, cursors: Cursors, capacity: usize) -> WriteBudget {
        let lead = cursors.lead();
        let free = capacity.saturating_sub(lead);
        let previous = self.state;

        self.state = match previous {
            LeadState::Healthy if lead > self.target.max_lead_frames => LeadState::Overrun,
            LeadState::Overrun if lead <= self.target.reset_lead_frames => LeadState::Healthy,
            other => other,
        };

        let frames = match self.state {
            LeadState::Overrun => 0,
            LeadState::Healthy => compute_budget(&self.target, lead, free),
        };

        WriteBudget {
            frames,
            lead,
            state: self.state,
            entered_overrun: previous == LeadState::Healthy && self.state == LeadState::Overrun,
            left_overrun: previous == LeadState::Overrun && self.state == LeadState::Healthy,
        }
    }
}

/// Stateless budget rule: fill up to the target, never past `free`, nothing
/// above the ceiling
pub fn compute_budget(target: &LeadTarget, lead: usize, free: usize) -> usize {
    if lead > target.max_lead_frames {
        return 0;
    }
    target.target_lead_frames.saturating_sub(lead).min(free)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursors(read: u64, write: u64) -> Cursors {
        Cursors { read, write }
    }

    #[test]
    fn test_budget_fills_to_target() {
        let mut lead = LeadController::new(LeadTarget::new(4800));
        let budget = lead.budget(cursors(1000, 2000), 48_000);
        assert_eq!(budget.frames, 3800);
        assert_eq!(budget.lead, 1000);
        assert_eq!(budget.state, LeadState::Healthy);
    }

    #[test]
    fn test_budget_zero_at_target() {
        let mut lead = LeadController::new(LeadTarget::new(4800));
        assert_eq!(lead.budget(cursors(0, 4800), 48_000).frames, 0);
        // Between target and ceiling: nothing to write, still healthy
        let b = lead.budget(cursors(0, 6000), 48_000);
        assert_eq!(b.frames, 0);
        assert_eq!(b.state, LeadState::Healthy);
    }

    #[test]
    fn test_budget_clamped_to_free() {
        let target = LeadTarget {
            target_lead_frames: 100,
            max_lead_frames: 100,
            reset_lead_frames: 100,
        };
        let mut lead = LeadController::new(target);
        assert_eq!(lead.budget(cursors(10, 30), 50).frames, 30);
    }

    #[test]
    fn test_drained_buffer_grants_full_target() {
        let mut lead = LeadController::new(LeadTarget::new(4800));
        assert_eq!(lead.budget(cursors(9000, 9000), 48_000).frames, 4800);
    }

    #[test]
    fn test_overrun_latch_and_reset() {
        let target = LeadTarget {
            target_lead_frames: 4800,
            max_lead_frames: 9600,
            reset_lead_frames: 4000,
        };
        let mut lead = LeadController::new(target);

        let b = lead.budget(cursors(0, 10_000), 48_000);
        assert_eq!(b.frames, 0);
        assert_eq!(b.state, LeadState::Overrun);
        assert!(b.entered_overrun);

        // Below target but above reset: still latched
        let b = lead.budget(cursors(5600, 10_000), 48_000);
        assert_eq!(b.frames, 0);
        assert_eq!(b.state, LeadState::Overrun);
        assert!(!b.entered_overrun);

        // Reached reset: back to normal budgeting
        let b = lead.budget(cursors(6000, 10_000), 48_000);
        assert!(b.left_overrun);
        assert_eq!(b.state, LeadState::Healthy);
        assert_eq!(b.frames, 800);
    }

    #[test]
    fn test_compute_budget_above_ceiling() {
        let target = LeadTarget::new(100);
        assert_eq!(compute_budget(&target, 201, 1000), 0);
        assert_eq!(compute_budget(&target, 200, 1000), 0);
        assert_eq!(compute_budget(&target, 40, 1000), 60);
    }
}
