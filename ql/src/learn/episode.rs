/// Phase of the episode loop.
///
/// A terminal game condition does not reset the episode immediately: the
/// loop keeps stepping through a fixed settle period first (the original
/// arcade behavior of holding the final scene on screen for a moment),
/// then performs the actual per-episode reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodePhase {
    /// Normal stepping
    Running,
    /// Terminal condition reached; counting down the settle period
    Ending { steps_left: usize },
    /// Settle period over - per-episode state wants re-initialization
    Reset,
}

impl EpisodePhase {
    pub fn begin_ending(settle_steps: usize) -> Self {
        EpisodePhase::Ending { steps_left: settle_steps }
    }

    /// Advances the phase by one simulation step.
    pub fn tick(self) -> Self {
        match self {
            EpisodePhase::Running => EpisodePhase::Running,
            EpisodePhase::Ending { steps_left: 0 } => EpisodePhase::Reset,
            EpisodePhase::Ending { steps_left } => EpisodePhase::Ending { steps_left: steps_left - 1 },
            EpisodePhase::Reset => EpisodePhase::Reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_stays_running() {
        assert_eq!(EpisodePhase::Running.tick(), EpisodePhase::Running);
    }

    #[test]
    fn ending_counts_down_to_reset() {
        let mut phase = EpisodePhase::begin_ending(2);
        phase = phase.tick();
        assert_eq!(phase, EpisodePhase::Ending { steps_left: 1 });
        phase = phase.tick();
        assert_eq!(phase, EpisodePhase::Ending { steps_left: 0 });
        phase = phase.tick();
        assert_eq!(phase, EpisodePhase::Reset);
        assert_eq!(phase.tick(), EpisodePhase::Reset);
    }

    #[test]
    fn zero_settle_steps_resets_after_one_tick() {
        assert_eq!(EpisodePhase::begin_ending(0).tick(), EpisodePhase::Reset);
    }
}
