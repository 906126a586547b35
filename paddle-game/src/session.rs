use anyhow::Result;

use ql::frame_store::SharedFrameStore;
use ql::learn::episode::EpisodePhase;
use ql::learn::realtime_q_learner::{LearnerParameter, RealtimeQLearner};
use ql::model::QFunction;
use ql::prelude::DebugVisualizer;

use crate::drawer::FrameDrawer;
use crate::mechanics::{GameMode, PaddleAction, PaddleGameMechanics, StepEvents};

#[derive(Clone, Copy, Debug)]
pub struct SessionParameter {
    pub learner: LearnerParameter,
    /// Frames kept in the shared visual memory
    pub max_memory_frames: usize,
    /// Steps the final scene is held before the episode resets
    pub game_over_wait_steps: usize,
    /// Emergency brake for episodes which never reach a terminal state
    pub max_steps_per_episode: usize,
}

impl Default for SessionParameter {
    fn default() -> Self {
        Self {
            learner: LearnerParameter::default(),
            max_memory_frames: 30,
            game_over_wait_steps: 20,
            max_steps_per_episode: 100_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EpisodeSummary {
    pub steps: usize,
    /// final score per player
    pub scores: Vec<i32>,
    /// accumulated training loss per player
    pub losses: Vec<f32>,
}

/// Drives one game plus its learning agents through episodes.
///
/// One session owns one game, one model and one agent per paddle. All
/// agents share the session's frame store and train the one shared model.
///
/// Step contract: the fresh observation is appended to the frame store
/// exactly once per step, strictly before any agent's decision reads "the
/// latest frame" and before any agent records this step's observation
/// index into its replay buffer. Breaking that order corrupts the
/// transitions' next-state references.
pub struct TrainingSession<M: QFunction> {
    mechanics: PaddleGameMechanics,
    drawer: FrameDrawer,
    frames: SharedFrameStore,
    model: M,
    agents: Vec<RealtimeQLearner<PaddleAction>>,
    phase: EpisodePhase,
    param: SessionParameter,
}

impl<M: QFunction> TrainingSession<M> {
    pub fn new(mode: GameMode, model: M, param: SessionParameter) -> Self {
        let frames = SharedFrameStore::new(param.max_memory_frames);
        let mechanics = PaddleGameMechanics::new(mode);
        let agents = mechanics
            .state()
            .paddles
            .iter()
            .map(|_| RealtimeQLearner::new(frames.clone(), param.learner))
            .collect();

        Self {
            mechanics,
            drawer: FrameDrawer::new(),
            frames,
            model,
            agents,
            phase: EpisodePhase::Running,
            param,
        }
    }

    pub fn frames(&self) -> &SharedFrameStore { &self.frames }

    pub fn model(&self) -> &M { &self.model }

    pub fn into_model(self) -> M { self.model }

    /// Plays one episode to its end (terminal state plus settle period),
    /// then re-initializes the per-episode state: fresh replay buffers and
    /// counters, fresh game. The frame store deliberately survives - a new
    /// episode starts with the previous episode's visual memory intact.
    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        debug_assert_eq!(self.phase, EpisodePhase::Running);

        let mut steps = 0_usize;
        while self.phase != EpisodePhase::Reset {
            self.run_step()?;
            steps += 1;

            if steps >= self.param.max_steps_per_episode && self.phase == EpisodePhase::Running {
                log::warn!("episode aborted after {} steps without a terminal state", steps);
                self.phase = EpisodePhase::begin_ending(0);
            }
        }

        let summary = EpisodeSummary {
            steps,
            scores: self.mechanics.state().paddles.iter().map(|p| p.score).collect(),
            losses: self.agents.iter().map(|a| a.episode_loss()).collect(),
        };

        for (i, agent) in self.agents.iter_mut().enumerate() {
            log::debug!("P{} action distribution: {}", i + 1, agent.action_distribution_line());
            agent.reset_episode();
        }
        self.mechanics.reset();
        self.phase = EpisodePhase::Running;

        Ok(summary)
    }

    fn run_step(&mut self) -> Result<()> {
        // the one shared observation of this step
        let frame = self.drawer.draw(self.mechanics.state());
        self.frames.append(frame);

        let mut actions = Vec::with_capacity(self.agents.len());
        for agent in &mut self.agents {
            actions.push(agent.decide_action(&self.model)?);
        }

        let events = self.mechanics.time_step(&actions);
        let rewards = self.rewards(&events);

        if self.phase == EpisodePhase::Running && self.mechanics.state().finished {
            log::trace!("{}", self.mechanics.state().one_line_info());
            self.phase = EpisodePhase::begin_ending(self.param.game_over_wait_steps);
        }
        let terminal = self.mechanics.state().finished;

        for ((agent, &action), &reward) in self.agents.iter_mut().zip(&actions).zip(&rewards) {
            agent.learn_step(&mut self.model, action, reward, terminal)?;
        }

        self.phase = self.phase.tick();
        Ok(())
    }

    /// Per-player reward signals for this step.
    ///
    /// Pong: ±1 on a goal, nothing otherwise. Squash: the running score
    /// (paddle hits earn, lost balls cost) scaled down by 10.
    fn rewards(&self, events: &StepEvents) -> Vec<f32> {
        match self.mechanics.state().mode {
            GameMode::Pong => self
                .mechanics
                .state()
                .paddles
                .iter()
                .map(|paddle| match events.ball_out {
                    Some(conceded_side) if conceded_side == paddle.side => -1.0,
                    Some(_) => 1.0,
                    None => 0.0,
                })
                .collect(),
            GameMode::Squash => {
                vec![self.mechanics.state().paddles[0].score as f32 / 10.0]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use ql::frame_store::Frame;

    use super::*;

    struct CountingModel {
        train_calls: usize,
    }

    impl QFunction for CountingModel {
        fn num_actions(&self) -> usize { 3 }

        fn predict(&self, _state: &Frame) -> Array1<f32> {
            Array1::zeros(3)
        }

        fn train_on_batch(&mut self, _inputs: &Array2<f32>, _targets: &Array2<f32>) -> f32 {
            self.train_calls += 1;
            0.5
        }
    }

    fn short_test_parameter() -> SessionParameter {
        SessionParameter {
            learner: LearnerParameter {
                batch_size: 2,
                replay_buffer_len: 10,
                ..LearnerParameter::default()
            },
            max_memory_frames: 30,
            game_over_wait_steps: 3,
            max_steps_per_episode: 40,
        }
    }

    #[test]
    fn every_step_appends_exactly_one_frame() {
        let mut session = TrainingSession::new(GameMode::Squash, CountingModel { train_calls: 0 }, short_test_parameter());

        for expected in 1..=5 {
            session.run_step().unwrap();
            assert_eq!(session.frames().current_index(), expected);
        }
    }

    #[test]
    fn pong_session_runs_one_agent_per_paddle() {
        let session = TrainingSession::new(GameMode::Pong, CountingModel { train_calls: 0 }, short_test_parameter());
        assert_eq!(session.agents.len(), 2);

        let session = TrainingSession::new(GameMode::Squash, CountingModel { train_calls: 0 }, short_test_parameter());
        assert_eq!(session.agents.len(), 1);
    }

    #[test]
    fn episode_ends_and_resets_per_episode_state() {
        let mut session = TrainingSession::new(GameMode::Squash, CountingModel { train_calls: 0 }, short_test_parameter());

        let summary = session.run_episode().unwrap();

        assert!(summary.steps > 0);
        assert!(summary.steps <= 40 + 3 + 2);
        assert_eq!(summary.scores.len(), 1);
        assert_eq!(summary.losses.len(), 1);
        assert!(summary.losses[0] > 0.0);

        // ready for the next episode
        assert_eq!(session.phase, EpisodePhase::Running);
        assert_eq!(session.agents[0].episode_loss(), 0.0);
        assert!(!session.mechanics.state().finished);
    }

    #[test]
    fn frame_store_survives_episode_resets() {
        let mut session = TrainingSession::new(GameMode::Squash, CountingModel { train_calls: 0 }, short_test_parameter());

        let first = session.run_episode().unwrap();
        let frames_after_first = session.frames().current_index();
        assert_eq!(frames_after_first, first.steps);

        let second = session.run_episode().unwrap();
        assert_eq!(session.frames().current_index(), first.steps + second.steps);
    }

    #[test]
    fn model_is_trained_while_the_episode_runs() {
        let mut session = TrainingSession::new(GameMode::Squash, CountingModel { train_calls: 0 }, short_test_parameter());
        session.run_episode().unwrap();

        // every step with enough history trains once per agent
        assert!(session.model().train_calls > 0);
    }
}
