//! 动画层：随机选择可激发迁移，记录增量历史以支持后退与前进。
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::net::{FiringDelta, Net, NetError, TransitionId};
use crate::report::{SimulationReport, StepRecord};

/// Steps a net forward and backward over a linear history of firings.
///
/// Deltas before the cursor have been applied; deltas after it were undone
/// and can be replayed. Firing anything new drops the replayable tail.
#[derive(Debug)]
pub struct Animator {
    rng: StdRng,
    seed: u64,
    history: Vec<FiringDelta>,
    cursor: usize,
}

impl Animator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            history: Vec::new(),
            cursor: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn history(&self) -> &[FiringDelta] {
        &self.history
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn can_step_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_step_forward(&self) -> bool {
        self.cursor < self.history.len()
    }

    pub fn fire(&mut self, net: &mut Net, transition: &str) -> Result<FiringDelta, NetError> {
        let delta = net.fire(transition)?;
        self.history.truncate(self.cursor);
        self.history.push(delta.clone());
        self.cursor += 1;
        Ok(delta)
    }

    /// Picks uniformly among the enabled transitions of highest priority.
    pub fn choose(&mut self, net: &Net) -> Result<Option<TransitionId>, NetError> {
        let enabled = net.enabled_transitions()?;
        let mut candidates = Vec::with_capacity(enabled.len());
        let mut best = 0;
        for id in enabled {
            let priority = net.transition(&id)?.priority;
            if candidates.is_empty() || priority > best {
                best = priority;
                candidates.clear();
                candidates.push(id);
            } else if priority == best {
                candidates.push(id);
            }
        }
        if candidates.is_empty() {
            return Ok(None);
        }
        let index = self.rng.random_range(0..candidates.len());
        Ok(Some(candidates.swap_remove(index)))
    }

    /// Fires a randomly chosen transition; `None` when nothing is enabled.
    pub fn fire_random(&mut self, net: &mut Net) -> Result<Option<FiringDelta>, NetError> {
        match self.choose(net)? {
            Some(transition) => self.fire(net, &transition).map(Some),
            None => Ok(None),
        }
    }

    pub fn step_back(&mut self, net: &mut Net) -> Result<Option<TransitionId>, NetError> {
        if !self.can_step_back() {
            return Ok(None);
        }
        let delta = &self.history[self.cursor - 1];
        net.unfire(delta)?;
        let transition = delta.transition().clone();
        self.cursor -= 1;
        Ok(Some(transition))
    }

    /// Re-applies the next undone firing exactly as it was recorded.
    pub fn step_forward(&mut self, net: &mut Net) -> Result<Option<TransitionId>, NetError> {
        if !self.can_step_forward() {
            return Ok(None);
        }
        let delta = &self.history[self.cursor];
        net.replay(delta)?;
        let transition = delta.transition().clone();
        self.cursor += 1;
        Ok(Some(transition))
    }

    /// Steps back to the start of the history and returns how many steps
    /// were undone.
    pub fn rewind(&mut self, net: &mut Net) -> Result<usize, NetError> {
        let mut undone = 0;
        while self.step_back(net)?.is_some() {
            undone += 1;
        }
        Ok(undone)
    }

    /// Fires up to `steps` random transitions, stopping early at a deadlock.
    pub fn run(
        &mut self,
        net: &mut Net,
        model: &str,
        steps: usize,
        record_markings: bool,
    ) -> Result<SimulationReport, NetError> {
        let start = Instant::now();
        let mut report = SimulationReport::new(model, self.seed, net.marking().clone());
        report.steps_requested = steps;
        for step in 0..steps {
            let Some(delta) = self.fire_random(net)? else {
                log::info!("{model}: deadlock after {step} steps");
                report.deadlocked = true;
                break;
            };
            report.steps.push(StepRecord {
                step,
                transition: delta.transition().clone(),
                delta,
                marking: record_markings.then(|| net.marking().clone()),
            });
        }
        report.final_marking = net.marking().clone();
        report.elapsed = start.elapsed();
        Ok(report)
    }
}
