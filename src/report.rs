use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::net::{FiringDelta, Marking, ReachabilityGraph, TransitionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub transition: TransitionId,
    pub delta: FiringDelta,
    /// Marking after the step, kept only when requested.
    pub marking: Option<Marking>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub model: String,
    pub seed: u64,
    pub steps_requested: usize,
    pub steps: Vec<StepRecord>,
    pub deadlocked: bool,
    pub initial_marking: Marking,
    pub final_marking: Marking,
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn new(model: impl Into<String>, seed: u64, initial_marking: Marking) -> Self {
        Self {
            model: model.into(),
            seed,
            steps_requested: 0,
            steps: Vec::new(),
            deadlocked: false,
            final_marking: initial_marking.clone(),
            initial_marking,
            elapsed: Duration::default(),
        }
    }

    pub fn fired(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "模拟报告")?;
        writeln!(f, "模型: {}", self.model)?;
        writeln!(f, "随机种子: {}", self.seed)?;
        writeln!(f, "耗时: {:?}", self.elapsed)?;
        writeln!(f, "激发步数: {}/{}", self.fired(), self.steps_requested)?;
        writeln!(f, "初始标识: {}", self.initial_marking)?;
        for step in &self.steps {
            writeln!(f, "  #{} {}", step.step, step.delta)?;
        }
        writeln!(f, "最终标识: {}", self.final_marking)?;
        if self.deadlocked {
            writeln!(f, "\n到达死锁，无可激发迁移")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadState {
    pub state_id: String,
    pub marking: Marking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationReport {
    pub model: String,
    pub state_count: usize,
    pub edge_count: usize,
    pub truncated: bool,
    pub dead_states: Vec<DeadState>,
    pub analysis_time: Duration,
}

impl ExplorationReport {
    pub fn from_graph(
        model: impl Into<String>,
        graph: &ReachabilityGraph,
        analysis_time: Duration,
    ) -> Self {
        let dead_states = graph
            .dead_states()
            .iter()
            .map(|node| DeadState {
                state_id: format!("s{}", node.index()),
                marking: graph.marking(*node).clone(),
            })
            .collect();
        Self {
            model: model.into(),
            state_count: graph.state_count(),
            edge_count: graph.edge_count(),
            truncated: graph.truncated,
            dead_states,
            analysis_time,
        }
    }

    pub fn has_deadlock(&self) -> bool {
        !self.dead_states.is_empty()
    }
}

impl fmt::Display for ExplorationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "可达性分析报告")?;
        writeln!(f, "模型: {}", self.model)?;
        writeln!(f, "分析时间: {:?}", self.analysis_time)?;
        writeln!(f, "状态数: {}", self.state_count)?;
        writeln!(f, "转换数: {}", self.edge_count)?;
        if self.truncated {
            writeln!(f, "状态空间已截断")?;
        }
        writeln!(f, "是否存在死锁: {}", self.has_deadlock())?;
        for (i, state) in self.dead_states.iter().enumerate() {
            writeln!(f, "\n死锁 #{} ({})", i + 1, state.state_id)?;
            writeln!(f, "标识: {}", state.marking)?;
        }
        Ok(())
    }
}
