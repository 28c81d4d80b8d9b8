use tracing::debug;

use crate::types::{AgentState, ControllerHandle, Vec3};
use crate::world::Blackboard;

#[derive(Clone, Debug, PartialEq)]
pub struct AmbientTask {
    pub location: Vec3,
    pub assigned: bool,
}

/// FIFO of search points handed to the first idle agent found.
#[derive(Clone, Debug, Default)]
pub struct TaskDispatcher {
    pending: Vec<AmbientTask>,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[AmbientTask] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn enqueue(&mut self, location: Vec3) {
        self.pending.push(AmbientTask {
            location,
            assigned: false,
        });
    }

    /// Queues the location and runs an assignment pass right away.
    pub fn add_global_search_task<B>(&mut self, location: Vec3, agents: &[ControllerHandle], blackboard: &mut B) -> usize
    where
        B: Blackboard + ?Sized,
    {
        self.enqueue(location);
        self.assign_global_tasks(agents, blackboard)
    }

    /// Returns the number of tasks assigned in this pass.
    pub fn assign_global_tasks<B>(&mut self, agents: &[ControllerHandle], blackboard: &mut B) -> usize
    where
        B: Blackboard + ?Sized,
    {
        let mut assigned = 0;
        for task in self.pending.iter_mut().filter(|task| !task.assigned) {
            let idle = agents.iter().copied().find(|agent| {
                blackboard
                    .agent_state(*agent)
                    .is_some_and(AgentState::accepts_task)
            });
            let Some(agent) = idle else {
                continue;
            };
            blackboard.set_target_location(agent, task.location);
            blackboard.set_agent_state(agent, AgentState::Search);
            task.assigned = true;
            assigned += 1;
            debug!(agent = agent.0, x = task.location.x, y = task.location.y, "search task assigned");
        }
        self.pending.retain(|task| !task.assigned);
        assigned
    }
}
