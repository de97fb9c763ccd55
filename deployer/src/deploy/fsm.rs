//! Finite state machine for the local container lifecycle

use serde::{Deserialize, Serialize};

/// Lifecycle state of the tracked container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// No container tracked
    Absent,

    /// Container being created
    Starting,

    /// Container (re)started, config server not confirmed yet
    AwaitingReadiness,

    /// Config server answered its status probe
    Ready,

    /// Restart issued
    Restarting,

    /// Services stopped inside a running container
    Stopped,

    /// Readiness budget exhausted or a runtime command failed
    Failed,
}

/// Container lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// Create a new container
    Create,

    /// Track a container that is already running
    Attach,

    /// Restart a tracked or discovered container
    Restart,

    /// Runtime reported the container running
    Started,

    /// Readiness probe succeeded
    Ready,

    /// Services stopped
    Stop,

    /// Services started again
    Start,

    /// Readiness budget exhausted or a runtime command failed
    Fail(String),
}

/// Container lifecycle FSM
#[derive(Debug, Clone)]
pub struct ContainerFsm {
    state: ContainerState,
    error: Option<String>,
    restart_count: u32,
}

impl ContainerFsm {
    /// Create a new FSM with no container
    pub fn new() -> Self {
        Self {
            state: ContainerState::Absent,
            error: None,
            restart_count: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Reason of the last failure, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of restarts issued
    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ContainerEvent) -> Result<ContainerState, String> {
        use ContainerEvent as E;
        use ContainerState as S;

        let new_state = match (self.state, &event) {
            // Any state can fail
            (_, E::Fail(reason)) => {
                self.error = Some(reason.clone());
                S::Failed
            }

            (S::Absent | S::Failed, E::Create) => {
                self.error = None;
                S::Starting
            }
            (S::Absent, E::Attach) => S::AwaitingReadiness,
            (S::Absent | S::AwaitingReadiness | S::Ready | S::Stopped | S::Failed, E::Restart) => {
                self.error = None;
                self.restart_count += 1;
                S::Restarting
            }

            (S::Starting | S::Restarting, E::Started) => S::AwaitingReadiness,
            (S::AwaitingReadiness | S::Ready, E::Ready) => S::Ready,

            (S::Ready | S::AwaitingReadiness | S::Failed, E::Stop) => S::Stopped,
            (S::Stopped | S::Ready | S::AwaitingReadiness | S::Failed, E::Start) => {
                self.error = None;
                S::AwaitingReadiness
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for ContainerFsm {
    fn default() -> Self {
        Self::new()
    }
}
