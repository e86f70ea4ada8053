//! `InterruptController` (spec §4.8): the inbound half of a WebSocket connection for a
//! session currently executing. A pure state machine, kept separate from socket I/O so it's
//! testable without a network stack.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundMessageKind {
    Prompt,
    Interrupt,
    Answer,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Transition {
    Accepted(ConnState),
    Invalid { message: &'static str },
    ProtocolViolation,
}

/// One socket's state machine: `idle -> running (on prompt) -> idle (on runner terminal)`.
/// `interrupt`/`answer` are only valid while running. Repeated invalid transitions close the
/// socket with a protocol violation instead of tolerating them forever.
pub struct InterruptController {
    state: ConnState,
    invalid_count: u32,
    invalid_threshold: u32,
}

impl InterruptController {
    pub fn new(invalid_threshold: u32) -> Self {
        Self {
            state: ConnState::Idle,
            invalid_count: 0,
            invalid_threshold,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn on_message(&mut self, kind: InboundMessageKind) -> Transition {
        match (self.state, kind) {
            (ConnState::Idle, InboundMessageKind::Prompt) => {
                self.state = ConnState::Running;
                Transition::Accepted(self.state)
            }
            (ConnState::Running, InboundMessageKind::Interrupt)
            | (ConnState::Running, InboundMessageKind::Answer) => Transition::Accepted(self.state),
            (ConnState::Idle, InboundMessageKind::Interrupt | InboundMessageKind::Answer) => {
                self.invalid("no run is in progress")
            }
            (ConnState::Running, InboundMessageKind::Prompt) => {
                self.invalid("a prompt is already running on this socket")
            }
        }
    }

    /// Called when the AgentRunner emits its terminal event. Always returns the socket to idle.
    pub fn on_runner_terminal(&mut self) {
        self.state = ConnState::Idle;
    }

    fn invalid(&mut self, message: &'static str) -> Transition {
        self.invalid_count += 1;
        if self.invalid_count >= self.invalid_threshold {
            Transition::ProtocolViolation
        } else {
            Transition::Invalid { message }
        }
    }
}
