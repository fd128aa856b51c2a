use std::collections::HashMap;
use std::time::Duration;

/// Scripted reply to a command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Outcome {
    /// The vehicle carries out the command.
    #[default]
    Success,

    /// The vehicle refuses the command with the given reason.
    Reject(String),

    /// The command has to be sent through the REST API.
    UseRestApi,

    /// The exchange fails below the command layer.
    Fault(String),
}

/// How a simulated vehicle behaves.
#[derive(Clone, Debug)]
pub struct MockVehicleBehavior {
    /// Error returned from `connect`, if any.
    pub connect_failure: Option<String>,

    /// Delay before each command reply.
    pub execute_delay: Duration,

    /// Replies by canonical command name. Unlisted commands succeed.
    pub outcomes: HashMap<String, Outcome>,

    /// Whether the vehicle speaks the local encrypted protocol.
    pub supports_protocol: bool,
}

impl Default for MockVehicleBehavior {
    fn default() -> Self {
        Self {
            connect_failure: None,
            execute_delay: Duration::ZERO,
            outcomes: HashMap::new(),
            supports_protocol: true,
        }
    }
}

impl MockVehicleBehavior {
    /// A vehicle without the local encrypted protocol.
    #[must_use]
    pub fn unsupported() -> Self {
        Self {
            supports_protocol: false,
            ..Self::default()
        }
    }

    /// Scripts the reply to `command`.
    #[must_use]
    pub fn with_outcome(mut self, command: impl Into<String>, outcome: Outcome) -> Self {
        self.outcomes.insert(command.into(), outcome);
        self
    }

    /// Delays every command reply.
    #[must_use]
    pub const fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = delay;
        self
    }

    /// Makes `connect` fail.
    #[must_use]
    pub fn with_connect_failure(mut self, message: impl Into<String>) -> Self {
        self.connect_failure = Some(message.into());
        self
    }

    pub(crate) fn outcome(&self, command: &str) -> Outcome {
        self.outcomes.get(command).cloned().unwrap_or_default()
    }
}
