use std::time::Duration;

/// Default bound on a whole request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on a command request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 512;

/// Default cap on a body relayed to the cloud.
pub const DEFAULT_MAX_RELAY_BODY_BYTES: usize = 2 * 1024 * 1024;

/// How time spent queued for a vehicle counts against the request timeout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LockWaitBudget {
    /// Waiting for the lock and talking to the vehicle share one deadline.
    #[default]
    Shared,

    /// Talking to the vehicle gets a full timeout of its own once the lock
    /// is held.
    Additional,
}

/// Proxy settings.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// How lock waiting is budgeted.
    pub lock_wait_budget: LockWaitBudget,

    /// Largest command body accepted.
    pub max_body_bytes: usize,

    /// Largest body read from any request, relayed ones included.
    pub max_relay_body_bytes: usize,

    /// Scheme used to reach the cloud relay.
    pub relay_scheme: String,

    /// Bound on a whole request.
    pub timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            lock_wait_budget: LockWaitBudget::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_relay_body_bytes: DEFAULT_MAX_RELAY_BODY_BYTES,
            relay_scheme: "https".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    /// How many body bytes are read before a request is rejected.
    #[must_use]
    pub fn body_read_limit(&self) -> usize {
        self.max_relay_body_bytes.max(self.max_body_bytes)
    }
}
