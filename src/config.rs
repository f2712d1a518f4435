use crate::dispatch::status;
use crate::parser::DEFAULT_MAX_DEPTH;

/// Configuration for a [`Bridge`](crate::Bridge)
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    max_parse_depth: usize,
    failure_error_code: i32,
    handoff_capacity: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_parse_depth: DEFAULT_MAX_DEPTH,
            failure_error_code: i32::from(status::EVENT_FAILED),
            handoff_capacity: None,
        }
    }
}

impl BridgeConfig {
    /// Create a new builder for BridgeConfig
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Containers nested deeper than this parse to `Null`
    pub fn max_parse_depth(&self) -> usize {
        self.max_parse_depth
    }

    /// Error number used when a handler fails without one
    pub fn failure_error_code(&self) -> i32 {
        self.failure_error_code
    }

    /// Bound on queued events per handoff; `None` is unbounded
    pub fn handoff_capacity(&self) -> Option<usize> {
        self.handoff_capacity
    }
}

/// Builder for BridgeConfig
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    inner: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn max_parse_depth(mut self, depth: usize) -> Self {
        self.inner.max_parse_depth = depth;
        self
    }

    pub fn failure_error_code(mut self, code: i32) -> Self {
        self.inner.failure_error_code = code;
        self
    }

    /// Bound the handoff queue; producers block while it is full
    pub fn handoff_capacity(mut self, capacity: usize) -> Self {
        self.inner.handoff_capacity = Some(capacity.max(1));
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.inner
    }
}
