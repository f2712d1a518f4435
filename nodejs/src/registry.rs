use ae_bridge::Bridge;
use napi_derive::napi;

/// A registered (suite, event) pair
#[napi(object)]
#[derive(Clone)]
pub struct HandlerKeyJs {
    pub suite: String,
    pub event: String,
}

impl From<&ae_bridge::HandlerKey> for HandlerKeyJs {
    fn from(key: &ae_bridge::HandlerKey) -> Self {
        Self {
            suite: key.suite().to_string(),
            event: key.event().to_string(),
        }
    }
}

/// Mark interest in events of `suite`/`event`
///
/// Registering the same pair twice is a no-op. Registration only records
/// intent; delivery starts once the pair is installed with the OS.
#[napi]
pub fn add_handler(suite: String, event: String) {
    Bridge::global().register_interest(&suite, &event);
}

/// Every registered pair
#[napi]
pub fn registered_handlers() -> Vec<HandlerKeyJs> {
    Bridge::global()
        .registry()
        .registered()
        .iter()
        .map(HandlerKeyJs::from)
        .collect()
}

#[napi]
pub fn has_handler(suite: String, event: String) -> bool {
    Bridge::global().registry().is_registered(&suite, &event)
}
