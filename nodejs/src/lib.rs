//! Node.js bindings for the ae-bridge Apple Event dispatch core
//!
//! Exposes handler registration and the JavaScript dispatch function. Events
//! delivered on OS threads are carried into the JS thread one at a time and
//! answered there.

#![deny(clippy::all)]

mod config;
mod dispatch;
mod error;
mod logging;
mod registry;

pub use config::{BridgeConfigJs, configure};
pub use dispatch::set_dispatch;
pub use logging::init_logging;
pub use registry::{HandlerKeyJs, add_handler, has_handler, registered_handlers};
