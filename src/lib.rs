//! Apple Event bridge - marshaling and dispatch core
//!
//! This library carries Apple Events from the threads the OS delivers them on
//! into a single-threaded scripting runtime, and carries the runtime's answer
//! back as a native reply:
//!
//! - [`parser`] turns native descriptors into owned [`ParsedValue`] trees
//! - [`build_snapshot`] copies a whole event into an [`EventSnapshot`]
//! - [`HandlerRegistry`] records which (suite, event) pairs the runtime wants
//! - [`Bridge::on_event`] is the trampoline the OS calls
//! - [`reply`] encodes results and errors into the native reply
//!
//! # Example
//!
//! ```rust,ignore
//! use ae_bridge::{Bridge, ParsedValue};
//!
//! let bridge = Bridge::global();
//! bridge.register_interest("core", "getd");
//!
//! // Runs on the runtime's own thread, one event at a time.
//! let receiver = bridge.handoff();
//! receiver.run_blocking(|event| {
//!     match event.param("kocl").and_then(ParsedValue::as_str) {
//!         Some("window") => Ok(ParsedValue::from("ok")),
//!         _ => Ok(ParsedValue::Null),
//!     }
//! });
//! ```
//!
//! # Runtime bindings
//!
//! Runtimes with their own cross-thread call mechanism implement
//! [`DispatchCallback`] directly and use [`PendingEvent`] to pair each
//! snapshot with the OS thread waiting on it.

mod config;
pub mod descriptor;
pub mod dispatch;
mod error;
pub mod event;
pub mod fourcc;
pub mod parser;
pub mod platform;
mod registry;
pub mod reply;
mod value;

// Re-export public types
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use descriptor::{Descriptor, OwnedDescriptor};
pub use dispatch::handoff::{HandoffReceiver, HandoffSender, PendingEvent, ReplyWaiter, handoff};
pub use dispatch::{
    Bridge, DispatchCallback, HandlerResult, OsErr, RuntimeThread, register_interest,
    set_dispatch_callback, status,
};
pub use error::{Error, HandlerError, Result};
pub use event::{AppleEvent, EventSnapshot, OwnedAppleEvent, build_snapshot};
pub use fourcc::FourCharCode;
pub use parser::parse;
pub use registry::{HandlerKey, HandlerRegistry};
pub use reply::ReplySlot;
pub use value::ParsedValue;
