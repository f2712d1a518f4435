//! Dispatch trampoline
//!
//! [`Bridge::on_event`] is what the OS messaging layer calls, on whatever
//! thread it delivers on. It snapshots the event, hands the snapshot to the
//! installed [`DispatchCallback`], and writes the handler's result or error
//! into the reply before returning a native status. Nothing that goes wrong
//! in between is allowed to unwind back into the caller.

pub mod handoff;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use crate::config::BridgeConfig;
use crate::error::{Error, HandlerError, Result};
use crate::event::{AppleEvent, EventSnapshot, build_snapshot_with_limit};
use crate::registry::HandlerRegistry;
use crate::reply::{self, ReplySlot};
use crate::value::ParsedValue;

use self::handoff::HandoffReceiver;

/// What a runtime handler produces for one event
pub type HandlerResult = std::result::Result<ParsedValue, HandlerError>;

/// Native status code returned to the OS (`OSErr`)
pub type OsErr = i16;

/// Native status codes
pub mod status {
    use super::OsErr;

    pub const NO_ERR: OsErr = 0;
    /// `errAEEventNotHandled`
    pub const EVENT_NOT_HANDLED: OsErr = -1708;
    /// `errAEEventFailed`
    pub const EVENT_FAILED: OsErr = -10000;
}

/// Delivers a snapshot into the runtime context and waits for its result
///
/// Called on OS delivery threads. Implementations must serialize handler
/// execution; an `Err` means the runtime never accepted the event.
pub trait DispatchCallback: Send + Sync {
    fn dispatch(&self, snapshot: EventSnapshot) -> Result<HandlerResult>;
}

/// The thread a runtime context runs its handlers on
///
/// A callback that blocks the delivering thread until the runtime answers
/// must refuse events delivered on the runtime's own thread, which would
/// otherwise wait on itself forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeThread(ThreadId);

impl RuntimeThread {
    /// The calling thread
    pub fn current() -> Self {
        Self(thread::current().id())
    }

    pub fn is_current(&self) -> bool {
        self.0 == thread::current().id()
    }

    /// Fail with [`Error::RuntimeClosed`] when called on the runtime thread
    pub fn ensure_elsewhere(&self) -> Result<()> {
        if self.is_current() {
            tracing::warn!("event delivered on the runtime thread, refusing to block on it");
            return Err(Error::RuntimeClosed);
        }
        Ok(())
    }
}

/// Process state shared between the OS side and the runtime side
pub struct Bridge {
    config: BridgeConfig,
    registry: HandlerRegistry,
    callback: RwLock<Option<Arc<dyn DispatchCallback>>>,
}

static GLOBAL: OnceLock<Bridge> = OnceLock::new();

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            callback: RwLock::new(None),
        }
    }

    /// The process-wide bridge, created with defaults on first use
    pub fn global() -> &'static Bridge {
        GLOBAL.get_or_init(|| Bridge::new(BridgeConfig::default()))
    }

    /// Create the process-wide bridge with `config`
    ///
    /// Fails if it already exists, including through an earlier [`global`](Self::global) call.
    pub fn init_global(config: BridgeConfig) -> Result<&'static Bridge> {
        let mut created = false;
        let bridge = GLOBAL.get_or_init(|| {
            created = true;
            Bridge::new(config)
        });
        if created {
            Ok(bridge)
        } else {
            Err(Error::AlreadyInitialized)
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Mark interest in (suite, event)
    pub fn register_interest(&self, suite: &str, event: &str) {
        self.registry.register_interest(suite, event);
    }

    /// Install the dispatch callback, replacing any previous one
    pub fn set_dispatch_callback(&self, callback: impl DispatchCallback + 'static) {
        let mut slot = self
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.replace(Arc::new(callback)).is_some() {
            tracing::debug!("replaced dispatch callback");
        }
    }

    pub fn has_dispatch_callback(&self) -> bool {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Install a fresh handoff as the dispatch callback and return its consumer
    pub fn handoff(&self) -> HandoffReceiver {
        let (sender, receiver) = handoff::handoff(&self.config);
        self.set_dispatch_callback(sender);
        receiver
    }

    /// Drop the dispatch callback and every registration
    pub fn reset(&self) {
        self.registry.reset();
        self.callback
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn current_callback(&self) -> Option<Arc<dyn DispatchCallback>> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle one incoming event and fill in its reply
    ///
    /// Returns [`status::EVENT_NOT_HANDLED`] when no callback is installed or
    /// the runtime is gone (the event is dropped), [`status::EVENT_FAILED`]
    /// when the event cannot be read or the reply cannot be written, and
    /// [`status::NO_ERR`] otherwise, including when the handler failed and
    /// the reply carries its error.
    pub fn on_event<E, S>(&self, event: &E, reply: &mut S) -> OsErr
    where
        E: AppleEvent,
        S: ReplySlot + ?Sized,
    {
        let max_depth = self.config.max_parse_depth();
        let snapshot = match catch_unwind(AssertUnwindSafe(|| {
            build_snapshot_with_limit(event, max_depth)
        })) {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to read incoming event");
                return status::EVENT_FAILED;
            }
            Err(panic) => {
                tracing::warn!(panic = %panic_message(&*panic), "panic while reading incoming event");
                return status::EVENT_FAILED;
            }
        };

        let Some(callback) = self.current_callback() else {
            tracing::warn!(
                suite = %snapshot.suite(),
                event = %snapshot.event(),
                "no dispatch callback installed, dropping event"
            );
            return status::EVENT_NOT_HANDLED;
        };

        let suite = snapshot.suite().to_string();
        let event_id = snapshot.event().to_string();
        tracing::debug!(suite = %suite, event = %event_id, params = snapshot.params().len(), "dispatching event");

        let result = match catch_unwind(AssertUnwindSafe(|| callback.dispatch(snapshot))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(suite = %suite, event = %event_id, error = %e, "event not accepted by runtime");
                return status::EVENT_NOT_HANDLED;
            }
            Err(panic) => Err(HandlerError::new(
                self.config.failure_error_code(),
                panic_message(&*panic),
            )),
        };

        if let Err(e) = &result {
            tracing::warn!(suite = %suite, event = %event_id, code = e.code(), reason = %e.message(), "event handler failed");
        }

        let encoded = reply::to_reply(&result, self.config.failure_error_code());
        match catch_unwind(AssertUnwindSafe(|| reply::write_reply(reply, &encoded))) {
            Ok(Ok(())) => status::NO_ERR,
            Ok(Err(e)) => {
                tracing::warn!(suite = %suite, event = %event_id, error = %e, "failed to write reply");
                status::EVENT_FAILED
            }
            Err(panic) => {
                tracing::warn!(panic = %panic_message(&*panic), "panic while writing reply");
                status::EVENT_FAILED
            }
        }
    }
}

/// Mark interest in (suite, event) on the process-wide bridge
pub fn register_interest(suite: &str, event: &str) {
    Bridge::global().register_interest(suite, event);
}

/// Install the process-wide dispatch callback
pub fn set_dispatch_callback(callback: impl DispatchCallback + 'static) {
    Bridge::global().set_dispatch_callback(callback);
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "event handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{OwnedDescriptor, keywords};
    use crate::event::OwnedAppleEvent;
    use crate::fourcc::fourcc;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Answers every event with a fixed result and keeps what it saw
    struct Recording {
        seen: Mutex<Vec<EventSnapshot>>,
        answer: HandlerResult,
    }

    impl Recording {
        fn new(answer: HandlerResult) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                answer,
            })
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl DispatchCallback for Arc<Recording> {
        fn dispatch(&self, snapshot: EventSnapshot) -> Result<HandlerResult> {
            self.seen.lock().unwrap().push(snapshot);
            Ok(self.answer.clone())
        }
    }

    /// Blocks on a handoff unless called on the consumer's thread
    struct Guarded {
        runtime: RuntimeThread,
        inner: handoff::HandoffSender,
    }

    impl DispatchCallback for Guarded {
        fn dispatch(&self, snapshot: EventSnapshot) -> Result<HandlerResult> {
            self.runtime.ensure_elsewhere()?;
            self.inner.dispatch(snapshot)
        }
    }

    struct Panicking;

    impl DispatchCallback for Panicking {
        fn dispatch(&self, _snapshot: EventSnapshot) -> Result<HandlerResult> {
            panic!("callback exploded");
        }
    }

    fn getd() -> OwnedAppleEvent {
        OwnedAppleEvent::new(fourcc(b"core"), fourcc(b"getd"))
            .param(fourcc(b"kocl"), OwnedDescriptor::text("window"))
    }

    #[test]
    fn test_getd_scenario() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge.register_interest("core", "getd");
        let recording = Recording::new(Ok(ParsedValue::from("ok")));
        bridge.set_dispatch_callback(recording.clone());

        let mut reply = OwnedDescriptor::record([]);
        let code = bridge.on_event(&&getd(), &mut reply);

        assert_eq!(code, status::NO_ERR);
        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            serde_json::to_value(&seen[0]).unwrap(),
            json!({ "suite": "core", "event": "getd", "params": { "kocl": "window" } })
        );
        assert_eq!(
            reply.get(keywords::DIRECT_OBJECT),
            Some(&OwnedDescriptor::text("ok"))
        );
    }

    #[test]
    fn test_drop_before_ready() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge.register_interest("core", "getd");

        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::EVENT_NOT_HANDLED);
        assert_eq!(reply, OwnedDescriptor::record([]));

        let recording = Recording::new(Ok(ParsedValue::Null));
        bridge.set_dispatch_callback(recording.clone());
        assert_eq!(recording.count(), 0);
    }

    #[test]
    fn test_last_writer_wins() {
        let bridge = Bridge::new(BridgeConfig::default());
        let first = Recording::new(Ok(ParsedValue::from("first")));
        let second = Recording::new(Ok(ParsedValue::from("second")));
        bridge.set_dispatch_callback(first.clone());
        bridge.set_dispatch_callback(second.clone());

        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::NO_ERR);

        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 1);
        assert_eq!(
            reply.get(keywords::DIRECT_OBJECT),
            Some(&OwnedDescriptor::text("second"))
        );
    }

    #[test]
    fn test_handler_error_becomes_error_reply() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge.set_dispatch_callback(Recording::new(Err(HandlerError::new(
            -1728,
            "Can't get window 1.",
        ))));

        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::NO_ERR);
        assert_eq!(
            reply.get(keywords::ERROR_NUMBER),
            Some(&OwnedDescriptor::int32(-1728))
        );
        assert_eq!(
            reply.get(keywords::ERROR_STRING),
            Some(&OwnedDescriptor::text("Can't get window 1."))
        );

        // still serving afterwards
        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::NO_ERR);
    }

    #[test]
    fn test_error_without_number_uses_configured_code() {
        let config = BridgeConfig::builder().failure_error_code(-2700).build();
        let bridge = Bridge::new(config);
        bridge.set_dispatch_callback(Recording::new(Err(HandlerError::new(0, "bad"))));

        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::NO_ERR);
        assert_eq!(
            reply.get(keywords::ERROR_NUMBER),
            Some(&OwnedDescriptor::int32(-2700))
        );
        assert_eq!(
            reply.get(keywords::ERROR_STRING),
            Some(&OwnedDescriptor::text("bad"))
        );
    }

    #[test]
    fn test_runtime_thread_guard() {
        let runtime = RuntimeThread::current();
        assert!(runtime.is_current());
        assert!(matches!(runtime.ensure_elsewhere(), Err(Error::RuntimeClosed)));

        let elsewhere = thread::spawn(move || runtime.ensure_elsewhere().is_ok())
            .join()
            .unwrap();
        assert!(elsewhere);
    }

    #[test]
    fn test_delivery_on_runtime_thread_is_not_handled() {
        let bridge = Bridge::new(BridgeConfig::default());
        let (sender, receiver) = handoff::handoff(bridge.config());
        bridge.set_dispatch_callback(Guarded {
            runtime: RuntimeThread::current(),
            inner: sender,
        });

        // Nothing consumes the handoff on this thread, so an unguarded
        // delivery would never return.
        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::EVENT_NOT_HANDLED);
        assert_eq!(reply, OwnedDescriptor::record([]));
        assert_eq!(receiver.queued(), 0);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let config = BridgeConfig::builder().failure_error_code(-2700).build();
        let bridge = Bridge::new(config);
        bridge.set_dispatch_callback(Panicking);

        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::NO_ERR);
        assert_eq!(
            reply.get(keywords::ERROR_NUMBER),
            Some(&OwnedDescriptor::int32(-2700))
        );
        assert_eq!(
            reply.get(keywords::ERROR_STRING),
            Some(&OwnedDescriptor::text("callback exploded"))
        );
    }

    #[test]
    fn test_unrecognized_descriptor_still_dispatches() {
        let bridge = Bridge::new(BridgeConfig::default());
        let recording = Recording::new(Ok(ParsedValue::Bool(true)));
        bridge.set_dispatch_callback(recording.clone());

        let event = OwnedAppleEvent::new(fourcc(b"core"), fourcc(b"getd"))
            .param(fourcc(b"fsrf"), OwnedDescriptor::raw(fourcc(b"fsrf"), vec![0; 80]));
        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&event, &mut reply), status::NO_ERR);

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen[0].param("fsrf"), Some(&ParsedValue::Null));
        assert_eq!(
            reply.get(keywords::DIRECT_OBJECT),
            Some(&OwnedDescriptor::boolean(true))
        );
    }

    #[test]
    fn test_unreadable_event_fails() {
        let bridge = Bridge::new(BridgeConfig::default());
        let recording = Recording::new(Ok(ParsedValue::Null));
        bridge.set_dispatch_callback(recording.clone());

        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(
            bridge.on_event(&&OwnedAppleEvent::empty(), &mut reply),
            status::EVENT_FAILED
        );
        assert_eq!(recording.count(), 0);
    }

    #[test]
    fn test_no_reply_requested() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge.set_dispatch_callback(Recording::new(Ok(ParsedValue::from("ignored"))));

        let mut reply = OwnedDescriptor::null();
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::NO_ERR);
        assert_eq!(reply, OwnedDescriptor::null());
    }

    #[test]
    fn test_closed_runtime_is_not_handled() {
        let bridge = Bridge::new(BridgeConfig::default());
        drop(bridge.handoff());

        let mut reply = OwnedDescriptor::record([]);
        assert_eq!(bridge.on_event(&&getd(), &mut reply), status::EVENT_NOT_HANDLED);
    }

    #[test]
    fn test_reset() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge.register_interest("core", "getd");
        bridge.set_dispatch_callback(Recording::new(Ok(ParsedValue::Null)));
        bridge.reset();

        assert!(bridge.registry().is_empty());
        assert!(!bridge.has_dispatch_callback());
    }

    #[test]
    fn test_concurrent_events_never_overlap() {
        const PRODUCERS: usize = 8;
        const EVENTS_EACH: usize = 10;

        let bridge = Arc::new(Bridge::new(BridgeConfig::default()));
        let receiver = bridge.handoff();

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));

        let consumer = {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let handled = Arc::clone(&handled);
            thread::spawn(move || {
                receiver.run_blocking(move |snapshot| {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    handled.fetch_add(1, Ordering::SeqCst);
                    Ok(snapshot.param("seqn").cloned().unwrap_or_default())
                });
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || {
                    for i in 0..EVENTS_EACH {
                        let seq = (producer * EVENTS_EACH + i) as i32;
                        let event = OwnedAppleEvent::new(fourcc(b"core"), fourcc(b"getd"))
                            .param(fourcc(b"seqn"), OwnedDescriptor::int32(seq));
                        let mut reply = OwnedDescriptor::record([]);
                        assert_eq!(bridge.on_event(&&event, &mut reply), status::NO_ERR);
                        assert_eq!(
                            reply.get(keywords::DIRECT_OBJECT),
                            Some(&OwnedDescriptor::int32(seq))
                        );
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        bridge.reset();
        consumer.join().unwrap();

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(handled.load(Ordering::SeqCst), PRODUCERS * EVENTS_EACH);
    }

    #[test]
    fn test_init_global_after_use_fails() {
        let _ = Bridge::global();
        assert!(matches!(
            Bridge::init_global(BridgeConfig::default()),
            Err(Error::AlreadyInitialized)
        ));
    }
}
