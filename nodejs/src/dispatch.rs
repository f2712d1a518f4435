//! Delivery of events into the JavaScript thread
//!
//! OS threads never touch JavaScript values. Each event crosses into the JS
//! thread through a threadsafe function carrying a [`PendingEvent`]; the JS
//! thread invokes the installed callback and answers the pending event, which
//! wakes the OS thread blocked in [`NodeDispatcher::dispatch`].
//!
//! Events delivered on the JS thread itself (Cocoa's main run loop when Node
//! shares the main thread) are refused as not handled, since the JS thread
//! cannot both wait for the answer and produce it.

use std::cell::RefCell;
use std::ptr;

use ae_bridge::{
    Bridge, DispatchCallback, EventSnapshot, HandlerError, HandlerResult, ParsedValue,
    PendingEvent, RuntimeThread,
};
use napi::bindgen_prelude::*;
use napi::sys;
use napi::threadsafe_function::{
    ErrorStrategy, ThreadSafeCallContext, ThreadsafeFunction, ThreadsafeFunctionCallMode,
};
use napi::{Env, JsFunction, JsObject, JsUnknown, NapiRaw, NapiValue, Ref, ValueType};
use napi_derive::napi;

thread_local! {
    // Only ever touched on the JS thread.
    static DISPATCH_FN: RefCell<Option<Ref<()>>> = RefCell::new(None);
}

/// Fallback message when a thrown value carries nothing readable
const THROWN_MESSAGE: &str = "JavaScript handler threw";

const PROMISE_MESSAGE: &str = "dispatch function returned a Promise; the reply must be returned synchronously";

/// Install the JavaScript dispatch function
///
/// `callback(event)` receives `{ suite, event, params, targetApp?, sourceApp?,
/// transactionId? }` and returns the reply value synchronously; a returned
/// Promise is answered with an error. Throwing an object with a
/// numeric `code` (or `errorNumber`) replies with that error number and the
/// object's `message`. The last installed function wins.
#[napi]
pub fn set_dispatch(env: Env, callback: JsFunction) -> Result<()> {
    let reference = env.create_reference(callback)?;
    let previous = DISPATCH_FN.with(|slot| slot.borrow_mut().replace(reference));
    if let Some(mut previous) = previous {
        previous.unref(env)?;
    }

    let bridge = Bridge::global();
    let failure_code = bridge.config().failure_error_code();

    // The threadsafe function only carries events across; the user function
    // is looked up at call time so replacing it needs no new channel.
    let relay = env.create_function_from_closure("aeBridgeRelay", |ctx| ctx.env.get_undefined())?;
    let tsfn: ThreadsafeFunction<PendingEvent, ErrorStrategy::Fatal> = relay
        .create_threadsafe_function(0, move |ctx: ThreadSafeCallContext<PendingEvent>| {
            let result = invoke(&ctx.env, ctx.value.snapshot(), failure_code);
            ctx.value.respond(result);
            Ok(Vec::<JsUnknown>::new())
        })?;

    bridge.set_dispatch_callback(NodeDispatcher {
        tsfn,
        js_thread: RuntimeThread::current(),
    });
    tracing::debug!("installed JavaScript dispatch function");
    Ok(())
}

/// Dispatch callback that parks the OS thread until the JS thread answers
struct NodeDispatcher {
    tsfn: ThreadsafeFunction<PendingEvent, ErrorStrategy::Fatal>,
    js_thread: RuntimeThread,
}

impl DispatchCallback for NodeDispatcher {
    fn dispatch(&self, snapshot: EventSnapshot) -> ae_bridge::Result<HandlerResult> {
        self.js_thread.ensure_elsewhere()?;
        let (pending, waiter) = PendingEvent::new(snapshot);
        match self.tsfn.call(pending, ThreadsafeFunctionCallMode::Blocking) {
            Status::Ok => waiter.wait(),
            status => {
                tracing::warn!(?status, "JavaScript thread refused event");
                Err(ae_bridge::Error::RuntimeClosed)
            }
        }
    }
}

/// Run the installed function for one event, on the JS thread
fn invoke(env: &Env, snapshot: &EventSnapshot, failure_code: i32) -> HandlerResult {
    // Resolve before calling so the callback may replace itself.
    let callback = DISPATCH_FN.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|reference| env.get_reference_value::<JsFunction>(reference))
    });
    let callback = match callback {
        Some(Ok(callback)) => callback,
        Some(Err(err)) => return Err(HandlerError::new(failure_code, err.reason)),
        None => return Err(HandlerError::new(failure_code, "no dispatch function installed")),
    };

    let event = env
        .to_js_value(snapshot)
        .map_err(|err| HandlerError::new(failure_code, err.reason))?;

    match call_function(env, &callback, &event) {
        Ok(returned) if is_promise(env, &returned) => {
            tracing::warn!(suite = %snapshot.suite(), event = %snapshot.event(), "handler returned a Promise");
            Err(HandlerError::new(failure_code, PROMISE_MESSAGE))
        }
        Ok(returned) => Ok(env.from_js_value::<ParsedValue, _>(returned).unwrap_or_else(|err| {
            tracing::debug!(reason = %err.reason, "unrepresentable handler result, replying null");
            ParsedValue::Null
        })),
        Err(Some(exception)) => Err(thrown_to_error(exception, failure_code)),
        Err(None) => Err(HandlerError::new(failure_code, THROWN_MESSAGE)),
    }
}

/// Call `func(arg)` keeping the thrown value, if any
///
/// `JsFunction::call` reduces a thrown value to its string form; the error
/// reply needs its `code` and `message` properties.
fn call_function(
    env: &Env,
    func: &JsFunction,
    arg: &JsUnknown,
) -> std::result::Result<JsUnknown, Option<JsUnknown>> {
    let raw_env = env.raw();
    let mut global = ptr::null_mut();
    let mut returned = ptr::null_mut();

    let status = unsafe {
        let args = [arg.raw()];
        if sys::napi_get_global(raw_env, &mut global) != sys::Status::napi_ok {
            return Err(None);
        }
        sys::napi_call_function(raw_env, global, func.raw(), 1, args.as_ptr(), &mut returned)
    };

    if status == sys::Status::napi_ok {
        return Ok(unsafe { JsUnknown::from_raw_unchecked(raw_env, returned) });
    }

    let mut pending = false;
    unsafe {
        if sys::napi_is_exception_pending(raw_env, &mut pending) != sys::Status::napi_ok || !pending {
            return Err(None);
        }
        let mut exception = ptr::null_mut();
        if sys::napi_get_and_clear_last_exception(raw_env, &mut exception) != sys::Status::napi_ok {
            return Err(None);
        }
        Err(Some(JsUnknown::from_raw_unchecked(raw_env, exception)))
    }
}

fn is_promise(env: &Env, value: &JsUnknown) -> bool {
    let mut promise = false;
    let status = unsafe { sys::napi_is_promise(env.raw(), value.raw(), &mut promise) };
    status == sys::Status::napi_ok && promise
}

/// Read the error number and message from a thrown value
fn thrown_to_error(thrown: JsUnknown, failure_code: i32) -> HandlerError {
    if !matches!(thrown.get_type(), Ok(ValueType::Object)) {
        let message = string_of(thrown).unwrap_or_else(|| THROWN_MESSAGE.to_string());
        return HandlerError::new(failure_code, message);
    }

    let Ok(object) = thrown.coerce_to_object() else {
        return HandlerError::new(failure_code, THROWN_MESSAGE);
    };

    let code = ["errorNumber", "code"]
        .into_iter()
        .find_map(|name| number_property(&object, name))
        .unwrap_or(failure_code);
    let message = string_property(&object, "message")
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| THROWN_MESSAGE.to_string());

    // Node-style string codes (`ERR_FOO`) have no error number; keep them readable.
    match string_property(&object, "code") {
        Some(name) if !name.is_empty() => HandlerError::new(code, format!("[{name}] {message}")),
        _ => HandlerError::new(code, message),
    }
}

fn string_property(object: &JsObject, name: &str) -> Option<String> {
    let value = object.get_named_property_unchecked::<JsUnknown>(name).ok()?;
    if !matches!(value.get_type(), Ok(ValueType::String)) {
        return None;
    }
    string_of(value)
}

/// An integral numeric property that fits an error number
fn number_property(object: &JsObject, name: &str) -> Option<i32> {
    let value = object.get_named_property_unchecked::<JsUnknown>(name).ok()?;
    if !matches!(value.get_type(), Ok(ValueType::Number)) {
        return None;
    }
    let n = value.coerce_to_number().ok()?.get_double().ok()?;
    let integral = n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX);
    integral.then_some(n as i32)
}

fn string_of(value: JsUnknown) -> Option<String> {
    value.coerce_to_string().ok()?.into_utf8().ok()?.into_owned().ok()
}
