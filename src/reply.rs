//! Reply marshaling
//!
//! Turns a handler's result back into native reply parameters. Success puts
//! the encoded value under the direct-object keyword; failure follows the
//! standard error convention of an error number (`errn`) and message (`errs`).

use crate::descriptor::{OwnedDescriptor, keywords, types};
use crate::dispatch::HandlerResult;
use crate::error::{Error, Result};
use crate::fourcc::FourCharCode;
use crate::value::ParsedValue;

/// Message used when a failing handler gives no message of its own
const DEFAULT_ERROR_MESSAGE: &str = "event handler failed";

/// Write access to the reply the sender is waiting on
pub trait ReplySlot {
    /// Whether the sender asked for a reply at all
    fn expects_reply(&self) -> bool {
        true
    }

    fn put_param(&mut self, keyword: FourCharCode, value: &OwnedDescriptor) -> Result<()>;
}

impl ReplySlot for OwnedDescriptor {
    fn expects_reply(&self) -> bool {
        !matches!(self, OwnedDescriptor::Data { descriptor_type, .. } if *descriptor_type == types::NULL)
    }

    fn put_param(&mut self, keyword: FourCharCode, value: &OwnedDescriptor) -> Result<()> {
        if !matches!(self, OwnedDescriptor::Record(_)) {
            return Err(Error::Encode("reply is not a record".to_string()));
        }
        self.put(keyword, value.clone());
        Ok(())
    }
}

/// Encode a value as a native descriptor
///
/// Returns `None` for `Null`, which has no reply representation.
pub fn encode(value: &ParsedValue) -> Option<OwnedDescriptor> {
    match value {
        ParsedValue::Null => None,
        ParsedValue::Bool(b) => Some(OwnedDescriptor::boolean(*b)),
        ParsedValue::Number(n) => Some(encode_number(*n)),
        ParsedValue::String(s) => Some(OwnedDescriptor::text(s)),
        ParsedValue::Array(items) => Some(OwnedDescriptor::list(
            items
                .iter()
                .map(|item| encode(item).unwrap_or_else(OwnedDescriptor::null)),
        )),
        ParsedValue::Object(fields) => {
            let mut record = Vec::with_capacity(fields.len());
            for (key, value) in fields {
                let Ok(keyword) = key.parse::<FourCharCode>() else {
                    tracing::warn!(key = %key, "skipping reply field without a four-character key");
                    continue;
                };
                record.push((keyword, encode(value).unwrap_or_else(OwnedDescriptor::null)));
            }
            Some(OwnedDescriptor::Record(record))
        }
    }
}

fn encode_number(n: f64) -> OwnedDescriptor {
    let integral = n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX);
    if integral && !(n == 0.0 && n.is_sign_negative()) {
        OwnedDescriptor::int32(n as i32)
    } else {
        OwnedDescriptor::float64(n)
    }
}

/// Build the reply parameters for a handler result
///
/// An error without a usable number (`0`) is reported as `failure_code`.
pub fn to_reply(result: &HandlerResult, failure_code: i32) -> OwnedDescriptor {
    let mut reply = OwnedDescriptor::record([]);
    match result {
        Ok(value) => {
            if let Some(desc) = encode(value) {
                reply.put(keywords::DIRECT_OBJECT, desc);
            }
        }
        Err(err) => {
            let code = match err.code() {
                0 => failure_code,
                code => code,
            };
            let message = match err.message() {
                "" => DEFAULT_ERROR_MESSAGE,
                message => message,
            };
            reply.put(keywords::ERROR_NUMBER, OwnedDescriptor::int32(code));
            reply.put(keywords::ERROR_STRING, OwnedDescriptor::text(message));
        }
    }
    reply
}

/// Copy reply parameters into the native slot
pub fn write_reply<S: ReplySlot + ?Sized>(slot: &mut S, reply: &OwnedDescriptor) -> Result<()> {
    if !slot.expects_reply() {
        return Ok(());
    }
    if let OwnedDescriptor::Record(fields) = reply {
        for (keyword, value) in fields {
            slot.put_param(*keyword, value)?;
        }
    }
    Ok(())
}
