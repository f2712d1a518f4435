//! Apple Event Manager backend
//!
//! Implements the descriptor, event, and reply traits over real `AEDesc`s and
//! exposes [`handle_apple_event`], the handler procedure installers pass to
//! `AEInstallEventHandler`.

pub mod ffi;

use std::ffi::c_void;
use std::os::raw::c_long;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::descriptor::{Descriptor, OwnedDescriptor, types};
use crate::dispatch::{Bridge, status};
use crate::error::{Error, Result};
use crate::event::AppleEvent;
use crate::fourcc::FourCharCode;
use crate::reply::ReplySlot;

use self::ffi::{AEDesc, OSErr};

const NO_ERR: OSErr = 0;

fn check(operation: &'static str, status: OSErr) -> Result<()> {
    if status == NO_ERR {
        Ok(())
    } else {
        Err(Error::Native { operation, status })
    }
}

/// A native descriptor, disposed on drop when owned
pub struct MacDesc {
    raw: AEDesc,
    owned: bool,
}

impl MacDesc {
    /// Wrap a descriptor owned by someone else
    ///
    /// # Safety
    /// `raw` must stay valid for the lifetime of the wrapper.
    pub unsafe fn borrowed(raw: AEDesc) -> Self {
        Self { raw, owned: false }
    }

    /// Run a native call that fills in a fresh descriptor
    fn fetch(operation: &'static str, fill: impl FnOnce(*mut AEDesc) -> OSErr) -> Result<Self> {
        let mut raw = AEDesc::null();
        check(operation, fill(&mut raw))?;
        Ok(Self { raw, owned: true })
    }

    pub fn as_raw(&self) -> *const AEDesc {
        &self.raw
    }

    /// Copy an in-memory descriptor tree into native storage
    pub fn from_owned(desc: &OwnedDescriptor) -> Result<Self> {
        match desc {
            OwnedDescriptor::Data {
                descriptor_type,
                bytes,
            } => Self::fetch("AECreateDesc", |out| unsafe {
                ffi::AECreateDesc(
                    descriptor_type.as_u32(),
                    bytes.as_ptr().cast(),
                    bytes.len() as ffi::Size,
                    out,
                )
            }),
            OwnedDescriptor::List(items) => {
                let mut list = Self::fetch("AECreateList", |out| unsafe {
                    ffi::AECreateList(std::ptr::null(), 0, 0, out)
                })?;
                for item in items {
                    let item = Self::from_owned(item)?;
                    check("AEPutDesc", unsafe {
                        ffi::AEPutDesc(&mut list.raw, 0, item.as_raw())
                    })?;
                }
                Ok(list)
            }
            OwnedDescriptor::Record(fields) => {
                let mut record = Self::fetch("AECreateList", |out| unsafe {
                    ffi::AECreateList(std::ptr::null(), 0, 1, out)
                })?;
                for (keyword, field) in fields {
                    let field = Self::from_owned(field)?;
                    check("AEPutKeyDesc", unsafe {
                        ffi::AEPutKeyDesc(&mut record.raw, keyword.as_u32(), field.as_raw())
                    })?;
                }
                Ok(record)
            }
        }
    }
}

impl Drop for MacDesc {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                ffi::AEDisposeDesc(&mut self.raw);
            }
        }
    }
}

impl Descriptor for MacDesc {
    fn descriptor_type(&self) -> FourCharCode {
        let descriptor_type = self.raw.descriptorType;
        FourCharCode::from_u32(descriptor_type)
    }

    fn data(&self) -> Option<Vec<u8>> {
        let size = unsafe { ffi::AEGetDescDataSize(self.as_raw()) };
        let len = usize::try_from(size).ok()?;
        let mut buf = vec![0u8; len];
        if len > 0 {
            let status = unsafe { ffi::AEGetDescData(self.as_raw(), buf.as_mut_ptr().cast(), size) };
            if status != NO_ERR {
                tracing::debug!(status, "AEGetDescData failed");
                return None;
            }
        }
        Some(buf)
    }

    fn count(&self) -> Option<usize> {
        count_items(self.as_raw())
    }

    fn nth(&self, index: usize) -> Option<(FourCharCode, Self)> {
        nth_item(self.as_raw(), index)
    }

    fn is_record(&self) -> bool {
        self.descriptor_type() == types::RECORD || unsafe { ffi::AECheckIsRecord(self.as_raw()) != 0 }
    }
}

fn count_items(raw: *const AEDesc) -> Option<usize> {
    let mut count: c_long = 0;
    let status = unsafe { ffi::AECountItems(raw, &mut count) };
    if status != NO_ERR {
        return None;
    }
    usize::try_from(count).ok()
}

fn nth_item(raw: *const AEDesc, index: usize) -> Option<(FourCharCode, MacDesc)> {
    let position = c_long::try_from(index + 1).ok()?;
    let mut keyword: ffi::AEKeyword = 0;
    let item = MacDesc::fetch("AEGetNthDesc", |out| unsafe {
        ffi::AEGetNthDesc(raw, position, types::WILDCARD.as_u32(), &mut keyword, out)
    })
    .ok()?;
    Some((FourCharCode::from_u32(keyword), item))
}

/// An incoming Apple Event owned by the Apple Event Manager
pub struct MacAppleEvent {
    raw: *const AEDesc,
}

impl MacAppleEvent {
    /// # Safety
    /// `raw` must point to a valid Apple Event for the wrapper's lifetime.
    pub unsafe fn from_raw(raw: *const AEDesc) -> Self {
        Self { raw }
    }
}

impl AppleEvent for MacAppleEvent {
    type Desc = MacDesc;

    fn attribute(&self, keyword: FourCharCode) -> Option<MacDesc> {
        MacDesc::fetch("AEGetAttributeDesc", |out| unsafe {
            ffi::AEGetAttributeDesc(self.raw, keyword.as_u32(), types::WILDCARD.as_u32(), out)
        })
        .ok()
    }

    fn parameter_count(&self) -> usize {
        count_items(self.raw).unwrap_or(0)
    }

    fn parameter(&self, index: usize) -> Option<(FourCharCode, MacDesc)> {
        nth_item(self.raw, index)
    }
}

/// The reply Apple Event handed to a handler
pub struct MacReply {
    raw: *mut AEDesc,
}

impl MacReply {
    /// # Safety
    /// `raw` must be null or point to a valid reply event for the wrapper's lifetime.
    pub unsafe fn from_raw(raw: *mut AEDesc) -> Self {
        Self { raw }
    }
}

impl ReplySlot for MacReply {
    fn expects_reply(&self) -> bool {
        if self.raw.is_null() {
            return false;
        }
        let reply = unsafe { *self.raw };
        let descriptor_type = reply.descriptorType;
        descriptor_type != types::NULL.as_u32()
    }

    fn put_param(&mut self, keyword: FourCharCode, value: &OwnedDescriptor) -> Result<()> {
        let desc = MacDesc::from_owned(value)?;
        check("AEPutParamDesc", unsafe {
            ffi::AEPutParamDesc(self.raw, keyword.as_u32(), desc.as_raw())
        })
    }
}

/// Handler procedure forwarding every event to the process-wide [`Bridge`]
pub extern "C" fn handle_apple_event(
    event: *const AEDesc,
    reply: *mut AEDesc,
    _refcon: *mut c_void,
) -> OSErr {
    if event.is_null() {
        return status::EVENT_FAILED;
    }
    catch_unwind(AssertUnwindSafe(|| {
        let event = unsafe { MacAppleEvent::from_raw(event) };
        let mut reply = unsafe { MacReply::from_raw(reply) };
        Bridge::global().on_event(&event, &mut reply)
    }))
    .unwrap_or(status::EVENT_FAILED)
}

/// [`handle_apple_event`] as an `AEEventHandlerProcPtr`
pub const EVENT_HANDLER: ffi::AEEventHandlerProc = handle_apple_event;
