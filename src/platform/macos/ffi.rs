// FFI bindings to the Apple Event Manager (CoreServices/AE.framework)

#![allow(non_snake_case)]

use std::ffi::c_void;
use std::os::raw::c_long;

pub type OSErr = i16;
pub type DescType = u32;
pub type AEKeyword = u32;
pub type Size = isize;
pub type Boolean = u8;

/// Native descriptor record
///
/// Declared under `#pragma pack(2)` in AEDataModel.h, so the handle sits at
/// offset 4 on 64-bit targets.
#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct AEDesc {
    pub descriptorType: DescType,
    pub dataHandle: *mut c_void,
}

impl AEDesc {
    /// `typeNull` descriptor with no storage, as `AEInitializeDesc` produces
    pub const fn null() -> Self {
        Self {
            descriptorType: u32::from_be_bytes(*b"null"),
            dataHandle: std::ptr::null_mut(),
        }
    }
}

/// `AEEventHandlerProcPtr`
pub type AEEventHandlerProc =
    extern "C" fn(event: *const AEDesc, reply: *mut AEDesc, refcon: *mut c_void) -> OSErr;

#[link(name = "CoreServices", kind = "framework")]
unsafe extern "C" {
    pub fn AEGetDescDataSize(theAEDesc: *const AEDesc) -> Size;

    pub fn AEGetDescData(theAEDesc: *const AEDesc, dataPtr: *mut c_void, maximumSize: Size) -> OSErr;

    pub fn AECountItems(theAEDescList: *const AEDesc, theCount: *mut c_long) -> OSErr;

    /// `index` is one-based
    pub fn AEGetNthDesc(
        theAEDescList: *const AEDesc,
        index: c_long,
        desiredType: DescType,
        theAEKeyword: *mut AEKeyword,
        result: *mut AEDesc,
    ) -> OSErr;

    pub fn AECheckIsRecord(theDesc: *const AEDesc) -> Boolean;

    pub fn AEGetAttributeDesc(
        theAppleEvent: *const AEDesc,
        theAEKeyword: AEKeyword,
        desiredType: DescType,
        result: *mut AEDesc,
    ) -> OSErr;

    pub fn AECreateDesc(
        typeCode: DescType,
        dataPtr: *const c_void,
        dataSize: Size,
        result: *mut AEDesc,
    ) -> OSErr;

    pub fn AECreateList(
        factoringPtr: *const c_void,
        factoredSize: Size,
        isRecord: Boolean,
        resultList: *mut AEDesc,
    ) -> OSErr;

    /// `index` 0 appends
    pub fn AEPutDesc(theAEDescList: *mut AEDesc, index: c_long, theAEDesc: *const AEDesc) -> OSErr;

    pub fn AEPutKeyDesc(
        theAERecord: *mut AEDesc,
        theAEKeyword: AEKeyword,
        theAEDesc: *const AEDesc,
    ) -> OSErr;

    pub fn AEPutParamDesc(
        theAppleEvent: *mut AEDesc,
        theAEKeyword: AEKeyword,
        theAEDesc: *const AEDesc,
    ) -> OSErr;

    pub fn AEDisposeDesc(theAEDesc: *mut AEDesc) -> OSErr;
}
