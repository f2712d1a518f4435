//! Native descriptor abstraction
//!
//! A descriptor is the self-describing container the Apple Event Manager uses
//! for every value: a four-character type code plus either opaque data bytes,
//! an ordered list of descriptors, or a keyword-indexed record. The
//! [`Descriptor`] trait is the read side the parser needs; the macOS backend
//! implements it over real `AEDesc`s and [`OwnedDescriptor`] implements it in
//! memory.

use crate::fourcc::{FourCharCode, fourcc};

/// Descriptor type codes understood by the parser and the reply encoder
pub mod types {
    use super::*;

    pub const NULL: FourCharCode = fourcc(b"null");
    pub const UTF8_TEXT: FourCharCode = fourcc(b"utf8");
    pub const UNICODE_TEXT: FourCharCode = fourcc(b"utxt");
    pub const CHAR: FourCharCode = fourcc(b"TEXT");
    pub const SINT16: FourCharCode = fourcc(b"shor");
    pub const SINT32: FourCharCode = fourcc(b"long");
    pub const SINT64: FourCharCode = fourcc(b"comp");
    pub const UINT16: FourCharCode = fourcc(b"ushr");
    pub const UINT32: FourCharCode = fourcc(b"magn");
    pub const UINT64: FourCharCode = fourcc(b"ucom");
    pub const FLOAT32: FourCharCode = fourcc(b"sing");
    pub const FLOAT64: FourCharCode = fourcc(b"doub");
    pub const BOOLEAN: FourCharCode = fourcc(b"bool");
    pub const TRUE: FourCharCode = fourcc(b"true");
    pub const FALSE: FourCharCode = fourcc(b"fals");
    pub const LIST: FourCharCode = fourcc(b"list");
    pub const RECORD: FourCharCode = fourcc(b"reco");
    pub const TYPE: FourCharCode = fourcc(b"type");
    pub const ENUMERATED: FourCharCode = fourcc(b"enum");
    pub const KEYWORD: FourCharCode = fourcc(b"keyw");
    pub const PROPERTY: FourCharCode = fourcc(b"prop");
    pub const APPLICATION_BUNDLE_ID: FourCharCode = fourcc(b"bund");
    pub const APPLICATION_SIGNATURE: FourCharCode = fourcc(b"sign");
    pub const KERNEL_PROCESS_ID: FourCharCode = fourcc(b"kpid");
    pub const PROCESS_SERIAL_NUMBER: FourCharCode = fourcc(b"psn ");
    /// Wildcard used as the keyword of list items and as "any type" in
    /// native lookups
    pub const WILDCARD: FourCharCode = fourcc(b"****");
}

/// Parameter and attribute keywords
pub mod keywords {
    use super::*;

    pub const DIRECT_OBJECT: FourCharCode = fourcc(b"----");
    pub const ERROR_NUMBER: FourCharCode = fourcc(b"errn");
    pub const ERROR_STRING: FourCharCode = fourcc(b"errs");

    pub const EVENT_CLASS: FourCharCode = fourcc(b"evcl");
    pub const EVENT_ID: FourCharCode = fourcc(b"evid");
    pub const ADDRESS: FourCharCode = fourcc(b"addr");
    pub const ORIGINAL_ADDRESS: FourCharCode = fourcc(b"from");
    pub const TRANSACTION_ID: FourCharCode = fourcc(b"tran");
    pub const RETURN_ID: FourCharCode = fourcc(b"rtid");
    pub const EVENT_SOURCE: FourCharCode = fourcc(b"esrc");
    pub const MISSED_KEYWORD: FourCharCode = fourcc(b"miss");
    pub const SUBJECT: FourCharCode = fourcc(b"subj");
    pub const INTERACT_LEVEL: FourCharCode = fourcc(b"inte");
    pub const TIMEOUT: FourCharCode = fourcc(b"timo");
    pub const OPTIONAL_KEYWORD: FourCharCode = fourcc(b"optk");

    /// Structural keywords that never denote a user-facing parameter
    pub const RESERVED: [FourCharCode; 12] = [
        EVENT_CLASS,
        EVENT_ID,
        ADDRESS,
        RETURN_ID,
        TRANSACTION_ID,
        EVENT_SOURCE,
        ORIGINAL_ADDRESS,
        MISSED_KEYWORD,
        SUBJECT,
        INTERACT_LEVEL,
        TIMEOUT,
        OPTIONAL_KEYWORD,
    ];

    pub fn is_reserved(keyword: FourCharCode) -> bool {
        RESERVED.contains(&keyword)
    }
}

/// Read access to a native value container
///
/// Implementations must hand out owned data so nothing returned here keeps
/// the native container alive.
pub trait Descriptor: Sized {
    /// The declared type code
    fn descriptor_type(&self) -> FourCharCode;

    /// Raw data bytes in native byte order, or `None` if they cannot be read
    fn data(&self) -> Option<Vec<u8>>;

    /// Number of items for list and record descriptors
    fn count(&self) -> Option<usize>;

    /// Item at a zero-based index together with its keyword
    ///
    /// List items report [`types::WILDCARD`] as their keyword.
    fn nth(&self, index: usize) -> Option<(FourCharCode, Self)>;

    fn is_list(&self) -> bool {
        self.descriptor_type() == types::LIST
    }

    fn is_record(&self) -> bool {
        self.descriptor_type() == types::RECORD
    }
}

/// An in-memory descriptor tree
///
/// Used to build replies before they are copied into native containers, and
/// to drive the parser without the Apple Event Manager.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedDescriptor {
    Data {
        descriptor_type: FourCharCode,
        bytes: Vec<u8>,
    },
    List(Vec<OwnedDescriptor>),
    Record(Vec<(FourCharCode, OwnedDescriptor)>),
}

impl OwnedDescriptor {
    pub fn raw(descriptor_type: FourCharCode, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            descriptor_type,
            bytes: bytes.into(),
        }
    }

    pub fn null() -> Self {
        Self::raw(types::NULL, Vec::new())
    }

    /// UTF-8 text (`utf8`)
    pub fn text(value: &str) -> Self {
        Self::raw(types::UTF8_TEXT, value.as_bytes())
    }

    /// UTF-16 text in native byte order (`utxt`)
    pub fn unicode_text(value: &str) -> Self {
        let bytes: Vec<u8> = value
            .encode_utf16()
            .flat_map(|unit| unit.to_ne_bytes())
            .collect();
        Self::raw(types::UNICODE_TEXT, bytes)
    }

    pub fn int32(value: i32) -> Self {
        Self::raw(types::SINT32, value.to_ne_bytes())
    }

    pub fn float64(value: f64) -> Self {
        Self::raw(types::FLOAT64, value.to_ne_bytes())
    }

    /// Boolean as the dataless `true`/`fals` forms
    pub fn boolean(value: bool) -> Self {
        Self::raw(if value { types::TRUE } else { types::FALSE }, Vec::new())
    }

    /// A type-code value (`type`)
    pub fn type_code(code: FourCharCode) -> Self {
        Self::raw(types::TYPE, code.as_u32().to_ne_bytes())
    }

    pub fn list(items: impl IntoIterator<Item = OwnedDescriptor>) -> Self {
        Self::List(items.into_iter().collect())
    }

    pub fn record(fields: impl IntoIterator<Item = (FourCharCode, OwnedDescriptor)>) -> Self {
        Self::Record(fields.into_iter().collect())
    }

    /// Field of a record descriptor by keyword
    pub fn get(&self, keyword: FourCharCode) -> Option<&OwnedDescriptor> {
        match self {
            Self::Record(fields) => fields
                .iter()
                .find(|(key, _)| *key == keyword)
                .map(|(_, desc)| desc),
            _ => None,
        }
    }

    /// Insert or replace a record field, keeping the original position on replace
    pub fn put(&mut self, keyword: FourCharCode, value: OwnedDescriptor) {
        if let Self::Record(fields) = self {
            match fields.iter_mut().find(|(key, _)| *key == keyword) {
                Some((_, slot)) => *slot = value,
                None => fields.push((keyword, value)),
            }
        }
    }
}

impl<'a> Descriptor for &'a OwnedDescriptor {
    fn descriptor_type(&self) -> FourCharCode {
        match *self {
            OwnedDescriptor::Data {
                descriptor_type, ..
            } => *descriptor_type,
            OwnedDescriptor::List(_) => types::LIST,
            OwnedDescriptor::Record(_) => types::RECORD,
        }
    }

    fn data(&self) -> Option<Vec<u8>> {
        match *self {
            OwnedDescriptor::Data { bytes, .. } => Some(bytes.clone()),
            _ => None,
        }
    }

    fn count(&self) -> Option<usize> {
        match *self {
            OwnedDescriptor::Data { .. } => None,
            OwnedDescriptor::List(items) => Some(items.len()),
            OwnedDescriptor::Record(fields) => Some(fields.len()),
        }
    }

    fn nth(&self, index: usize) -> Option<(FourCharCode, Self)> {
        match *self {
            OwnedDescriptor::Data { .. } => None,
            OwnedDescriptor::List(items) => items.get(index).map(|item| (types::WILDCARD, item)),
            OwnedDescriptor::Record(fields) => fields.get(index).map(|(key, desc)| (*key, desc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_kinds() {
        let list = OwnedDescriptor::list([OwnedDescriptor::int32(1), OwnedDescriptor::null()]);
        assert!((&list).is_list());
        assert_eq!((&list).count(), Some(2));
        assert_eq!((&list).data(), None);

        let (key, first) = (&list).nth(0).unwrap();
        assert_eq!(key, types::WILDCARD);
        assert_eq!(first.descriptor_type(), types::SINT32);
        assert!((&list).nth(2).is_none());
    }

    #[test]
    fn test_record_put_replaces_in_place() {
        let mut record = OwnedDescriptor::record([
            (fourcc(b"aaaa"), OwnedDescriptor::int32(1)),
            (fourcc(b"bbbb"), OwnedDescriptor::int32(2)),
        ]);
        record.put(fourcc(b"aaaa"), OwnedDescriptor::text("x"));
        record.put(fourcc(b"cccc"), OwnedDescriptor::null());

        let (first, _) = (&record).nth(0).unwrap();
        assert_eq!(first, fourcc(b"aaaa"));
        assert_eq!(
            record.get(fourcc(b"aaaa")),
            Some(&OwnedDescriptor::text("x"))
        );
        assert_eq!((&record).count(), Some(3));
    }

    #[test]
    fn test_reserved_keywords() {
        assert!(keywords::is_reserved(keywords::TRANSACTION_ID));
        assert!(keywords::is_reserved(keywords::ADDRESS));
        assert!(!keywords::is_reserved(keywords::DIRECT_OBJECT));
        assert!(!keywords::is_reserved(fourcc(b"kocl")));
    }
}
