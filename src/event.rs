//! Incoming events and their thread-safe snapshots

use std::collections::BTreeMap;

use serde::Serialize;

use crate::descriptor::{Descriptor, OwnedDescriptor, keywords, types};
use crate::error::{Error, Result};
use crate::fourcc::FourCharCode;
use crate::parser;
use crate::value::ParsedValue;

/// Read access to an incoming Apple Event
///
/// An event is a record of parameters plus out-of-band attributes (class,
/// id, addressing, transaction). Parameters are enumerated positionally.
pub trait AppleEvent {
    type Desc: Descriptor;

    /// Attribute descriptor by keyword, if the event declares it
    fn attribute(&self, keyword: FourCharCode) -> Option<Self::Desc>;

    fn parameter_count(&self) -> usize;

    /// Parameter at a zero-based index together with its keyword
    fn parameter(&self, index: usize) -> Option<(FourCharCode, Self::Desc)>;

    /// Suite (event class) code
    fn event_class(&self) -> Option<FourCharCode> {
        self.attribute(keywords::EVENT_CLASS)
            .and_then(|desc| desc.data())
            .and_then(|data| FourCharCode::from_ne_slice(&data))
    }

    /// Event id code
    fn event_id(&self) -> Option<FourCharCode> {
        self.attribute(keywords::EVENT_ID)
            .and_then(|desc| desc.data())
            .and_then(|data| FourCharCode::from_ne_slice(&data))
    }
}

/// An event assembled in memory
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedAppleEvent {
    attributes: Vec<(FourCharCode, OwnedDescriptor)>,
    parameters: Vec<(FourCharCode, OwnedDescriptor)>,
}

impl OwnedAppleEvent {
    pub fn new(suite: FourCharCode, event: FourCharCode) -> Self {
        Self {
            attributes: vec![
                (keywords::EVENT_CLASS, OwnedDescriptor::type_code(suite)),
                (keywords::EVENT_ID, OwnedDescriptor::type_code(event)),
            ],
            parameters: Vec::new(),
        }
    }

    /// An event with neither class nor id attributes
    pub fn empty() -> Self {
        Self {
            attributes: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, keyword: FourCharCode, value: OwnedDescriptor) -> Self {
        self.parameters.push((keyword, value));
        self
    }

    pub fn attr(mut self, keyword: FourCharCode, value: OwnedDescriptor) -> Self {
        self.attributes.retain(|(key, _)| *key != keyword);
        self.attributes.push((keyword, value));
        self
    }

    /// Address the event to a target application by bundle id
    pub fn target(self, bundle_id: &str) -> Self {
        self.attr(
            keywords::ADDRESS,
            OwnedDescriptor::raw(types::APPLICATION_BUNDLE_ID, bundle_id.as_bytes()),
        )
    }

    /// Record the sending application by bundle id
    pub fn source(self, bundle_id: &str) -> Self {
        self.attr(
            keywords::ORIGINAL_ADDRESS,
            OwnedDescriptor::raw(types::APPLICATION_BUNDLE_ID, bundle_id.as_bytes()),
        )
    }

    pub fn transaction(self, id: i32) -> Self {
        self.attr(keywords::TRANSACTION_ID, OwnedDescriptor::int32(id))
    }
}

impl<'a> AppleEvent for &'a OwnedAppleEvent {
    type Desc = &'a OwnedDescriptor;

    fn attribute(&self, keyword: FourCharCode) -> Option<Self::Desc> {
        let event: &'a OwnedAppleEvent = *self;
        event
            .attributes
            .iter()
            .find(|(key, _)| *key == keyword)
            .map(|(_, desc)| desc)
    }

    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn parameter(&self, index: usize) -> Option<(FourCharCode, Self::Desc)> {
        let event: &'a OwnedAppleEvent = *self;
        event.parameters.get(index).map(|(key, desc)| (*key, desc))
    }
}

/// Immutable, self-contained copy of one incoming event
///
/// Holds no reference into native memory and is `Send + Sync`, so it can be
/// handed from the OS delivery thread to the runtime context. Serializes to
/// the object shape delivered to runtime callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    suite: String,
    event: String,
    params: BTreeMap<String, ParsedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<i32>,
}

impl EventSnapshot {
    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn params(&self) -> &BTreeMap<String, ParsedValue> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&ParsedValue> {
        self.params.get(key)
    }

    pub fn target_app(&self) -> Option<&str> {
        self.target_app.as_deref()
    }

    pub fn source_app(&self) -> Option<&str> {
        self.source_app.as_deref()
    }

    pub fn transaction_id(&self) -> Option<i32> {
        self.transaction_id
    }
}

/// Build a snapshot of `event` with the default parser nesting limit
pub fn build_snapshot<E: AppleEvent>(event: &E) -> Result<EventSnapshot> {
    build_snapshot_with_limit(event, parser::DEFAULT_MAX_DEPTH)
}

/// Build a snapshot of `event`
///
/// Fails only when the event lacks a class or id attribute; parameter values
/// themselves never fail to parse.
pub fn build_snapshot_with_limit<E: AppleEvent>(
    event: &E,
    max_depth: usize,
) -> Result<EventSnapshot> {
    let suite = event
        .event_class()
        .ok_or(Error::MissingAttribute(keywords::EVENT_CLASS))?;
    let id = event
        .event_id()
        .ok_or(Error::MissingAttribute(keywords::EVENT_ID))?;

    let mut params = BTreeMap::new();
    for index in 0..event.parameter_count() {
        let Some((keyword, desc)) = event.parameter(index) else {
            continue;
        };
        if keywords::is_reserved(keyword) {
            continue;
        }
        params.insert(
            keyword.to_string(),
            parser::parse_with_limit(&desc, max_depth),
        );
    }

    Ok(EventSnapshot {
        suite: suite.to_string(),
        event: id.to_string(),
        params,
        target_app: event
            .attribute(keywords::ADDRESS)
            .and_then(|desc| application_id(&desc)),
        source_app: event
            .attribute(keywords::ORIGINAL_ADDRESS)
            .and_then(|desc| application_id(&desc)),
        transaction_id: event
            .attribute(keywords::TRANSACTION_ID)
            .and_then(|desc| desc.data())
            .and_then(|data| <[u8; 4]>::try_from(data.as_slice()).ok())
            .map(i32::from_ne_bytes),
    })
}

/// Resolve an addressing descriptor to a printable application identifier
fn application_id<D: Descriptor>(desc: &D) -> Option<String> {
    let data = desc.data()?;
    match desc.descriptor_type() {
        types::APPLICATION_BUNDLE_ID => String::from_utf8(data).ok(),
        types::APPLICATION_SIGNATURE => FourCharCode::from_ne_slice(&data).map(String::from),
        types::KERNEL_PROCESS_ID => {
            let pid = i32::from_ne_bytes(data.as_slice().try_into().ok()?);
            Some(format!("pid:{pid}"))
        }
        types::PROCESS_SERIAL_NUMBER => {
            let (high, low) = data.split_at_checked(4)?;
            let high = u32::from_ne_bytes(high.try_into().ok()?);
            let low = u32::from_ne_bytes(low.try_into().ok()?);
            Some(format!("psn:{high}-{low}"))
        }
        other => match parser::decode_scalar(other, &data) {
            ParsedValue::String(s) => Some(s),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::fourcc;
    use serde_json::json;

    #[test]
    fn test_basic_snapshot() {
        let event = OwnedAppleEvent::new(fourcc(b"core"), fourcc(b"getd"))
            .param(fourcc(b"kocl"), OwnedDescriptor::text("window"));

        let snapshot = build_snapshot(&&event).unwrap();
        assert_eq!(snapshot.suite(), "core");
        assert_eq!(snapshot.event(), "getd");
        assert_eq!(snapshot.param("kocl"), Some(&ParsedValue::from("window")));
        assert_eq!(snapshot.target_app(), None);
        assert_eq!(snapshot.source_app(), None);
        assert_eq!(snapshot.transaction_id(), None);

        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({ "suite": "core", "event": "getd", "params": { "kocl": "window" } })
        );
    }

    #[test]
    fn test_addressing_and_transaction() {
        let event = OwnedAppleEvent::new(fourcc(b"aevt"), fourcc(b"odoc"))
            .target("com.example.Editor")
            .source("com.apple.Finder")
            .transaction(7)
            .param(
                fourcc(b"----"),
                OwnedDescriptor::list([OwnedDescriptor::text("/tmp/a.txt")]),
            );

        let snapshot = build_snapshot(&&event).unwrap();
        assert_eq!(snapshot.target_app(), Some("com.example.Editor"));
        assert_eq!(snapshot.source_app(), Some("com.apple.Finder"));
        assert_eq!(snapshot.transaction_id(), Some(7));
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({
                "suite": "aevt",
                "event": "odoc",
                "params": { "----": ["/tmp/a.txt"] },
                "targetApp": "com.example.Editor",
                "sourceApp": "com.apple.Finder",
                "transactionId": 7,
            })
        );
    }

    #[test]
    fn test_application_id_forms() {
        let signature = OwnedDescriptor::raw(
            types::APPLICATION_SIGNATURE,
            fourcc(b"MACS").as_u32().to_ne_bytes(),
        );
        assert_eq!(application_id(&&signature).as_deref(), Some("MACS"));

        let pid = OwnedDescriptor::raw(types::KERNEL_PROCESS_ID, 4242i32.to_ne_bytes());
        assert_eq!(application_id(&&pid).as_deref(), Some("pid:4242"));

        let mut psn = 0u32.to_ne_bytes().to_vec();
        psn.extend(17u32.to_ne_bytes());
        let psn = OwnedDescriptor::raw(types::PROCESS_SERIAL_NUMBER, psn);
        assert_eq!(application_id(&&psn).as_deref(), Some("psn:0-17"));

        let text = OwnedDescriptor::unicode_text("Script Editor");
        assert_eq!(application_id(&&text).as_deref(), Some("Script Editor"));

        let unknown = OwnedDescriptor::raw(fourcc(b"aprl"), vec![1, 2, 3]);
        assert_eq!(application_id(&&unknown), None);
    }

    #[test]
    fn test_reserved_keys_skipped() {
        let event = OwnedAppleEvent::new(fourcc(b"core"), fourcc(b"setd"))
            .param(fourcc(b"data"), OwnedDescriptor::int32(3))
            .param(keywords::TIMEOUT, OwnedDescriptor::int32(60))
            .param(keywords::SUBJECT, OwnedDescriptor::null());

        let snapshot = build_snapshot(&&event).unwrap();
        assert_eq!(snapshot.params().len(), 1);
        assert_eq!(snapshot.param("data"), Some(&ParsedValue::Number(3.0)));
    }

    #[test]
    fn test_unrecognized_param_is_null() {
        let event = OwnedAppleEvent::new(fourcc(b"core"), fourcc(b"getd"))
            .param(fourcc(b"alis"), OwnedDescriptor::raw(fourcc(b"alis"), vec![9; 16]));

        let snapshot = build_snapshot(&&event).unwrap();
        assert_eq!(snapshot.param("alis"), Some(&ParsedValue::Null));
    }

    #[test]
    fn test_transaction_requires_declaration() {
        let event = OwnedAppleEvent::new(fourcc(b"core"), fourcc(b"getd"))
            .attr(keywords::TRANSACTION_ID, OwnedDescriptor::raw(types::SINT32, vec![1]));

        let snapshot = build_snapshot(&&event).unwrap();
        assert_eq!(snapshot.transaction_id(), None);
    }

    #[test]
    fn test_missing_class_is_an_error() {
        let event = OwnedAppleEvent::empty();
        let err = build_snapshot(&&event).unwrap_err();
        assert!(matches!(err, Error::MissingAttribute(code) if code == keywords::EVENT_CLASS));
    }

    #[test]
    fn test_snapshot_is_thread_safe() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<EventSnapshot>();
    }
}
