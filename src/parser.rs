//! Descriptor parser
//!
//! Converts any native descriptor into a [`ParsedValue`]. Parsing is total:
//! unknown type codes, wrong data sizes, undecodable text, and nesting deeper
//! than the configured limit all degrade to [`ParsedValue::Null`] for that
//! node instead of failing the whole event. Zero-length text is the one
//! dataless scalar that still has a value, the empty string.
//!
//! Code-valued descriptors (`type`, `enum`, `keyw`, `prop`) read as their
//! four-character string, e.g. `kocl` → `"cwin"`.

use std::collections::BTreeMap;

use crate::descriptor::{Descriptor, types};
use crate::fourcc::FourCharCode;
use crate::value::ParsedValue;

/// Nesting limit used by [`parse`]
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parse a descriptor with the default nesting limit
pub fn parse<D: Descriptor>(desc: &D) -> ParsedValue {
    parse_with_limit(desc, DEFAULT_MAX_DEPTH)
}

/// Parse a descriptor, treating anything nested deeper than `max_depth`
/// containers as `Null`
pub fn parse_with_limit<D: Descriptor>(desc: &D, max_depth: usize) -> ParsedValue {
    parse_node(desc, max_depth)
}

fn parse_node<D: Descriptor>(desc: &D, remaining: usize) -> ParsedValue {
    if desc.is_list() {
        return parse_list(desc, remaining);
    }
    if desc.is_record() {
        return parse_record(desc, remaining);
    }

    let descriptor_type = desc.descriptor_type();
    match descriptor_type {
        types::NULL => ParsedValue::Null,
        types::TRUE => ParsedValue::Bool(true),
        types::FALSE => ParsedValue::Bool(false),
        _ => match desc.data() {
            Some(data) if !data.is_empty() => decode_scalar(descriptor_type, &data),
            Some(_) if is_text(descriptor_type) => ParsedValue::String(String::new()),
            _ => {
                tracing::trace!(%descriptor_type, "descriptor has no data");
                ParsedValue::Null
            }
        },
    }
}

fn parse_list<D: Descriptor>(desc: &D, remaining: usize) -> ParsedValue {
    let Some(remaining) = remaining.checked_sub(1) else {
        tracing::warn!("descriptor nesting limit reached");
        return ParsedValue::Null;
    };
    let Some(count) = desc.count() else {
        return ParsedValue::Null;
    };

    let items = (0..count)
        .map(|index| match desc.nth(index) {
            Some((_, item)) => parse_node(&item, remaining),
            None => ParsedValue::Null,
        })
        .collect();
    ParsedValue::Array(items)
}

fn parse_record<D: Descriptor>(desc: &D, remaining: usize) -> ParsedValue {
    let Some(remaining) = remaining.checked_sub(1) else {
        tracing::warn!("descriptor nesting limit reached");
        return ParsedValue::Null;
    };
    let Some(count) = desc.count() else {
        return ParsedValue::Null;
    };

    let mut fields = BTreeMap::new();
    for index in 0..count {
        if let Some((keyword, field)) = desc.nth(index) {
            fields.insert(keyword.to_string(), parse_node(&field, remaining));
        }
    }
    ParsedValue::Object(fields)
}

/// Decode the data of a non-container descriptor
pub(crate) fn decode_scalar(descriptor_type: FourCharCode, data: &[u8]) -> ParsedValue {
    let value: Option<ParsedValue> = match descriptor_type {
        types::UTF8_TEXT => std::str::from_utf8(data)
            .ok()
            .map(|s| ParsedValue::String(s.to_string())),
        types::UNICODE_TEXT => decode_utf16(data).map(ParsedValue::String),
        types::CHAR => Some(ParsedValue::String(
            String::from_utf8_lossy(data).into_owned(),
        )),
        types::SINT16 => read::<2>(data).map(|b| f64::from(i16::from_ne_bytes(b)).into()),
        types::SINT32 => read::<4>(data).map(|b| f64::from(i32::from_ne_bytes(b)).into()),
        types::SINT64 => read::<8>(data).map(|b| (i64::from_ne_bytes(b) as f64).into()),
        types::UINT16 => read::<2>(data).map(|b| f64::from(u16::from_ne_bytes(b)).into()),
        types::UINT32 => read::<4>(data).map(|b| f64::from(u32::from_ne_bytes(b)).into()),
        types::UINT64 => read::<8>(data).map(|b| (u64::from_ne_bytes(b) as f64).into()),
        types::FLOAT32 => read::<4>(data).map(|b| f64::from(f32::from_ne_bytes(b)).into()),
        types::FLOAT64 => read::<8>(data).map(|b| f64::from_ne_bytes(b).into()),
        types::BOOLEAN => read::<1>(data).map(|b| ParsedValue::Bool(b[0] != 0)),
        types::TYPE | types::ENUMERATED | types::KEYWORD | types::PROPERTY => {
            FourCharCode::from_ne_slice(data).map(|code| ParsedValue::String(code.to_string()))
        }
        _ => None,
    };

    value.unwrap_or_else(|| {
        tracing::debug!(%descriptor_type, len = data.len(), "unsupported descriptor, using null");
        ParsedValue::Null
    })
}

fn is_text(descriptor_type: FourCharCode) -> bool {
    matches!(
        descriptor_type,
        types::UTF8_TEXT | types::UNICODE_TEXT | types::CHAR
    )
}

fn read<const N: usize>(data: &[u8]) -> Option<[u8; N]> {
    data.try_into().ok()
}

fn decode_utf16(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let mut units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect();
    if units.first() == Some(&0xFEFF) {
        units.remove(0);
    }
    String::from_utf16(&units).ok()
}
