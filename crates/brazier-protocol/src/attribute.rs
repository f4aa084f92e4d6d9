//! Attribute lists: the loosely-schema'd payload of notifications and of the
//! game-utilities request/response envelopes.
//!
//! The original protocol models an attribute value as a record with one
//! optional field per kind, selected by whichever happens to be non-null —
//! which invites "two fields set at once" bugs. Here the value is a proper
//! sum type: exactly one kind, always.

use std::fmt;

use crate::EntityId;
use crate::ProtocolError;
use crate::buf::{ByteReader, ByteWriter};

// ---------------------------------------------------------------------------
// AttributeValue
// ---------------------------------------------------------------------------

/// One attribute value: a tagged union over the protocol's scalar kinds.
///
/// `Blob` and `Message` both carry raw bytes, and `Str` and `Fourcc` both
/// carry text; they are distinct variants because the wire distinguishes
/// them and collaborators key behavior off the kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
    Message(Vec<u8>),
    Fourcc(String),
    Entity(EntityId),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) | Self::Fourcc(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) | Self::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(v) => Some(*v),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Uint(_) => 3,
            Self::Float(_) => 4,
            Self::Str(_) => 5,
            Self::Blob(_) => 6,
            Self::Message(_) => 7,
            Self::Fourcc(_) => 8,
            Self::Entity(_) => 9,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "blob[{}]", v.len()),
            Self::Message(v) => write!(f, "message[{}]", v.len()),
            Self::Fourcc(v) => write!(f, "fourcc({v})"),
            Self::Entity(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        Self::Uint(v.into())
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<EntityId> for AttributeValue {
    fn from(v: EntityId) -> Self {
        Self::Entity(v)
    }
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// A named attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire codec
// ---------------------------------------------------------------------------

/// Serializes an attribute list: u16 count, then per attribute a
/// length-prefixed name, a kind tag, and the value.
pub fn encode_attributes(attributes: &[Attribute]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    write_attributes(&mut w, attributes);
    w.into_vec()
}

pub(crate) fn write_attributes(w: &mut ByteWriter, attributes: &[Attribute]) {
    w.put_u16(attributes.len().min(u16::MAX as usize) as u16);
    for attr in attributes {
        w.put_str(&attr.name);
        write_value(w, &attr.value);
    }
}

pub(crate) fn write_value(w: &mut ByteWriter, value: &AttributeValue) {
    w.put_u8(value.tag());
    match value {
        AttributeValue::Bool(v) => w.put_u8(u8::from(*v)),
        AttributeValue::Int(v) => w.put_i64(*v),
        AttributeValue::Uint(v) => w.put_u64(*v),
        AttributeValue::Float(v) => w.put_f64(*v),
        AttributeValue::Str(v) | AttributeValue::Fourcc(v) => w.put_str(v),
        AttributeValue::Blob(v) | AttributeValue::Message(v) => w.put_blob(v),
        AttributeValue::Entity(v) => {
            w.put_u64(v.high);
            w.put_u64(v.low);
        }
    }
}

/// Parses an attribute list, rejecting trailing bytes.
pub fn decode_attributes(buf: &[u8]) -> Result<Vec<Attribute>, ProtocolError> {
    let mut r = ByteReader::new("attribute list", buf);
    let attributes = read_attributes(&mut r)?;
    r.finish()?;
    Ok(attributes)
}

pub(crate) fn read_attributes(r: &mut ByteReader<'_>) -> Result<Vec<Attribute>, ProtocolError> {
    let count = r.u16()? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.str()?;
        let value = read_value(r)?;
        attributes.push(Attribute { name, value });
    }
    Ok(attributes)
}

pub(crate) fn read_value(r: &mut ByteReader<'_>) -> Result<AttributeValue, ProtocolError> {
    let value = match r.u8()? {
        1 => AttributeValue::Bool(r.u8()? != 0),
        2 => AttributeValue::Int(r.i64()?),
        3 => AttributeValue::Uint(r.u64()?),
        4 => AttributeValue::Float(r.f64()?),
        5 => AttributeValue::Str(r.str()?),
        6 => AttributeValue::Blob(r.blob()?),
        7 => AttributeValue::Message(r.blob()?),
        8 => AttributeValue::Fourcc(r.str()?),
        9 => AttributeValue::Entity(EntityId::new(r.u64()?, r.u64()?)),
        tag => {
            return Err(ProtocolError::decode(
                "attribute value",
                format!("unknown value tag {tag}"),
            ));
        }
    };
    Ok(value)
}
