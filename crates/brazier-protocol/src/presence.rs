//! Presence service message bodies.
//!
//! Presence data is a key/value store per entity: a field key is the
//! (program, group, field, index) tuple, a field value is any attribute
//! value. Clients subscribe to an entity, update their own fields, and query
//! fields of entities they care about.

use crate::attribute::{read_value, write_value};
use crate::buf::{ByteReader, ByteWriter};
use crate::{AttributeValue, EntityId, ProtocolError};

/// Identifies one presence field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub program: u32,
    pub group: u32,
    pub field: u32,
    pub index: u64,
}

impl FieldKey {
    fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.program);
        w.put_u32(self.group);
        w.put_u32(self.field);
        w.put_u64(self.index);
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            program: r.u32()?,
            group: r.u32()?,
            field: r.u32()?,
            index: r.u64()?,
        })
    }
}

/// One mutation in an update request.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperation {
    Set { key: FieldKey, value: AttributeValue },
    Clear { key: FieldKey },
}

const OP_SET: u8 = 0;
const OP_CLEAR: u8 = 1;

/// A presence field with its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceField {
    pub key: FieldKey,
    pub value: AttributeValue,
}

fn write_entity(w: &mut ByteWriter, id: EntityId) {
    w.put_u64(id.high);
    w.put_u64(id.low);
}

fn read_entity(r: &mut ByteReader<'_>) -> Result<EntityId, ProtocolError> {
    Ok(EntityId::new(r.u64()?, r.u64()?))
}

/// Client → server: start receiving updates for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSubscribeRequest {
    pub entity_id: EntityId,
}

impl PresenceSubscribeRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(16);
        write_entity(&mut w, self.entity_id);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("presence subscribe request", buf);
        let entity_id = read_entity(&mut r)?;
        r.finish()?;
        Ok(Self { entity_id })
    }
}

/// Client → server: stop receiving updates for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceUnsubscribeRequest {
    pub entity_id: EntityId,
}

impl PresenceUnsubscribeRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(16);
        write_entity(&mut w, self.entity_id);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("presence unsubscribe request", buf);
        let entity_id = read_entity(&mut r)?;
        r.finish()?;
        Ok(Self { entity_id })
    }
}

/// Client → server: mutate fields of an entity's presence.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceUpdateRequest {
    pub entity_id: EntityId,
    pub operations: Vec<FieldOperation>,
}

impl PresenceUpdateRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_entity(&mut w, self.entity_id);
        w.put_u16(self.operations.len().min(u16::MAX as usize) as u16);
        for op in &self.operations {
            match op {
                FieldOperation::Set { key, value } => {
                    w.put_u8(OP_SET);
                    key.write(&mut w);
                    write_value(&mut w, value);
                }
                FieldOperation::Clear { key } => {
                    w.put_u8(OP_CLEAR);
                    key.write(&mut w);
                }
            }
        }
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("presence update request", buf);
        let entity_id = read_entity(&mut r)?;
        let count = r.u16()? as usize;
        let mut operations = Vec::with_capacity(count);
        for _ in 0..count {
            let op = match r.u8()? {
                OP_SET => FieldOperation::Set {
                    key: FieldKey::read(&mut r)?,
                    value: read_value(&mut r)?,
                },
                OP_CLEAR => FieldOperation::Clear {
                    key: FieldKey::read(&mut r)?,
                },
                tag => {
                    return Err(ProtocolError::Decode {
                        what: "presence update request",
                        detail: format!("unknown field operation {tag}"),
                    });
                }
            };
            operations.push(op);
        }
        r.finish()?;
        Ok(Self {
            entity_id,
            operations,
        })
    }
}

/// Client → server: read fields of an entity's presence.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceQueryRequest {
    pub entity_id: EntityId,
    pub keys: Vec<FieldKey>,
}

impl PresenceQueryRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_entity(&mut w, self.entity_id);
        w.put_u16(self.keys.len().min(u16::MAX as usize) as u16);
        for key in &self.keys {
            key.write(&mut w);
        }
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("presence query request", buf);
        let entity_id = read_entity(&mut r)?;
        let count = r.u16()? as usize;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(FieldKey::read(&mut r)?);
        }
        r.finish()?;
        Ok(Self { entity_id, keys })
    }
}

/// Server → client: the queried fields. Keys with no stored value are
/// omitted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresenceQueryResponse {
    pub fields: Vec<PresenceField>,
}

impl PresenceQueryResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u16(self.fields.len().min(u16::MAX as usize) as u16);
        for field in &self.fields {
            field.key.write(&mut w);
            write_value(&mut w, &field.value);
        }
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("presence query response", buf);
        let count = r.u16()? as usize;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            fields.push(PresenceField {
                key: FieldKey::read(&mut r)?,
                value: read_value(&mut r)?,
            });
        }
        r.finish()?;
        Ok(Self { fields })
    }
}
