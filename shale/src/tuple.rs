//! Tuples, field values and schemas.

use crate::error::{DbError, DbResult};
use crate::page::HeapPageId;
use std::fmt;

/// Maximum payload of a text field, in bytes. Text fields are stored
/// fixed-width: a 4-byte length prefix followed by this many bytes.
pub const STRING_LEN: usize = 128;

/// The closed set of column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Text,
}

impl DataType {
    /// On-disk width of a field of this type.
    pub fn byte_len(self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Text => 4 + STRING_LEN,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    pub fn data_type(&self) -> DataType {
        match self {
            Field::Int(_) => DataType::Int,
            Field::Text(_) => DataType::Text,
        }
    }

    /// Appends the fixed-width encoding of this field.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Field::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Field::Text(s) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(STRING_LEN);
                out.extend_from_slice(&(len as u32).to_be_bytes());
                out.extend_from_slice(&bytes[..len]);
                out.resize(out.len() + (STRING_LEN - len), 0);
            }
        }
    }

    /// Parses a field of `ty` from the start of `buf`.
    pub fn parse(ty: DataType, buf: &[u8]) -> DbResult<Field> {
        if buf.len() < ty.byte_len() {
            return Err(DbError::invalid("field extends past the end of its slot"));
        }
        match ty {
            DataType::Int => {
                let v = i32::from_be_bytes(buf[0..4].try_into().unwrap());
                Ok(Field::Int(v))
            }
            DataType::Text => {
                let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
                if len > STRING_LEN {
                    return Err(DbError::invalid("text field length prefix out of range"));
                }
                let s = String::from_utf8_lossy(&buf[4..4 + len]).into_owned();
                Ok(Field::Text(s))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Text(s) => write!(f, "{}", s),
        }
    }
}

/// An ordered sequence of column types with optional advisory names.
/// Equality is structural over the types; names never participate.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<(DataType, Option<String>)>,
}

impl TupleDesc {
    pub fn new(types: Vec<DataType>) -> Self {
        Self {
            items: types.into_iter().map(|t| (t, None)).collect(),
        }
    }

    pub fn with_names(items: Vec<(DataType, Option<String>)>) -> Self {
        Self { items }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> DataType {
        self.items[i].0
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.items[i].1.as_deref()
    }

    /// Index of the first field carrying `name`.
    pub fn index_of(&self, name: &str) -> DbResult<usize> {
        self.items
            .iter()
            .position(|(_, n)| n.as_deref() == Some(name))
            .ok_or_else(|| DbError::invalid(format!("no field named '{}'", name)))
    }

    /// On-disk width of one tuple of this schema.
    pub fn byte_len(&self) -> usize {
        self.items.iter().map(|(t, _)| t.byte_len()).sum()
    }

    /// Concatenation of two schemas, left fields first.
    pub fn merge(left: &TupleDesc, right: &TupleDesc) -> TupleDesc {
        let mut items = left.items.clone();
        items.extend(right.items.iter().cloned());
        Self { items }
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|((a, _), (b, _))| a == b)
    }
}

impl Eq for TupleDesc {}

/// Location of a stored tuple: owning page plus slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: HeapPageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: HeapPageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// A fixed-arity row. Carries a `RecordId` once materialized from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    desc: TupleDesc,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: TupleDesc, fields: Vec<Field>) -> DbResult<Self> {
        if fields.len() != desc.num_fields() {
            return Err(DbError::invalid(format!(
                "tuple has {} fields, schema wants {}",
                fields.len(),
                desc.num_fields()
            )));
        }
        for (i, f) in fields.iter().enumerate() {
            if f.data_type() != desc.field_type(i) {
                return Err(DbError::invalid(format!("field {} has the wrong type", i)));
            }
        }
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn set_field(&mut self, i: usize, f: Field) -> DbResult<()> {
        if f.data_type() != self.desc.field_type(i) {
            return Err(DbError::invalid(format!("field {} has the wrong type", i)));
        }
        self.fields[i] = f;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Appends the packed fixed-width encoding of every field.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        for f in &self.fields {
            f.serialize(out);
        }
    }

    /// Parses one tuple of `desc` from the start of `buf`.
    pub fn parse(desc: &TupleDesc, buf: &[u8]) -> DbResult<Tuple> {
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for i in 0..desc.num_fields() {
            let ty = desc.field_type(i);
            fields.push(Field::parse(ty, &buf[offset..])?);
            offset += ty.byte_len();
        }
        Tuple::new(desc.clone(), fields)
    }
}
