//! Typed constant values and their wire encoding.
//!
//! A [`LiteralNode`] pairs a runtime value with the [`TypeNode`] it is
//! declared as. The pair must agree at construction time: narrowing builders
//! range-check before narrowing and fail with
//! [`NvqError::TypeMismatch`](nvq_common::NvqError) rather than truncate, and
//! explicit type nodes are checked for kind agreement. Nodes are immutable
//! after construction and consumed once during plan serialization.

use std::collections::BTreeMap;

use nvq_common::{NvqError, Result};
use serde::{Deserialize, Serialize};

use crate::types::{TypeKind, TypeNode};
use crate::wire::{WireReader, WireWriter};

/// Runtime payload of a literal, one variant per scalar kind plus the
/// composite shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Unscaled fixed-point value; precision/scale live on the type node.
    Decimal(i128),
    /// Days since the UNIX epoch.
    Date(i32),
    /// Microseconds since the UNIX epoch.
    Timestamp(i64),
    List(Vec<LiteralNode>),
    Map(Vec<(LiteralNode, LiteralNode)>),
    Struct(Vec<LiteralNode>),
}

impl LiteralValue {
    /// The type kind this payload belongs to.
    ///
    /// Decimal carries no precision here; kind equality for decimals is
    /// checked tag-wise in [`LiteralNode::with_type`].
    #[must_use]
    pub fn kind_tag(&self) -> u8 {
        self.canonical_kind().tag()
    }

    fn canonical_kind(&self) -> TypeKind {
        match self {
            LiteralValue::Null => TypeKind::Null,
            LiteralValue::Bool(_) => TypeKind::Bool,
            LiteralValue::I8(_) => TypeKind::I8,
            LiteralValue::I16(_) => TypeKind::I16,
            LiteralValue::I32(_) => TypeKind::I32,
            LiteralValue::I64(_) => TypeKind::I64,
            LiteralValue::F32(_) => TypeKind::F32,
            LiteralValue::F64(_) => TypeKind::F64,
            LiteralValue::Utf8(_) => TypeKind::Utf8,
            LiteralValue::Binary(_) => TypeKind::Binary,
            LiteralValue::Decimal(_) => TypeKind::Decimal {
                precision: 38,
                scale: 0,
            },
            LiteralValue::Date(_) => TypeKind::Date,
            LiteralValue::Timestamp(_) => TypeKind::Timestamp,
            LiteralValue::List(_) => TypeKind::List,
            LiteralValue::Map(_) => TypeKind::Map,
            LiteralValue::Struct(_) => TypeKind::Struct,
        }
    }
}

/// A typed constant value in the portable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralNode {
    value: LiteralValue,
    type_node: TypeNode,
}

fn out_of_range(kind: &str, value: impl std::fmt::Display) -> NvqError {
    NvqError::TypeMismatch(format!("value {value} out of range for {kind} literal"))
}

impl LiteralNode {
    /// Wraps a value with its canonical default type (nullable, like the
    /// engine's default type nodes).
    #[must_use]
    pub fn new(value: LiteralValue) -> Self {
        let type_node = Self::default_type_for(&value);
        Self { value, type_node }
    }

    /// Wraps a value with an explicit type node, validating that the two
    /// agree.
    pub fn with_type(value: LiteralValue, type_node: TypeNode) -> Result<Self> {
        if value.kind_tag() != type_node.kind.tag() && !matches!(value, LiteralValue::Null) {
            return Err(NvqError::TypeMismatch(format!(
                "literal value {:?} declared as {:?}",
                value, type_node.kind
            )));
        }
        if matches!(value, LiteralValue::Null) && !type_node.nullable {
            return Err(NvqError::TypeMismatch(
                "null literal declared with a non-nullable type".to_string(),
            ));
        }
        // Shape before agreement: agreement checks index into the children.
        type_node
            .check_shape()
            .map_err(|e| NvqError::TypeMismatch(e.to_string()))?;
        let node = Self { value, type_node };
        node.check_agreement()?;
        Ok(node)
    }

    /// Boolean literal.
    #[must_use]
    pub fn boolean(v: bool) -> Self {
        Self::new(LiteralValue::Bool(v))
    }

    /// 8-bit integer literal; fails if `v` does not fit.
    pub fn int8(v: i64) -> Result<Self> {
        let narrowed = i8::try_from(v).map_err(|_| out_of_range("int8", v))?;
        Ok(Self::new(LiteralValue::I8(narrowed)))
    }

    /// 16-bit integer literal; fails if `v` does not fit.
    pub fn int16(v: i64) -> Result<Self> {
        let narrowed = i16::try_from(v).map_err(|_| out_of_range("int16", v))?;
        Ok(Self::new(LiteralValue::I16(narrowed)))
    }

    /// 32-bit integer literal; fails if `v` does not fit.
    pub fn int32(v: i64) -> Result<Self> {
        let narrowed = i32::try_from(v).map_err(|_| out_of_range("int32", v))?;
        Ok(Self::new(LiteralValue::I32(narrowed)))
    }

    /// 64-bit integer literal.
    #[must_use]
    pub fn int64(v: i64) -> Self {
        Self::new(LiteralValue::I64(v))
    }

    /// 32-bit float literal.
    #[must_use]
    pub fn float32(v: f32) -> Self {
        Self::new(LiteralValue::F32(v))
    }

    /// 64-bit float literal.
    #[must_use]
    pub fn float64(v: f64) -> Self {
        Self::new(LiteralValue::F64(v))
    }

    /// String literal.
    #[must_use]
    pub fn utf8(v: impl Into<String>) -> Self {
        Self::new(LiteralValue::Utf8(v.into()))
    }

    /// Binary literal.
    #[must_use]
    pub fn binary(v: Vec<u8>) -> Self {
        Self::new(LiteralValue::Binary(v))
    }

    /// Date literal from days since the epoch; fails outside the 32-bit day
    /// range.
    pub fn date(days: i64) -> Result<Self> {
        let narrowed = i32::try_from(days).map_err(|_| out_of_range("date", days))?;
        Ok(Self::new(LiteralValue::Date(narrowed)))
    }

    /// Timestamp literal, microseconds since the epoch.
    #[must_use]
    pub fn timestamp(micros: i64) -> Self {
        Self::new(LiteralValue::Timestamp(micros))
    }

    /// Decimal literal; `unscaled` must fit in `precision` digits.
    pub fn decimal(unscaled: i128, precision: u8, scale: i8) -> Result<Self> {
        if precision == 0 || precision > 38 {
            return Err(NvqError::TypeMismatch(format!(
                "decimal precision {precision} outside 1..=38"
            )));
        }
        if !decimal_fits(unscaled, precision) {
            return Err(out_of_range(
                &format!("decimal({precision},{scale})"),
                unscaled,
            ));
        }
        Ok(Self {
            value: LiteralValue::Decimal(unscaled),
            type_node: TypeNode::scalar(TypeKind::Decimal { precision, scale }, true),
        })
    }

    /// Typed null literal.
    pub fn null(type_node: TypeNode) -> Result<Self> {
        Self::with_type(LiteralValue::Null, type_node)
    }

    /// List literal; all elements must share the kind of the first.
    pub fn list(elements: Vec<LiteralNode>) -> Result<Self> {
        let element_type = elements
            .first()
            .map(|e| e.type_node.clone())
            .unwrap_or_else(|| TypeNode::scalar(TypeKind::Null, true));
        for e in &elements {
            if e.type_node.kind.tag() != element_type.kind.tag() {
                return Err(NvqError::TypeMismatch(format!(
                    "list element {:?} does not match element type {:?}",
                    e.type_node.kind, element_type.kind
                )));
            }
        }
        Ok(Self {
            value: LiteralValue::List(elements),
            type_node: TypeNode::list(element_type, true),
        })
    }

    /// Struct literal; field order is declaration order and is preserved.
    #[must_use]
    pub fn structure(fields: Vec<LiteralNode>) -> Self {
        let field_types = fields.iter().map(|f| f.type_node.clone()).collect();
        Self {
            value: LiteralValue::Struct(fields),
            type_node: TypeNode::composite(field_types, true),
        }
    }

    /// String-to-string map literal from sorted entries.
    ///
    /// This is the shape the session configuration map takes inside the plan
    /// extension; BTreeMap input keeps the encoding deterministic.
    #[must_use]
    pub fn string_map(entries: &BTreeMap<String, String>) -> Self {
        let pairs = entries
            .iter()
            .map(|(k, v)| (Self::utf8(k.clone()), Self::utf8(v.clone())))
            .collect();
        let key_type = TypeNode::scalar(TypeKind::Utf8, false);
        let value_type = TypeNode::scalar(TypeKind::Utf8, false);
        Self {
            value: LiteralValue::Map(pairs),
            type_node: TypeNode::map(key_type, value_type, false),
        }
    }

    /// The runtime value.
    #[must_use]
    pub fn value(&self) -> &LiteralValue {
        &self.value
    }

    /// The declared type.
    #[must_use]
    pub fn type_node(&self) -> &TypeNode {
        &self.type_node
    }

    fn default_type_for(value: &LiteralValue) -> TypeNode {
        match value {
            LiteralValue::List(elements) => {
                let elem = elements
                    .first()
                    .map(|e| e.type_node.clone())
                    .unwrap_or_else(|| TypeNode::scalar(TypeKind::Null, true));
                TypeNode::list(elem, true)
            }
            LiteralValue::Map(pairs) => {
                let (k, v) = pairs
                    .first()
                    .map(|(k, v)| (k.type_node.clone(), v.type_node.clone()))
                    .unwrap_or_else(|| {
                        (
                            TypeNode::scalar(TypeKind::Null, true),
                            TypeNode::scalar(TypeKind::Null, true),
                        )
                    });
                TypeNode::map(k, v, true)
            }
            LiteralValue::Struct(fields) => {
                TypeNode::composite(fields.iter().map(|f| f.type_node.clone()).collect(), true)
            }
            LiteralValue::Decimal(_) => TypeNode::scalar(
                TypeKind::Decimal {
                    precision: 38,
                    scale: 0,
                },
                true,
            ),
            scalar => TypeNode::scalar(scalar.canonical_kind(), true),
        }
    }

    fn check_agreement(&self) -> Result<()> {
        match (&self.value, &self.type_node.kind) {
            (LiteralValue::Decimal(unscaled), TypeKind::Decimal { precision, .. }) => {
                if !decimal_fits(*unscaled, *precision) {
                    return Err(out_of_range(&format!("decimal({precision})"), *unscaled));
                }
            }
            (LiteralValue::List(elements), TypeKind::List) => {
                let elem_kind = self.type_node.children[0].kind.tag();
                for e in elements {
                    if e.type_node.kind.tag() != elem_kind {
                        return Err(NvqError::TypeMismatch(format!(
                            "list element kind {:?} under element type {:?}",
                            e.type_node.kind, self.type_node.children[0].kind
                        )));
                    }
                }
            }
            (LiteralValue::Struct(fields), TypeKind::Struct) => {
                if fields.len() != self.type_node.children.len() {
                    return Err(NvqError::TypeMismatch(format!(
                        "struct literal with {} fields declared as {}-field struct",
                        fields.len(),
                        self.type_node.children.len()
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Writes `{type descriptor, value payload}` for this literal.
    ///
    /// Scalars occupy the fixed-width slot of their kind; strings and binary
    /// carry a length prefix; composites write child count then children in
    /// declaration order.
    pub fn encode(&self, w: &mut WireWriter) {
        self.type_node.encode(w);
        self.encode_payload(w);
    }

    fn encode_payload(&self, w: &mut WireWriter) {
        match &self.value {
            LiteralValue::Null => {}
            LiteralValue::Bool(v) => w.put_bool(*v),
            LiteralValue::I8(v) => w.put_i8(*v),
            LiteralValue::I16(v) => w.put_i16(*v),
            LiteralValue::I32(v) => w.put_i32(*v),
            LiteralValue::I64(v) => w.put_i64(*v),
            LiteralValue::F32(v) => w.put_f32(*v),
            LiteralValue::F64(v) => w.put_f64(*v),
            LiteralValue::Utf8(v) => w.put_str(v),
            LiteralValue::Binary(v) => w.put_bytes(v),
            LiteralValue::Decimal(v) => w.put_i128(*v),
            LiteralValue::Date(v) => w.put_i32(*v),
            LiteralValue::Timestamp(v) => w.put_i64(*v),
            LiteralValue::List(elements) => {
                w.put_u32(elements.len() as u32);
                for e in elements {
                    e.encode(w);
                }
            }
            LiteralValue::Map(pairs) => {
                w.put_u32(pairs.len() as u32);
                for (k, v) in pairs {
                    k.encode(w);
                    v.encode(w);
                }
            }
            LiteralValue::Struct(fields) => {
                w.put_u32(fields.len() as u32);
                for f in fields {
                    f.encode(w);
                }
            }
        }
    }

    /// Serializes this literal alone into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Decodes one literal (type descriptor then payload) from the cursor.
    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let type_node = TypeNode::decode(r)?;
        let value = match type_node.kind {
            TypeKind::Null => LiteralValue::Null,
            TypeKind::Bool => LiteralValue::Bool(r.get_bool()?),
            TypeKind::I8 => LiteralValue::I8(r.get_i8()?),
            TypeKind::I16 => LiteralValue::I16(r.get_i16()?),
            TypeKind::I32 => LiteralValue::I32(r.get_i32()?),
            TypeKind::I64 => LiteralValue::I64(r.get_i64()?),
            TypeKind::F32 => LiteralValue::F32(r.get_f32()?),
            TypeKind::F64 => LiteralValue::F64(r.get_f64()?),
            TypeKind::Utf8 => LiteralValue::Utf8(r.get_str()?),
            TypeKind::Binary => LiteralValue::Binary(r.get_bytes()?),
            TypeKind::Decimal { .. } => LiteralValue::Decimal(r.get_i128()?),
            TypeKind::Date => LiteralValue::Date(r.get_i32()?),
            TypeKind::Timestamp => LiteralValue::Timestamp(r.get_i64()?),
            TypeKind::List => {
                let count = r.get_count("list elements")?;
                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    elements.push(LiteralNode::decode(r)?);
                }
                LiteralValue::List(elements)
            }
            TypeKind::Map => {
                let count = r.get_count("map entries")?;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let k = LiteralNode::decode(r)?;
                    let v = LiteralNode::decode(r)?;
                    pairs.push((k, v));
                }
                LiteralValue::Map(pairs)
            }
            TypeKind::Struct => {
                let count = r.get_count("struct fields")?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    fields.push(LiteralNode::decode(r)?);
                }
                LiteralValue::Struct(fields)
            }
        };
        let node = Self { value, type_node };
        node.check_agreement()?;
        Ok(node)
    }
}

fn decimal_fits(unscaled: i128, precision: u8) -> bool {
    if precision >= 39 {
        return true;
    }
    let bound = 10_i128.checked_pow(u32::from(precision));
    match bound {
        Some(b) => unscaled > -b && unscaled < b,
        // 10^38 fits in i128; anything that overflows is above any i128 value.
        None => true,
    }
}
