//! Type descriptors for the portable plan.

use arrow_schema::{DataType, Field, TimeUnit};
use nvq_common::{NvqError, Result};
use serde::{Deserialize, Serialize};

use crate::wire::{WireReader, WireWriter};

/// Closed set of scalar and composite kinds the wire format can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// The untyped null kind.
    Null,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Utf8,
    Binary,
    /// Fixed-point decimal with declared precision and scale.
    Decimal {
        /// Total significant digits, 1..=38.
        precision: u8,
        /// Digits right of the decimal point.
        scale: i8,
    },
    /// Days since the UNIX epoch.
    Date,
    /// Microseconds since the UNIX epoch.
    Timestamp,
    List,
    Map,
    Struct,
}

impl TypeKind {
    /// Wire tag byte for this kind.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            TypeKind::Null => 0,
            TypeKind::Bool => 1,
            TypeKind::I8 => 2,
            TypeKind::I16 => 3,
            TypeKind::I32 => 4,
            TypeKind::I64 => 5,
            TypeKind::F32 => 6,
            TypeKind::F64 => 7,
            TypeKind::Utf8 => 8,
            TypeKind::Binary => 9,
            TypeKind::Decimal { .. } => 10,
            TypeKind::Date => 11,
            TypeKind::Timestamp => 12,
            TypeKind::List => 13,
            TypeKind::Map => 14,
            TypeKind::Struct => 15,
        }
    }

    /// True for kinds that carry child type nodes.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, TypeKind::List | TypeKind::Map | TypeKind::Struct)
    }
}

/// Immutable descriptor of a scalar or composite data type.
///
/// Composite kinds carry their child descriptors in declaration order; the
/// order is semantically significant and preserved through serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    /// Kind tag.
    pub kind: TypeKind,
    /// Whether values of this type may be null.
    pub nullable: bool,
    /// Child descriptors for composite kinds; empty for scalars.
    pub children: Vec<TypeNode>,
}

impl TypeNode {
    /// Scalar type node. Composite kinds must go through [`TypeNode::list`],
    /// [`TypeNode::map`], or [`TypeNode::composite`].
    #[must_use]
    pub fn scalar(kind: TypeKind, nullable: bool) -> Self {
        debug_assert!(!kind.is_composite(), "composite kind in scalar constructor");
        Self {
            kind,
            nullable,
            children: Vec::new(),
        }
    }

    /// List type with one element type.
    #[must_use]
    pub fn list(element: TypeNode, nullable: bool) -> Self {
        Self {
            kind: TypeKind::List,
            nullable,
            children: vec![element],
        }
    }

    /// Map type with key and value types.
    #[must_use]
    pub fn map(key: TypeNode, value: TypeNode, nullable: bool) -> Self {
        Self {
            kind: TypeKind::Map,
            nullable,
            children: vec![key, value],
        }
    }

    /// Struct type with field types in declaration order.
    #[must_use]
    pub fn composite(fields: Vec<TypeNode>, nullable: bool) -> Self {
        Self {
            kind: TypeKind::Struct,
            nullable,
            children: fields,
        }
    }

    /// Writes the fixed-schema type descriptor: tag, nullability, kind
    /// parameters, then child count and children for composites.
    pub fn encode(&self, w: &mut WireWriter) {
        w.put_u8(self.kind.tag());
        w.put_bool(self.nullable);
        if let TypeKind::Decimal { precision, scale } = self.kind {
            w.put_u8(precision);
            w.put_i8(scale);
        }
        if self.kind.is_composite() {
            w.put_u32(self.children.len() as u32);
            for child in &self.children {
                child.encode(w);
            }
        }
    }

    /// Decodes one type descriptor from the cursor.
    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let tag = r.get_u8()?;
        let nullable = r.get_bool()?;
        let kind = match tag {
            0 => TypeKind::Null,
            1 => TypeKind::Bool,
            2 => TypeKind::I8,
            3 => TypeKind::I16,
            4 => TypeKind::I32,
            5 => TypeKind::I64,
            6 => TypeKind::F32,
            7 => TypeKind::F64,
            8 => TypeKind::Utf8,
            9 => TypeKind::Binary,
            10 => TypeKind::Decimal {
                precision: r.get_u8()?,
                scale: r.get_i8()?,
            },
            11 => TypeKind::Date,
            12 => TypeKind::Timestamp,
            13 => TypeKind::List,
            14 => TypeKind::Map,
            15 => TypeKind::Struct,
            other => {
                return Err(NvqError::InvalidConfig(format!(
                    "plan decode: unknown type tag {other}"
                )));
            }
        };
        let mut children = Vec::new();
        if kind.is_composite() {
            let count = r.get_count("type children")?;
            children.reserve(count);
            for _ in 0..count {
                children.push(TypeNode::decode(r)?);
            }
        }
        let node = Self {
            kind,
            nullable,
            children,
        };
        node.check_shape()?;
        Ok(node)
    }

    pub(crate) fn check_shape(&self) -> Result<()> {
        let ok = match self.kind {
            TypeKind::List => self.children.len() == 1,
            TypeKind::Map => self.children.len() == 2,
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(NvqError::InvalidConfig(format!(
                "plan decode: {:?} with {} children",
                self.kind,
                self.children.len()
            )))
        }
    }

    /// Host-side Arrow equivalent of this descriptor.
    ///
    /// Used to tag output batches with the schema the host expects.
    pub fn to_arrow(&self) -> Result<DataType> {
        let dt = match self.kind {
            TypeKind::Null => DataType::Null,
            TypeKind::Bool => DataType::Boolean,
            TypeKind::I8 => DataType::Int8,
            TypeKind::I16 => DataType::Int16,
            TypeKind::I32 => DataType::Int32,
            TypeKind::I64 => DataType::Int64,
            TypeKind::F32 => DataType::Float32,
            TypeKind::F64 => DataType::Float64,
            TypeKind::Utf8 => DataType::Utf8,
            TypeKind::Binary => DataType::Binary,
            TypeKind::Decimal { precision, scale } => DataType::Decimal128(precision, scale),
            TypeKind::Date => DataType::Date32,
            TypeKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            TypeKind::List => {
                let elem = self.children[0].to_arrow()?;
                DataType::List(
                    Field::new("item", elem, self.children[0].nullable).into(),
                )
            }
            TypeKind::Map | TypeKind::Struct => {
                return Err(NvqError::InvalidConfig(format!(
                    "no host-side arrow mapping for {:?} output columns",
                    self.kind
                )));
            }
        };
        Ok(dt)
    }
}
