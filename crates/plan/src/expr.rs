//! Expression trees carried inside operator descriptors.

use nvq_common::{NvqError, Result};
use serde::{Deserialize, Serialize};

use crate::literal::LiteralNode;
use crate::types::TypeNode;
use crate::wire::{WireReader, WireWriter};

const TAG_FIELD_REF: u8 = 0;
const TAG_LITERAL: u8 = 1;
const TAG_CAST: u8 = 2;
const TAG_CALL: u8 = 3;

/// Expression node in the portable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Ordinal reference into the operator's input schema.
    FieldRef(u32),
    /// Typed constant.
    Literal(LiteralNode),
    /// Cast of a child expression to a target type.
    Cast {
        /// Expression being cast.
        expr: Box<Expr>,
        /// Target type.
        to: TypeNode,
    },
    /// Scalar function call with a declared return type.
    ///
    /// The function name is a native-engine identifier; the bridge does not
    /// interpret it.
    Call {
        /// Native function identifier.
        function: String,
        /// Arguments in declaration order.
        args: Vec<Expr>,
        /// Declared return type.
        ret: TypeNode,
    },
}

impl Expr {
    /// Writes this expression with a tag byte, children in order.
    pub fn encode(&self, w: &mut WireWriter) {
        match self {
            Expr::FieldRef(index) => {
                w.put_u8(TAG_FIELD_REF);
                w.put_u32(*index);
            }
            Expr::Literal(node) => {
                w.put_u8(TAG_LITERAL);
                node.encode(w);
            }
            Expr::Cast { expr, to } => {
                w.put_u8(TAG_CAST);
                expr.encode(w);
                to.encode(w);
            }
            Expr::Call {
                function,
                args,
                ret,
            } => {
                w.put_u8(TAG_CALL);
                w.put_str(function);
                w.put_u32(args.len() as u32);
                for arg in args {
                    arg.encode(w);
                }
                ret.encode(w);
            }
        }
    }

    /// Decodes one expression from the cursor.
    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        match r.get_u8()? {
            TAG_FIELD_REF => Ok(Expr::FieldRef(r.get_u32()?)),
            TAG_LITERAL => Ok(Expr::Literal(LiteralNode::decode(r)?)),
            TAG_CAST => {
                let expr = Box::new(Expr::decode(r)?);
                let to = TypeNode::decode(r)?;
                Ok(Expr::Cast { expr, to })
            }
            TAG_CALL => {
                let function = r.get_str()?;
                let count = r.get_count("call arguments")?;
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(Expr::decode(r)?);
                }
                let ret = TypeNode::decode(r)?;
                Ok(Expr::Call {
                    function,
                    args,
                    ret,
                })
            }
            other => Err(NvqError::InvalidConfig(format!(
                "plan decode: unknown expression tag {other}"
            ))),
        }
    }
}
