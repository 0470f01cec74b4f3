//! Operator descriptors for the portable plan.
//!
//! These describe a pipeline fragment handed to the native engine; the host
//! never executes them. The shape mirrors the host planner's physical
//! operators, reduced to what the native boundary needs.

use nvq_common::{NvqError, Result};
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::types::TypeNode;
use crate::wire::{WireReader, WireWriter};

const TAG_SCAN: u8 = 0;
const TAG_FILTER: u8 = 1;
const TAG_PROJECT: u8 = 2;
const TAG_AGGREGATE: u8 = 3;
const TAG_LIMIT: u8 = 4;

/// The operator graph of one plan fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelNode {
    /// Source scan; leaf.
    Scan(ScanRel),
    /// Row filter.
    Filter(FilterRel),
    /// Projection.
    Project(ProjectRel),
    /// Hash aggregate.
    Aggregate(AggregateRel),
    /// Row limit.
    Limit(LimitRel),
}

impl RelNode {
    /// Returns direct child operators.
    pub fn children(&self) -> Vec<&RelNode> {
        match self {
            RelNode::Scan(_) => vec![],
            RelNode::Filter(x) => vec![x.input.as_ref()],
            RelNode::Project(x) => vec![x.input.as_ref()],
            RelNode::Aggregate(x) => vec![x.input.as_ref()],
            RelNode::Limit(x) => vec![x.input.as_ref()],
        }
    }

    /// Writes this operator with a tag byte, fields in declaration order.
    pub fn encode(&self, w: &mut WireWriter) {
        match self {
            RelNode::Scan(x) => {
                w.put_u8(TAG_SCAN);
                w.put_str(&x.source);
                w.put_u32(x.fields.len() as u32);
                for (name, ty) in &x.fields {
                    w.put_str(name);
                    ty.encode(w);
                }
            }
            RelNode::Filter(x) => {
                w.put_u8(TAG_FILTER);
                x.predicate.encode(w);
                x.input.encode(w);
            }
            RelNode::Project(x) => {
                w.put_u8(TAG_PROJECT);
                w.put_u32(x.exprs.len() as u32);
                for e in &x.exprs {
                    e.encode(w);
                }
                x.input.encode(w);
            }
            RelNode::Aggregate(x) => {
                w.put_u8(TAG_AGGREGATE);
                w.put_u32(x.group.len() as u32);
                for g in &x.group {
                    g.encode(w);
                }
                w.put_u32(x.measures.len() as u32);
                for m in &x.measures {
                    w.put_u8(m.function.tag());
                    m.arg.encode(w);
                }
                x.input.encode(w);
            }
            RelNode::Limit(x) => {
                w.put_u8(TAG_LIMIT);
                w.put_u64(x.n);
                x.input.encode(w);
            }
        }
    }

    /// Decodes one operator from the cursor.
    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        match r.get_u8()? {
            TAG_SCAN => {
                let source = r.get_str()?;
                let count = r.get_count("scan fields")?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = r.get_str()?;
                    let ty = TypeNode::decode(r)?;
                    fields.push((name, ty));
                }
                Ok(RelNode::Scan(ScanRel { source, fields }))
            }
            TAG_FILTER => Ok(RelNode::Filter(FilterRel {
                predicate: Expr::decode(r)?,
                input: Box::new(RelNode::decode(r)?),
            })),
            TAG_PROJECT => {
                let count = r.get_count("projection expressions")?;
                let mut exprs = Vec::with_capacity(count);
                for _ in 0..count {
                    exprs.push(Expr::decode(r)?);
                }
                Ok(RelNode::Project(ProjectRel {
                    exprs,
                    input: Box::new(RelNode::decode(r)?),
                }))
            }
            TAG_AGGREGATE => {
                let group_count = r.get_count("grouping expressions")?;
                let mut group = Vec::with_capacity(group_count);
                for _ in 0..group_count {
                    group.push(Expr::decode(r)?);
                }
                let measure_count = r.get_count("aggregate measures")?;
                let mut measures = Vec::with_capacity(measure_count);
                for _ in 0..measure_count {
                    let function = AggFunction::from_tag(r.get_u8()?)?;
                    let arg = Expr::decode(r)?;
                    measures.push(AggCall { function, arg });
                }
                Ok(RelNode::Aggregate(AggregateRel {
                    group,
                    measures,
                    input: Box::new(RelNode::decode(r)?),
                }))
            }
            TAG_LIMIT => Ok(RelNode::Limit(LimitRel {
                n: r.get_u64()?,
                input: Box::new(RelNode::decode(r)?),
            })),
            other => Err(NvqError::InvalidConfig(format!(
                "plan decode: unknown operator tag {other}"
            ))),
        }
    }
}

/// Source scan descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRel {
    /// Source identifier resolved by the native side.
    pub source: String,
    /// Output columns: `(name, type)` in declaration order.
    pub fields: Vec<(String, TypeNode)>,
}

impl ScanRel {
    /// Host-side Arrow schema of this scan's output columns.
    pub fn arrow_schema(&self) -> Result<arrow_schema::Schema> {
        let fields = self
            .fields
            .iter()
            .map(|(name, ty)| Ok(arrow_schema::Field::new(name, ty.to_arrow()?, ty.nullable)))
            .collect::<Result<Vec<_>>>()?;
        Ok(arrow_schema::Schema::new(fields))
    }
}

/// Row filter descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRel {
    /// Predicate expression.
    pub predicate: Expr,
    /// Input operator.
    pub input: Box<RelNode>,
}

/// Projection descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRel {
    /// Output expressions in declaration order.
    pub exprs: Vec<Expr>,
    /// Input operator.
    pub input: Box<RelNode>,
}

/// Aggregate function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggFunction {
    fn tag(self) -> u8 {
        match self {
            AggFunction::Count => 0,
            AggFunction::Sum => 1,
            AggFunction::Min => 2,
            AggFunction::Max => 3,
            AggFunction::Avg => 4,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(AggFunction::Count),
            1 => Ok(AggFunction::Sum),
            2 => Ok(AggFunction::Min),
            3 => Ok(AggFunction::Max),
            4 => Ok(AggFunction::Avg),
            other => Err(NvqError::InvalidConfig(format!(
                "plan decode: unknown aggregate tag {other}"
            ))),
        }
    }
}

/// One aggregate measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggCall {
    /// Aggregate function.
    pub function: AggFunction,
    /// Argument expression.
    pub arg: Expr,
}

/// Hash aggregate descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRel {
    /// Grouping expressions.
    pub group: Vec<Expr>,
    /// Aggregate measures.
    pub measures: Vec<AggCall>,
    /// Input operator.
    pub input: Box<RelNode>,
}

/// Limit descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitRel {
    /// Maximum number of rows.
    pub n: u64,
    /// Input operator.
    pub input: Box<RelNode>,
}
