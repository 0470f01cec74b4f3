//! Portable plan intermediate representation for NVQ.
//!
//! Architecture role:
//! - typed literal/expression model with exact-width scalar kinds
//! - operator descriptors for the plan fragment handed to the native engine
//! - plan document assembly with a deterministic, versioned wire encoding
//!
//! Key modules:
//! - [`types`]: [`TypeNode`] descriptors
//! - [`literal`]: [`LiteralNode`] constants and validation
//! - [`expr`]: expression trees
//! - [`rel`]: operator descriptors
//! - [`plan`]: [`PlanDocument`] / [`PlanBuilder`]
//! - [`wire`]: framing primitives

pub mod expr;
pub mod literal;
pub mod plan;
pub mod rel;
pub mod types;
pub mod wire;

pub use expr::Expr;
pub use literal::{LiteralNode, LiteralValue};
pub use plan::{conf_extension_bytes, conf_from_extension, PlanBuilder, PlanDocument};
pub use rel::{AggCall, AggFunction, AggregateRel, FilterRel, LimitRel, ProjectRel, RelNode, ScanRel};
pub use types::{TypeKind, TypeNode};
pub use wire::{WireReader, WireWriter, PLAN_MAGIC, PLAN_VERSION};
