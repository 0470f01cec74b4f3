//! Plan document assembly and serialization.

use std::collections::BTreeMap;

use nvq_common::{NvqError, Result};
use serde::{Deserialize, Serialize};

use crate::literal::LiteralNode;
use crate::rel::RelNode;
use crate::wire::{WireReader, WireWriter, PLAN_VERSION};

/// An assembled, serializable plan fragment.
///
/// Built once per execution request, immutable after assembly, serialized to
/// bytes exactly once before crossing the boundary. `to_bytes` is
/// deterministic: identical trees produce identical bytes, which keeps the
/// validate-then-execute path consistent and makes plan bytes usable as cache
/// keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    /// Wire-format version this document serializes as.
    pub version: u32,
    /// Root operators in declaration order.
    pub rels: Vec<RelNode>,
    /// Opaque extension payload (typically the serialized config map).
    pub extension: Vec<u8>,
}

impl PlanDocument {
    /// Serializes the document: magic, version, extension, then operators.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_magic();
        w.put_u32(self.version);
        w.put_bytes(&self.extension);
        w.put_u32(self.rels.len() as u32);
        for rel in &self.rels {
            rel.encode(&mut w);
        }
        w.into_bytes()
    }

    /// Decodes a serialized document, verifying magic and version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let version = r.expect_header()?;
        let extension = r.get_bytes()?;
        let count = r.get_count("root operators")?;
        let mut rels = Vec::with_capacity(count);
        for _ in 0..count {
            rels.push(RelNode::decode(&mut r)?);
        }
        if r.remaining() != 0 {
            return Err(NvqError::InvalidConfig(format!(
                "plan decode: {} trailing bytes after document",
                r.remaining()
            )));
        }
        Ok(Self {
            version,
            rels,
            extension,
        })
    }
}

/// Builder composing operators and an extension payload into a
/// [`PlanDocument`].
#[derive(Debug, Default)]
pub struct PlanBuilder {
    rels: Vec<RelNode>,
    extension: Vec<u8>,
}

impl PlanBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a root operator.
    #[must_use]
    pub fn rel(mut self, rel: RelNode) -> Self {
        self.rels.push(rel);
        self
    }

    /// Sets the opaque extension payload.
    #[must_use]
    pub fn extension(mut self, payload: Vec<u8>) -> Self {
        self.extension = payload;
        self
    }

    /// Sets the extension payload to a serialized configuration map.
    #[must_use]
    pub fn conf_extension(self, confs: &BTreeMap<String, String>) -> Self {
        self.extension(conf_extension_bytes(confs))
    }

    /// Finalizes the document at the current wire version.
    #[must_use]
    pub fn build(self) -> PlanDocument {
        PlanDocument {
            version: PLAN_VERSION,
            rels: self.rels,
            extension: self.extension,
        }
    }
}

/// Serializes a string-keyed configuration map into extension-payload bytes.
///
/// The map is encoded as a string-map literal, so the native side decodes it
/// with the same literal decoder it uses for everything else. BTreeMap input
/// keeps entries key-sorted and the bytes deterministic.
#[must_use]
pub fn conf_extension_bytes(confs: &BTreeMap<String, String>) -> Vec<u8> {
    LiteralNode::string_map(confs).to_bytes()
}

/// Decodes an extension payload back into a configuration map.
///
/// Non-map payloads and non-string entries are contract violations.
pub fn conf_from_extension(payload: &[u8]) -> Result<BTreeMap<String, String>> {
    use crate::literal::LiteralValue;

    let mut r = WireReader::new(payload);
    let node = LiteralNode::decode(&mut r)?;
    let LiteralValue::Map(pairs) = node.value() else {
        return Err(NvqError::InvalidConfig(
            "extension payload is not a configuration map".to_string(),
        ));
    };
    let mut out = BTreeMap::new();
    for (k, v) in pairs {
        match (k.value(), v.value()) {
            (LiteralValue::Utf8(key), LiteralValue::Utf8(value)) => {
                out.insert(key.clone(), value.clone());
            }
            _ => {
                return Err(NvqError::InvalidConfig(
                    "configuration map entry is not string-to-string".to_string(),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::rel::{FilterRel, ScanRel};
    use crate::types::{TypeKind, TypeNode};

    fn sample_plan() -> PlanDocument {
        let mut confs = BTreeMap::new();
        confs.insert("spill.threshold".to_string(), "128MB".to_string());
        PlanBuilder::new()
            .rel(RelNode::Filter(FilterRel {
                predicate: Expr::FieldRef(0),
                input: Box::new(RelNode::Scan(ScanRel {
                    source: "t".to_string(),
                    fields: vec![("flag".to_string(), TypeNode::scalar(TypeKind::Bool, true))],
                })),
            }))
            .conf_extension(&confs)
            .build()
    }

    #[test]
    fn to_bytes_is_deterministic() {
        let a = sample_plan().to_bytes();
        let b = sample_plan().to_bytes();
        assert_eq!(a, b);
    }

    #[test]
    fn document_round_trips() {
        let doc = sample_plan();
        let back = PlanDocument::from_bytes(&doc.to_bytes()).expect("decode");
        assert_eq!(back, doc);
    }

    #[test]
    fn extension_carries_the_conf_map() {
        let doc = sample_plan();
        let confs = conf_from_extension(&doc.extension).expect("conf decode");
        assert_eq!(
            confs.get("spill.threshold").map(String::as_str),
            Some("128MB")
        );
    }

    #[test]
    fn huge_claimed_operator_count_fails_without_allocating() {
        let mut w = WireWriter::new();
        w.put_magic();
        w.put_u32(PLAN_VERSION);
        w.put_bytes(&[]);
        w.put_u32(u32::MAX);
        let err = PlanDocument::from_bytes(&w.into_bytes()).unwrap_err();
        assert!(matches!(err, NvqError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = sample_plan().to_bytes();
        bytes.push(0);
        assert!(PlanDocument::from_bytes(&bytes).is_err());
    }
}
