//! The raw serde shape of a policy configuration document.
//!
//! Everything here mirrors the TOML surface one to one and stays
//! string-typed; compilation into runtime rules, with all semantic
//! validation, happens in the sibling modules.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigDocument {
    #[serde(default, rename = "rule")]
    pub(crate) rules: Vec<RuleSection>,

    #[serde(default, rename = "trust-anchor")]
    pub(crate) trust_anchors: Vec<AnchorSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RuleSection {
    pub(crate) id: String,

    /// Which packet kind the rule covers.
    #[serde(rename = "for")]
    pub(crate) packet_kind: PacketKind,

    #[serde(default, rename = "filter")]
    pub(crate) filters: Vec<FilterSection>,

    #[serde(default, rename = "checker")]
    pub(crate) checkers: Vec<CheckerSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PacketKind {
    Data,
    Interest,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum FilterSection {
    Name(NameConstraintSection),
}

/// A name constraint: either `name` plus `relation`, or `regex`.
#[derive(Debug, Deserialize)]
pub(crate) struct NameConstraintSection {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) relation: Option<String>,
    #[serde(default)]
    pub(crate) regex: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum CheckerSection {
    Customized(CustomizedCheckerSection),
    Hierarchical(HierarchicalCheckerSection),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CustomizedCheckerSection {
    #[serde(default)]
    pub(crate) sig_type: Option<SigType>,
    pub(crate) key_locator: KeyLocatorSection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct HierarchicalCheckerSection {
    #[serde(default)]
    pub(crate) sig_type: Option<SigType>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum KeyLocatorSection {
    Name(NameConstraintSection),
    HyperRelation(HyperRelationSection),
}

/// Relates an expansion of the packet name to an expansion of the key
/// locator name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct HyperRelationSection {
    pub(crate) k_regex: String,
    pub(crate) k_expand: String,
    pub(crate) h_relation: String,
    pub(crate) p_regex: String,
    pub(crate) p_expand: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum SigType {
    Ed25519,
    Sha256,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum AnchorSection {
    File(FileAnchorSection),
    Base64(Base64AnchorSection),
    Dir(DirAnchorSection),
    /// Disables validation outright; every packet is accepted.
    Any,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct FileAnchorSection {
    pub(crate) file_name: String,
    #[serde(default)]
    pub(crate) refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Base64AnchorSection {
    pub(crate) base64_string: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct DirAnchorSection {
    pub(crate) dir: String,
    #[serde(default)]
    pub(crate) refresh: Option<String>,
}
