//! Compiled rules. Filters decide whether a rule covers a packet name;
//! checkers decide whether the signer is acceptable. A rule's filters
//! are ORed, its checkers are ANDed, and a rule without checkers is
//! refused at load time rather than silently accepting everything.

use tracing::warn;

use crate::certificate::extract_identity_from_key_name;
use crate::error::ValidationError;
use crate::name::Name;
use crate::packet::SignatureType;
use crate::pattern::NamePattern;
use crate::relation::NameRelation;

use super::schema;

pub(crate) fn misconfigured(reason: String) -> ValidationError {
    ValidationError::PolicyMisconfiguration { reason }
}

fn invalid_signature(name: &Name) -> ValidationError {
    ValidationError::InvalidSignature { name: name.clone() }
}

#[derive(Debug, Clone)]
pub(crate) struct Rule {
    id: String,
    filters: Vec<NameConstraint>,
    checkers: Vec<Checker>,
}

impl Rule {
    pub(crate) fn from_section(
        section: schema::RuleSection,
    ) -> Result<(schema::PacketKind, Self), ValidationError> {
        let schema::RuleSection {
            id,
            packet_kind,
            filters,
            checkers,
        } = section;
        if checkers.is_empty() {
            return Err(misconfigured(format!("rule `{id}` has no checkers")));
        }
        let filters = filters
            .into_iter()
            .map(|section| {
                let schema::FilterSection::Name(constraint) = section;
                NameConstraint::compile(&id, constraint)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let checkers = checkers
            .into_iter()
            .map(|section| Checker::from_section(&id, section))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((
            packet_kind,
            Self {
                id,
                filters,
                checkers,
            },
        ))
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Whether this rule covers `name`. A rule with no filters covers
    /// every name of its packet kind.
    pub(crate) fn matches(&self, name: &Name) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|filter| filter.satisfied_by(name))
    }

    /// Runs every checker against the signer; all must pass.
    pub(crate) fn check(
        &self,
        name: &Name,
        signature_type: SignatureType,
        key_locator: &Name,
    ) -> Result<(), ValidationError> {
        for checker in &self.checkers {
            checker.check(&self.id, name, signature_type, key_locator)?;
        }
        Ok(())
    }
}

/// A filter or key-locator constraint on a name.
#[derive(Debug, Clone)]
pub(crate) enum NameConstraint {
    Relation { name: Name, relation: NameRelation },
    Pattern(NamePattern),
}

impl NameConstraint {
    fn compile(
        rule_id: &str,
        section: schema::NameConstraintSection,
    ) -> Result<Self, ValidationError> {
        let schema::NameConstraintSection {
            name,
            relation,
            regex,
        } = section;
        match (name, relation, regex) {
            (None, None, Some(expr)) => {
                let pattern = NamePattern::new(&expr).map_err(|error| {
                    misconfigured(format!(
                        "rule `{rule_id}` has a bad pattern `{expr}`: {error}"
                    ))
                })?;
                Ok(Self::Pattern(pattern))
            }
            (Some(name), Some(keyword), None) => {
                let relation = NameRelation::from_keyword(&keyword).ok_or_else(|| {
                    misconfigured(format!(
                        "rule `{rule_id}` has an unknown relation `{keyword}`"
                    ))
                })?;
                Ok(Self::Relation {
                    name: Name::from_uri(&name),
                    relation,
                })
            }
            _ => Err(misconfigured(format!(
                "rule `{rule_id}` needs either a name with a relation, or a regex"
            ))),
        }
    }

    /// Evaluates with the configured name on the left-hand side.
    fn satisfied_by(&self, name: &Name) -> bool {
        match self {
            Self::Relation {
                name: reference,
                relation,
            } => relation.check(reference, name),
            Self::Pattern(pattern) => pattern.is_match(name),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Checker {
    signature_type: Option<SignatureType>,
    kind: CheckerKind,
}

#[derive(Debug, Clone)]
enum CheckerKind {
    /// Relates the configured name to the signer's identity, the key
    /// locator minus its `KEY` suffix.
    IdentityRelation { name: Name, relation: NameRelation },
    /// Matches the raw key locator name against a pattern.
    LocatorPattern(NamePattern),
    /// Relates an expansion of the key locator to an expansion of the
    /// packet name.
    HyperRelation {
        packet_pattern: NamePattern,
        packet_expand: String,
        key_pattern: NamePattern,
        key_expand: String,
        relation: NameRelation,
    },
}

impl Checker {
    fn from_section(
        rule_id: &str,
        section: schema::CheckerSection,
    ) -> Result<Self, ValidationError> {
        match section {
            schema::CheckerSection::Customized(custom) => {
                let kind = match custom.key_locator {
                    schema::KeyLocatorSection::Name(constraint) => {
                        match NameConstraint::compile(rule_id, constraint)? {
                            NameConstraint::Relation { name, relation } => {
                                CheckerKind::IdentityRelation { name, relation }
                            }
                            NameConstraint::Pattern(pattern) => {
                                CheckerKind::LocatorPattern(pattern)
                            }
                        }
                    }
                    schema::KeyLocatorSection::HyperRelation(section) => {
                        Self::compile_hyper_relation(rule_id, section)?
                    }
                };
                Ok(Self {
                    signature_type: custom.sig_type.map(SignatureType::from),
                    kind,
                })
            }
            schema::CheckerSection::Hierarchical(section) => Ok(Self {
                signature_type: section.sig_type.map(SignatureType::from),
                kind: Self::compile_hyper_relation(
                    rule_id,
                    schema::HyperRelationSection {
                        k_regex: "^(<>*)<KEY><>$".to_string(),
                        k_expand: "\\1".to_string(),
                        h_relation: NameRelation::IsPrefixOf.to_string(),
                        p_regex: "^(<>*)$".to_string(),
                        p_expand: "\\1".to_string(),
                    },
                )?,
            }),
        }
    }

    fn compile_hyper_relation(
        rule_id: &str,
        section: schema::HyperRelationSection,
    ) -> Result<CheckerKind, ValidationError> {
        let compile = |label: &str, expr: &str| {
            NamePattern::new(expr).map_err(|error| {
                misconfigured(format!(
                    "rule `{rule_id}` has a bad {label} `{expr}`: {error}"
                ))
            })
        };
        let relation = NameRelation::from_keyword(&section.h_relation).ok_or_else(|| {
            misconfigured(format!(
                "rule `{rule_id}` has an unknown h-relation `{}`",
                section.h_relation
            ))
        })?;
        Ok(CheckerKind::HyperRelation {
            packet_pattern: compile("p-regex", &section.p_regex)?,
            packet_expand: section.p_expand,
            key_pattern: compile("k-regex", &section.k_regex)?,
            key_expand: section.k_expand,
            relation,
        })
    }

    fn check(
        &self,
        rule_id: &str,
        packet_name: &Name,
        signature_type: SignatureType,
        key_locator: &Name,
    ) -> Result<(), ValidationError> {
        if let Some(expected) = self.signature_type {
            if expected != signature_type {
                warn!(
                    rule = rule_id,
                    name = %packet_name,
                    ?expected,
                    actual = ?signature_type,
                    "signature type fails the rule"
                );
                return Err(invalid_signature(packet_name));
            }
        }
        match &self.kind {
            CheckerKind::IdentityRelation { name, relation } => {
                let identity = extract_identity_from_key_name(key_locator)?;
                if relation.check(name, &identity) {
                    Ok(())
                } else {
                    warn!(
                        rule = rule_id,
                        %identity,
                        reference = %name,
                        %relation,
                        "signer identity fails the name relation"
                    );
                    Err(invalid_signature(packet_name))
                }
            }
            CheckerKind::LocatorPattern(pattern) => {
                if pattern.is_match(key_locator) {
                    Ok(())
                } else {
                    warn!(
                        rule = rule_id,
                        key = %key_locator,
                        pattern = pattern.expr(),
                        "key locator fails the pattern"
                    );
                    Err(invalid_signature(packet_name))
                }
            }
            CheckerKind::HyperRelation {
                packet_pattern,
                packet_expand,
                key_pattern,
                key_expand,
                relation,
            } => {
                let Some(packet_match) = packet_pattern.captures(packet_name) else {
                    warn!(
                        rule = rule_id,
                        name = %packet_name,
                        pattern = packet_pattern.expr(),
                        "packet name fails the p-regex"
                    );
                    return Err(invalid_signature(packet_name));
                };
                let Some(key_match) = key_pattern.captures(key_locator) else {
                    warn!(
                        rule = rule_id,
                        key = %key_locator,
                        pattern = key_pattern.expr(),
                        "key locator fails the k-regex"
                    );
                    return Err(invalid_signature(packet_name));
                };
                let packet_expansion = packet_match.expand(packet_expand).map_err(|error| {
                    misconfigured(format!(
                        "rule `{rule_id}` cannot expand `{packet_expand}`: {error}"
                    ))
                })?;
                let key_expansion = key_match.expand(key_expand).map_err(|error| {
                    misconfigured(format!(
                        "rule `{rule_id}` cannot expand `{key_expand}`: {error}"
                    ))
                })?;
                if relation.check(&key_expansion, &packet_expansion) {
                    Ok(())
                } else {
                    warn!(
                        rule = rule_id,
                        key = %key_expansion,
                        packet = %packet_expansion,
                        %relation,
                        "expansions fail the h-relation"
                    );
                    Err(invalid_signature(packet_name))
                }
            }
        }
    }
}

impl From<schema::SigType> for SignatureType {
    fn from(value: schema::SigType) -> Self {
        match value {
            schema::SigType::Ed25519 => Self::Ed25519,
            schema::SigType::Sha256 => Self::DigestSha256,
        }
    }
}
