//! The rule-driven validation policy and its TOML loader.
//!
//! A configuration document carries an ordered rule list per packet
//! kind and a set of trust anchor directives. Rules are consulted in
//! document order and the first one whose filters cover the packet
//! name decides alone; there is no fallback to later rules. Loading is
//! strict: any unusable rule, pattern, relation keyword, anchor or
//! refresh value fails the whole load.

mod rule;
mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::certificate::Certificate;
use crate::error::ValidationError;
use crate::packet::{Interest, Packet};
use crate::request::CertificateRequest;
use crate::storage::decode_certificate_text;

use self::rule::{misconfigured, Rule};
use super::{signature_info_of, PolicyAction};

/// The rule-driven policy compiled from a configuration document.
///
/// The default value has no rules and rejects everything with
/// [`ValidationError::NoMatchingRule`]; rules arrive through the
/// validator's configuration loading.
#[derive(Debug, Clone, Default)]
pub struct ConfigPolicy {
    bypass: bool,
    data_rules: Vec<Rule>,
    interest_rules: Vec<Rule>,
}

impl ConfigPolicy {
    pub(crate) fn check(&self, packet: &Packet) -> PolicyAction {
        if self.bypass {
            debug!(name = %packet.name(), "validation is disabled; accepting");
            return PolicyAction::Accept;
        }
        let info = match signature_info_of(packet) {
            Ok(info) => info,
            Err(error) => return PolicyAction::Reject(error),
        };
        let Some(key_locator) = info.key_locator else {
            return PolicyAction::Reject(ValidationError::MalformedKeyLocator {
                reason: format!("the signature on {} names no key", packet.name()),
            });
        };
        // Signed interests are matched without their two signature
        // components; signature_info_of already refused shorter names.
        let (rules, checked_name) = match packet {
            Packet::Data(data) => (&self.data_rules, data.name.clone()),
            Packet::Interest(interest) => (
                &self.interest_rules,
                interest.name.prefix(interest.name.len() - 2),
            ),
        };
        for rule in rules {
            if rule.matches(&checked_name) {
                debug!(rule = rule.id(), name = %checked_name, "rule selected");
                return match rule.check(&checked_name, info.signature_type, &key_locator) {
                    Ok(()) => {
                        PolicyAction::Continue(CertificateRequest::new(Interest::new(key_locator)))
                    }
                    Err(error) => PolicyAction::Reject(error),
                };
            }
        }
        warn!(name = %packet.name(), "no rule matched");
        PolicyAction::Reject(ValidationError::NoMatchingRule {
            name: packet.name().clone(),
        })
    }
}

/// A parsed configuration document: the compiled policy plus the
/// anchor directives for the validator to apply to its storage.
#[derive(Debug)]
pub(crate) struct LoadedConfig {
    pub(crate) policy: ConfigPolicy,
    pub(crate) anchors: Vec<AnchorDirective>,
}

#[derive(Debug)]
pub(crate) enum AnchorDirective {
    Static(Certificate),
    File {
        path: PathBuf,
        refresh: Option<Duration>,
    },
    Directory {
        path: PathBuf,
        refresh: Option<Duration>,
    },
}

impl LoadedConfig {
    pub(crate) fn from_toml(text: &str) -> Result<Self, ValidationError> {
        let document: schema::ConfigDocument = toml::from_str(text).map_err(|error| {
            misconfigured(format!("cannot parse the policy configuration: {error}"))
        })?;

        let mut policy = ConfigPolicy::default();
        for section in document.rules {
            let (kind, rule) = Rule::from_section(section)?;
            match kind {
                schema::PacketKind::Data => policy.data_rules.push(rule),
                schema::PacketKind::Interest => policy.interest_rules.push(rule),
            }
        }

        let mut anchors = Vec::new();
        for section in document.trust_anchors {
            match section {
                schema::AnchorSection::File(section) => anchors.push(AnchorDirective::File {
                    path: PathBuf::from(section.file_name),
                    refresh: parse_refresh(section.refresh.as_deref())?,
                }),
                schema::AnchorSection::Base64(section) => {
                    let certificate =
                        decode_certificate_text(&section.base64_string).map_err(|reason| {
                            misconfigured(format!("bad base64 trust anchor: {reason}"))
                        })?;
                    anchors.push(AnchorDirective::Static(certificate));
                }
                schema::AnchorSection::Dir(section) => anchors.push(AnchorDirective::Directory {
                    path: PathBuf::from(section.dir),
                    refresh: parse_refresh(section.refresh.as_deref())?,
                }),
                schema::AnchorSection::Any => policy.bypass = true,
            }
        }
        Ok(Self { policy, anchors })
    }

    /// Resolves relative anchor paths against the directory the
    /// configuration file was read from.
    pub(crate) fn resolve_paths(&mut self, base: &Path) {
        for directive in &mut self.anchors {
            match directive {
                AnchorDirective::File { path, .. } | AnchorDirective::Directory { path, .. } => {
                    if path.is_relative() {
                        *path = base.join(path.as_path());
                    }
                }
                AnchorDirective::Static(_) => {}
            }
        }
    }
}

/// Parses the refresh form `<number><unit>` with unit `h`, `m` or `s`.
fn parse_refresh(text: Option<&str>) -> Result<Option<Duration>, ValidationError> {
    let Some(text) = text else {
        return Ok(None);
    };
    let Some(unit) = text.chars().last() else {
        return Err(misconfigured("empty refresh value".to_string()));
    };
    let seconds_per_unit = match unit {
        'h' => 3600,
        'm' => 60,
        's' => 1,
        _ => {
            return Err(misconfigured(format!(
                "bad refresh `{text}`: the unit must be h, m or s"
            )))
        }
    };
    let count: u64 = text[..text.len() - 1]
        .parse()
        .map_err(|_| misconfigured(format!("bad refresh `{text}`")))?;
    Ok(Some(Duration::from_secs(
        count.saturating_mul(seconds_per_unit),
    )))
}
