//! Structured global resource identifiers
//!
//! Identifiers follow the ARN grammar:
//!
//! ```text
//! arn:<partition>:<service>:<region>:<account>:<resource>
//! ```
//!
//! where `<resource>` is `type/id`, `type:id` or a bare id. Region and
//! account may be empty for global services. Stored identifiers may contain
//! policy-style wildcards (`*`, `?`) and are then matched against concrete
//! candidates with [`Identifier::wildcard_matches`].

use super::scope::{format_scope, WILDCARD_SCOPE};
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREFIX: &str = "arn";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier {0:?} does not start with \"arn:\"")]
    MissingPrefix(String),

    #[error("identifier {0:?} has too few sections, expected 6 colon-separated fields")]
    TooFewSections(String),

    #[error("identifier {input:?} has an empty {field}")]
    EmptyField { input: String, field: &'static str },
}

/// A parsed resource identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    resource_type: String,
    resource_id: String,
    /// Separator between type and id, `None` for bare ids
    separator: Option<char>,
}

impl Identifier {
    /// Build an identifier with a `type/id` resource part
    pub fn new(
        partition: &str,
        service: &str,
        region: &str,
        account: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Self {
        Self {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account: account.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            separator: if resource_type.is_empty() { None } else { Some('/') },
        }
    }

    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let sections: Vec<&str> = s.splitn(6, ':').collect();
        if sections.len() < 6 {
            return Err(IdentifierError::TooFewSections(s.to_string()));
        }
        if sections[0] != PREFIX {
            return Err(IdentifierError::MissingPrefix(s.to_string()));
        }

        let empty = |field| IdentifierError::EmptyField {
            input: s.to_string(),
            field,
        };
        if sections[1].is_empty() {
            return Err(empty("partition"));
        }
        if sections[2].is_empty() {
            return Err(empty("service"));
        }
        if sections[5].is_empty() {
            return Err(empty("resource"));
        }

        let resource = sections[5];
        let (resource_type, resource_id, separator) = match resource.find(['/', ':']) {
            Some(idx) => {
                let sep = resource[idx..].chars().next();
                (&resource[..idx], &resource[idx + 1..], sep)
            },
            None => ("", resource, None),
        };

        Ok(Self {
            partition: sections[1].to_string(),
            service: sections[2].to_string(),
            region: sections[3].to_string(),
            account: sections[4].to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            separator,
        })
    }

    /// Resource type, empty for bare-id resources
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Everything after the type separator
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// The full resource section as it appears in the identifier
    pub fn resource(&self) -> String {
        match self.separator {
            Some(sep) => format!("{}{}{}", self.resource_type, sep, self.resource_id),
            None => self.resource_id.clone(),
        }
    }

    /// Scope the identified resource lives in
    ///
    /// Global services leave the region (and sometimes the account) empty;
    /// those resolve to an account-only scope or the wildcard.
    pub fn scope(&self) -> String {
        if self.account.is_empty() {
            WILDCARD_SCOPE.to_string()
        } else {
            format_scope(&self.account, &self.region)
        }
    }

    pub fn has_wildcards(&self) -> bool {
        self.to_string().contains(['*', '?'])
    }

    /// Match a concrete identifier string against this (possibly wildcarded)
    /// identifier. `*` matches any run of characters including `/`, `?`
    /// matches exactly one; everything else is literal and the whole string
    /// must match.
    pub fn wildcard_matches(&self, candidate: &str) -> bool {
        let Some(pattern) = glob_pattern(&self.to_string()) else {
            return false;
        };
        pattern.matches_with(candidate, match_options())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            PREFIX,
            self.partition,
            self.service,
            self.region,
            self.account,
            self.resource()
        )
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    }
}

/// Translate policy wildcards into a glob pattern with every other glob
/// metacharacter escaped
fn glob_pattern(s: &str) -> Option<Pattern> {
    let mut pattern = String::with_capacity(s.len());
    let mut previous_star = false;

    for c in s.chars() {
        match c {
            // Runs of stars mean the same thing, and `**` is special to glob
            '*' if previous_star => continue,
            '*' | '?' => pattern.push(c),
            _ => pattern.push_str(&Pattern::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        previous_star = c == '*';
    }

    Pattern::new(&pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_resource() {
        let id = Identifier::parse("arn:gcp:compute:us-central1-a:my-project:instance/vm-1").unwrap();
        assert_eq!(id.partition, "gcp");
        assert_eq!(id.service, "compute");
        assert_eq!(id.region, "us-central1-a");
        assert_eq!(id.account, "my-project");
        assert_eq!(id.resource_type(), "instance");
        assert_eq!(id.resource_id(), "vm-1");
    }

    #[test]
    fn test_parse_colon_resource_keeps_nested_colons() {
        let s = "arn:aws:logs:eu-west-1:123456789012:log-group:/aws/lambda/fn:*";
        let id = Identifier::parse(s).unwrap();
        assert_eq!(id.resource_type(), "log-group");
        assert_eq!(id.resource_id(), "/aws/lambda/fn:*");
        assert_eq!(id.to_string(), s);
    }

    #[test]
    fn test_parse_bare_resource() {
        let id = Identifier::parse("arn:aws:s3:::my-bucket").unwrap();
        assert_eq!(id.resource_type(), "");
        assert_eq!(id.resource_id(), "my-bucket");
        assert_eq!(id.scope(), "*");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Identifier::parse("not-an-identifier"),
            Err(IdentifierError::TooFewSections(_))
        ));
        assert!(matches!(
            Identifier::parse("urn:gcp:compute:r:a:instance/x"),
            Err(IdentifierError::MissingPrefix(_))
        ));
        assert!(matches!(
            Identifier::parse("arn:gcp::r:a:instance/x"),
            Err(IdentifierError::EmptyField { field: "service", .. })
        ));
        assert!(matches!(
            Identifier::parse("arn:gcp:compute:r:a:"),
            Err(IdentifierError::EmptyField { field: "resource", .. })
        ));
    }

    #[test]
    fn test_scope_for_global_identifiers() {
        let regional = Identifier::parse("arn:gcp:compute:us-east1:proj:subnetwork/s").unwrap();
        assert_eq!(regional.scope(), "proj.us-east1");

        let global = Identifier::parse("arn:gcp:iam::proj:role/viewer").unwrap();
        assert_eq!(global.scope(), "proj");
    }

    #[test]
    fn test_wildcard_matches_glob_semantics() {
        let pattern = Identifier::parse("arn:aws:ssm:eu-west-2:123456789012:parameter/prod/*/service/x").unwrap();
        assert!(pattern.has_wildcards());
        assert!(pattern.wildcard_matches("arn:aws:ssm:eu-west-2:123456789012:parameter/prod/a/service/x"));
        assert!(pattern.wildcard_matches("arn:aws:ssm:eu-west-2:123456789012:parameter/prod/a/b/service/x"));
        assert!(!pattern.wildcard_matches("arn:aws:ssm:eu-west-2:123456789012:parameter/staging/a/service/x"));
        assert!(!pattern.wildcard_matches("arn:aws:ssm:eu-west-2:123456789012:parameter/prod/a/service/xy"));
    }

    #[test]
    fn test_wildcard_question_mark_is_single_char() {
        let pattern = Identifier::parse("arn:gcp:compute:*:proj:instance/vm-?").unwrap();
        assert!(pattern.wildcard_matches("arn:gcp:compute:us-central1-a:proj:instance/vm-1"));
        assert!(!pattern.wildcard_matches("arn:gcp:compute:us-central1-a:proj:instance/vm-10"));
    }

    #[test]
    fn test_wildcard_reflexive_and_literal_brackets() {
        let s = "arn:gcp:storage::proj:bucket/[weird]-name";
        let id = Identifier::parse(s).unwrap();
        assert!(!id.has_wildcards());
        assert!(id.wildcard_matches(s));
        assert!(!id.wildcard_matches("arn:gcp:storage::proj:bucket/w-name"));
    }

    #[test]
    fn test_double_star_collapses() {
        let id = Identifier::parse("arn:gcp:storage::proj:bucket/a**z").unwrap();
        assert!(id.wildcard_matches("arn:gcp:storage::proj:bucket/a/b/c/z"));
    }
}
