//! Scope model
//!
//! A scope is the tenant/location key an item or query is restricted to:
//! `account.region`, or `account` alone for account-global resources. For GCP
//! the account is the project ID and the region is a region or zone name.

use super::error::QueryError;

/// Scope value that matches every scope
pub const WILDCARD_SCOPE: &str = "*";

/// Join an account and region into a scope
pub fn format_scope(account_id: &str, region: &str) -> String {
    if region.is_empty() {
        account_id.to_string()
    } else {
        format!("{}.{}", account_id, region)
    }
}

/// Split a scope into `(account_id, region)`; region is empty for
/// account-only scopes
pub fn parse_scope(scope: &str) -> Result<(String, String), QueryError> {
    if scope.is_empty() {
        return Err(QueryError::other("scope is empty", scope));
    }
    if scope == WILDCARD_SCOPE {
        return Err(QueryError::other(
            "the wildcard scope does not name an account",
            scope,
        ));
    }

    let mut parts = scope.splitn(2, '.');
    let account = parts.next().unwrap_or_default();
    let region = parts.next();

    if account.is_empty() {
        return Err(QueryError::other(
            format!("malformed scope {:?}: empty account", scope),
            scope,
        ));
    }

    match region {
        None => Ok((account.to_string(), String::new())),
        Some(r) if r.is_empty() || r.contains('.') => Err(QueryError::other(
            format!("malformed scope {:?}: expected account.region", scope),
            scope,
        )),
        Some(r) => Ok((account.to_string(), r.to_string())),
    }
}

/// Whether `scope` is the wildcard
pub fn is_wildcard(scope: &str) -> bool {
    scope == WILDCARD_SCOPE
}

/// Check whether a resource living in `resource_scope` may be returned for a
/// query against `requested`.
///
/// Global identifiers carry no region (and sometimes no account), so their
/// scope is account-only or the wildcard. Those must be accepted for any
/// requested scope in the same account, or any scope at all.
pub fn scope_accepts(requested: &str, resource_scope: &str) -> bool {
    if is_wildcard(requested) || is_wildcard(resource_scope) || requested == resource_scope {
        return true;
    }

    match (parse_scope(requested), parse_scope(resource_scope)) {
        (Ok((req_account, _)), Ok((res_account, res_region))) => {
            res_region.is_empty() && req_account == res_account
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::error::ErrorType;

    #[test]
    fn test_format_scope() {
        assert_eq!(format_scope("my-project", "us-central1"), "my-project.us-central1");
        assert_eq!(format_scope("my-project", ""), "my-project");
    }

    #[test]
    fn test_parse_scope_round_trip() {
        for (account, region) in [("p1", "europe-west1-b"), ("123456789012", "eu-west-2"), ("p2", "")] {
            let scope = format_scope(account, region);
            assert_eq!(parse_scope(&scope).unwrap(), (account.to_string(), region.to_string()));
        }
    }

    #[test]
    fn test_parse_scope_rejects_malformed() {
        for bad in ["", ".us-central1", "p.", "p.a.b", "*"] {
            let err = parse_scope(bad).unwrap_err();
            assert_eq!(err.error_type, ErrorType::Other, "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_scope_accepts_global_resources() {
        assert!(scope_accepts("p.us-central1", "p.us-central1"));
        assert!(scope_accepts("p.us-central1", "p"));
        assert!(scope_accepts("p.us-central1", "*"));
        assert!(scope_accepts("*", "p.europe-west1"));
        assert!(!scope_accepts("p.us-central1", "p.europe-west1"));
        assert!(!scope_accepts("p.us-central1", "other"));
    }
}
