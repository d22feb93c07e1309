//! Access scopes for documents and their chunks.
//!
//! A document carries exactly one scope tag; every chunk inherits it
//! verbatim at ingestion time and it never diverges afterwards. The tag
//! is the sole authorization signal the retrieval path sees.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::core::errors::CoreError;

/// `company` | `role:<role>` | `personal:<owner_id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessScope {
    Company,
    Role(String),
    Personal(String),
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessScope::Company => write!(f, "company"),
            AccessScope::Role(role) => write!(f, "role:{}", role),
            AccessScope::Personal(owner) => write!(f, "personal:{}", owner),
        }
    }
}

impl FromStr for AccessScope {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value == "company" {
            return Ok(AccessScope::Company);
        }
        if let Some(role) = value.strip_prefix("role:") {
            if !role.is_empty() {
                return Ok(AccessScope::Role(role.to_string()));
            }
        }
        if let Some(owner) = value.strip_prefix("personal:") {
            if !owner.is_empty() {
                return Ok(AccessScope::Personal(owner.to_string()));
            }
        }
        Err(CoreError::Validation(format!(
            "invalid access scope: '{}'",
            value
        )))
    }
}

impl Serialize for AccessScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccessScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// What one requester is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequesterScope {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl RequesterScope {
    pub fn new(user_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
        }
    }

    /// Every scope tag this requester may read, in stored string form.
    pub fn permitted_tags(&self) -> Vec<String> {
        let mut tags = vec![AccessScope::Company.to_string()];
        for role in &self.roles {
            tags.push(AccessScope::Role(role.clone()).to_string());
        }
        tags.push(AccessScope::Personal(self.user_id.clone()).to_string());
        tags
    }

    pub fn allows(&self, scope: &AccessScope) -> bool {
        match scope {
            AccessScope::Company => true,
            AccessScope::Role(role) => self.roles.iter().any(|r| r == role),
            AccessScope::Personal(owner) => owner == &self.user_id,
        }
    }
}

/// Scope predicate handed to the vector index. The filter is evaluated
/// inside the search, never as a post-filter on a fixed top-k.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    pub requester: RequesterScope,
    /// Optional narrowing to specific document ids within the permitted set.
    pub document_filter: Option<Vec<String>>,
}

impl ScopeFilter {
    pub fn new(requester: RequesterScope) -> Self {
        Self {
            requester,
            document_filter: None,
        }
    }

    pub fn with_documents(mut self, document_ids: Vec<String>) -> Self {
        self.document_filter = Some(document_ids);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_string_round_trip() {
        for scope in [
            AccessScope::Company,
            AccessScope::Role("security_engineer".into()),
            AccessScope::Personal("u42".into()),
        ] {
            let parsed: AccessScope = scope.to_string().parse().unwrap();
            assert_eq!(parsed, scope);
        }
    }

    #[test]
    fn malformed_scopes_rejected() {
        assert!("role:".parse::<AccessScope>().is_err());
        assert!("personal:".parse::<AccessScope>().is_err());
        assert!("everyone".parse::<AccessScope>().is_err());
    }

    #[test]
    fn requester_permissions() {
        let requester = RequesterScope::new("u1", vec!["devops_engineer".into()]);

        assert!(requester.allows(&AccessScope::Company));
        assert!(requester.allows(&AccessScope::Role("devops_engineer".into())));
        assert!(!requester.allows(&AccessScope::Role("security_engineer".into())));
        assert!(requester.allows(&AccessScope::Personal("u1".into())));
        assert!(!requester.allows(&AccessScope::Personal("u2".into())));

        let tags = requester.permitted_tags();
        assert_eq!(
            tags,
            vec!["company", "role:devops_engineer", "personal:u1"]
        );
    }
}
