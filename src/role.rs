use std::fmt;

use serde::{Deserialize, Serialize};

/// A database principal name.
///
/// Two predefined roles exist: `Admin` (superuser, used only to bootstrap)
/// and `Normal` (used for everything else). A process-wide role suffix may
/// be appended for parallel-test isolation; see [`RoleSuffix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Normal,
}

impl Role {
    fn base_name(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Normal => "normal",
        }
    }

    /// The role name as it should appear in DDL and credential files, with
    /// the process-wide suffix (if any) appended.
    pub fn qualified_name(self, suffix: &RoleSuffix) -> String {
        match suffix.as_str() {
            Some(s) => format!("{}_{}", self.base_name(), s),
            None => self.base_name().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_name())
    }
}

/// A short string appended to every role name in the current process,
/// enabling isolated parallel test runs against a shared cluster. Stored
/// once (by the schema repository) and applied consistently to every DDL
/// statement and every credential-file line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSuffix(Option<String>);

impl RoleSuffix {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(suffix: impl Into<String>) -> Self {
        let s = suffix.into();
        if s.is_empty() {
            Self(None)
        } else {
            Self(Some(s))
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_without_suffix() {
        assert_eq!(Role::Normal.qualified_name(&RoleSuffix::none()), "normal");
        assert_eq!(Role::Admin.qualified_name(&RoleSuffix::none()), "admin");
    }

    #[test]
    fn qualified_name_with_suffix() {
        let suffix = RoleSuffix::new("t7f3");
        assert_eq!(Role::Normal.qualified_name(&suffix), "normal_t7f3");
    }

    #[test]
    fn empty_suffix_string_is_treated_as_none() {
        let suffix = RoleSuffix::new("");
        assert_eq!(suffix.as_str(), None);
    }
}
