//! Session, environment and authority descriptors
//!
//! Authorization is resolved once, when a session is authorized against a
//! required authority, and stored on the environment as a flag. The store
//! access layer only checks the flag; it never re-derives privileges.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granted authority, ordered by influence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Authority {
    Guest,
    Reader,
    Contributor,
    Maintainer,
    Application,
    System,
}

impl Authority {
    pub fn weight(&self) -> u32 {
        match self {
            Authority::Guest => 100,
            Authority::Reader => 200,
            Authority::Contributor => 400,
            Authority::Maintainer => 400,
            Authority::Application => 600,
            Authority::System => 800,
        }
    }

    /// True if this authority carries at least the influence of `required`
    pub fn satisfies(&self, required: Authority) -> bool {
        self.weight() >= required.weight()
    }
}

/// Logical repository a statement lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    Entities,
    Schema,
    Transactions,
    Application,
}

impl RepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::Entities => "entities",
            RepositoryType::Schema => "schema",
            RepositoryType::Transactions => "transactions",
            RepositoryType::Application => "application",
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "entities" => Ok(RepositoryType::Entities),
            "schema" => Ok(RepositoryType::Schema),
            "transactions" => Ok(RepositoryType::Transactions),
            "application" => Ok(RepositoryType::Application),
            other => Err(Error::InvalidInput(format!("Unknown repository type: {}", other))),
        }
    }
}

/// Resolved repository selector plus authorization state for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    repository_type: Option<RepositoryType>,
    scope: Option<String>,
    authorized: bool,
}

impl Environment {
    /// Unresolved, unauthorized environment
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(mut self, repository_type: RepositoryType) -> Self {
        self.repository_type = Some(repository_type);
        self
    }

    /// Label of the application scope the operation runs in
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn repository_type(&self) -> Option<RepositoryType> {
        self.repository_type
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn set_authorized(&mut self, authorized: bool) {
        self.authorized = authorized;
    }
}

/// Caller context passed through services, jobs and the store layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    environment: Environment,
    authority: Authority,
    scheduled: bool,
}

impl SessionContext {
    /// Context for an interactive request
    pub fn new(authority: Authority) -> Self {
        Self {
            environment: Environment::new(),
            authority,
            scheduled: false,
        }
    }

    /// Authorized system context for background jobs, targeting the entities repository
    pub fn system() -> Self {
        let mut environment = Environment::new().with_repository(RepositoryType::Entities);
        environment.set_authorized(true);
        Self {
            environment,
            authority: Authority::System,
            scheduled: true,
        }
    }

    /// Mark this context as originating from a scheduled job
    pub fn as_scheduled(mut self) -> Self {
        self.scheduled = true;
        self
    }

    /// Same caller, different target repository
    pub fn with_repository(mut self, repository_type: RepositoryType) -> Self {
        self.environment.repository_type = Some(repository_type);
        self
    }

    /// Resolve authorization once; fails if the granted authority is too weak
    pub fn authorize(mut self, required: Authority) -> Result<Self> {
        if !self.authority.satisfies(required) {
            return Err(Error::InsufficientPrivilege(format!(
                "{:?} authority required, {:?} granted",
                required, self.authority
            )));
        }
        self.environment.set_authorized(true);
        Ok(self)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// True when there is no interactive request behind this context
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_weights() {
        assert!(Authority::System.satisfies(Authority::Application));
        assert!(Authority::Maintainer.satisfies(Authority::Contributor));
        assert!(Authority::Contributor.satisfies(Authority::Maintainer));
        assert!(!Authority::Guest.satisfies(Authority::Reader));
    }

    #[test]
    fn test_authorize_sets_flag() {
        let ctx = SessionContext::new(Authority::Contributor)
            .with_repository(RepositoryType::Entities);
        assert!(!ctx.environment().is_authorized());

        let ctx = ctx.authorize(Authority::Reader).unwrap();
        assert!(ctx.environment().is_authorized());
        assert!(!ctx.is_scheduled());
    }

    #[test]
    fn test_authorize_rejects_weak_authority() {
        let result = SessionContext::new(Authority::Guest).authorize(Authority::Contributor);
        assert!(matches!(result, Err(Error::InsufficientPrivilege(_))));
    }

    #[test]
    fn test_system_context_is_scheduled_and_authorized() {
        let ctx = SessionContext::system();
        assert!(ctx.is_scheduled());
        assert!(ctx.environment().is_authorized());
        assert_eq!(ctx.environment().repository_type(), Some(RepositoryType::Entities));
    }

    #[test]
    fn test_repository_type_parse() {
        assert_eq!("Transactions".parse::<RepositoryType>().unwrap(), RepositoryType::Transactions);
        assert!("nope".parse::<RepositoryType>().is_err());
    }
}
