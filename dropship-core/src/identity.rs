use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Dropshipper,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Dropshipper => "DROPSHIPPER",
            Role::Operator => "OPERATOR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DROPSHIPPER" => Ok(Role::Dropshipper),
            "OPERATOR" => Ok(Role::Operator),
            other => Err(CoreError::ValidationError(format!("unknown role: {}", other))),
        }
    }
}

/// The authenticated caller of a service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub role: Role,
}

impl Requester {
    pub fn dropshipper(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Dropshipper }
    }

    pub fn operator(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Operator }
    }

    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }

    pub fn require_operator(&self) -> CoreResult<()> {
        if self.is_operator() {
            Ok(())
        } else {
            Err(CoreError::Forbidden("operator role required".to_string()))
        }
    }

    /// Owners see their own records; operators see everything.
    pub fn require_owner_or_operator(&self, owner_id: Uuid) -> CoreResult<()> {
        if self.is_operator() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "user {} does not own this resource",
                self.user_id
            )))
        }
    }
}

/// Reseller account as known to the external identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropshipper {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn get_dropshipper(&self, id: Uuid) -> CoreResult<Option<Dropshipper>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_or_operator() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(Requester::dropshipper(owner).require_owner_or_operator(owner).is_ok());
        assert!(Requester::operator(other).require_owner_or_operator(owner).is_ok());
        assert!(matches!(
            Requester::dropshipper(other).require_owner_or_operator(owner),
            Err(CoreError::Forbidden(_))
        ));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("OPERATOR".parse::<Role>().unwrap(), Role::Operator);
        assert_eq!("DROPSHIPPER".parse::<Role>().unwrap(), Role::Dropshipper);
        assert!("ADMIN".parse::<Role>().is_err());
        assert!(Requester::dropshipper(Uuid::new_v4()).require_operator().is_err());
    }
}
