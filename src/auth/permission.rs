use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action name checked before any archive-state transition, in either direction
pub const ARCHIVE_ACTION: &str = "archive";

pub fn product_resource(id: &str) -> String {
    format!("catalog:products:{}", id)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{action}' on '{resource}' denied in shop '{shop_id}'")]
pub struct Denial {
    pub resource: String,
    pub action: String,
    pub shop_id: String,
}

/// Decides whether the caller may perform an action on one resource
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check(&self, resource: &str, action: &str, shop_id: &str) -> Result<(), Denial>;
}

/// A permission tuple carried in the bearer token. `*` in `shopId` or
/// `actions` matches anything; a trailing `*` in `resource` matches by prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub shop_id: String,
    pub resource: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Grant {
    pub fn new<I, S>(shop_id: impl Into<String>, resource: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shop_id: shop_id.into(),
            resource: resource.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, resource: &str, action: &str, shop_id: &str) -> bool {
        let shop_ok = self.shop_id == "*" || self.shop_id == shop_id;
        let resource_ok = match self.resource.strip_suffix('*') {
            Some(prefix) => resource.starts_with(prefix),
            None => self.resource == resource,
        };
        let action_ok = self.actions.iter().any(|a| a == "*" || a == action);
        shop_ok && resource_ok && action_ok
    }
}

/// Evaluates the grants from a verified token
#[derive(Debug, Clone)]
pub struct ClaimsPermissionChecker {
    subject: String,
    grants: Vec<Grant>,
}

impl ClaimsPermissionChecker {
    pub fn new(subject: impl Into<String>, grants: Vec<Grant>) -> Self {
        Self { subject: subject.into(), grants }
    }
}

#[async_trait]
impl PermissionChecker for ClaimsPermissionChecker {
    async fn check(&self, resource: &str, action: &str, shop_id: &str) -> Result<(), Denial> {
        if self.grants.iter().any(|g| g.allows(resource, action, shop_id)) {
            return Ok(());
        }
        tracing::debug!(subject = %self.subject, resource, action, shop_id, "no matching grant");
        Err(Denial {
            resource: resource.to_string(),
            action: action.to_string(),
            shop_id: shop_id.to_string(),
        })
    }
}

/// Grants everything; for local tooling and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionChecker for AllowAll {
    async fn check(&self, _resource: &str, _action: &str, _shop_id: &str) -> Result<(), Denial> {
        Ok(())
    }
}
