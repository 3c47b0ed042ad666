//! Per-call identity of the caller.

use uuid::Uuid;

use crate::application::error::AppError;
use crate::domain::scoring::hash_ip;

/// Who is calling and from where. Built once per inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Option<Uuid>,
    pub ip: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ip: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn require_user(&self) -> Result<Uuid, AppError> {
        self.user_id
            .ok_or_else(|| AppError::permission("Not logged in"))
    }

    pub fn is_owner(&self, owner_id: Uuid) -> bool {
        self.user_id == Some(owner_id)
    }

    pub fn ip_hash(&self) -> Option<String> {
        self.ip
            .as_deref()
            .filter(|ip| !ip.trim().is_empty())
            .map(hash_ip)
    }
}
