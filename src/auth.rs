use async_trait::async_trait;
use axum::http::HeaderMap;
use ulid::Ulid;

use crate::model::Role;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Ulid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Ulid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_hr(&self) -> bool {
        self.role.is_hr()
    }

    /// Owners act on their own records, HR on anyone's.
    pub fn may_manage(&self, owner: Ulid) -> bool {
        self.is_hr() || self.user_id == owner
    }
}

/// Resolves request credentials to a principal. Token validation lives upstream.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Principal>;
}

/// Trusts `x-user-id` / `x-user-role` set by the gateway that verified the token.
#[derive(Debug, Default)]
pub struct HeaderIdentity;

#[async_trait]
impl IdentityProvider for HeaderIdentity {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Principal> {
        let user_id = headers.get(USER_ID_HEADER)?.to_str().ok()?;
        let user_id = Ulid::from_string(user_id.trim()).ok()?;
        let role = match headers.get(USER_ROLE_HEADER)?.to_str().ok()?.trim() {
            r if r.eq_ignore_ascii_case("hr") => Role::Hr,
            r if r.eq_ignore_ascii_case("employee") => Role::Employee,
            _ => return None,
        };
        Some(Principal { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn header_identity_parses_principal() {
        let id = Ulid::new();
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("HR"));
        let p = HeaderIdentity.authenticate(&headers).await.unwrap();
        assert_eq!(p, Principal::new(id, Role::Hr));
        assert!(p.may_manage(Ulid::new()));
    }

    #[tokio::test]
    async fn header_identity_rejects_missing_or_unknown() {
        let mut headers = HeaderMap::new();
        assert!(HeaderIdentity.authenticate(&headers).await.is_none());
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-ulid"));
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("Employee"));
        assert!(HeaderIdentity.authenticate(&headers).await.is_none());
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&Ulid::new().to_string()).unwrap(),
        );
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("admin"));
        assert!(HeaderIdentity.authenticate(&headers).await.is_none());
    }

    #[test]
    fn employees_manage_only_their_own() {
        let me = Principal::new(Ulid::new(), Role::Employee);
        assert!(me.may_manage(me.user_id));
        assert!(!me.may_manage(Ulid::new()));
    }
}
