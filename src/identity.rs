use uuid::Uuid;

use crate::transaction::AccountId;

/// An identity already verified by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    pub user_id: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into() }
    }
}

/// Maps a verified caller to the wallet it owns. The engine never resolves identities itself.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, caller: &Caller) -> Option<AccountId>;
}

/// Derives one stable [`AccountId`] per user id (UUID v5), so no lookup table is needed.
#[derive(Debug, Clone, Copy)]
pub struct UserDirectory {
    namespace: Uuid,
}

impl UserDirectory {
    pub const DEFAULT_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_52e4_93c1_4d0b_8e7a_0c55_1e2d_9f30);

    pub const fn new() -> Self {
        Self::with_namespace(Self::DEFAULT_NAMESPACE)
    }

    pub const fn with_namespace(namespace: Uuid) -> Self {
        Self { namespace }
    }

    /// Returns [`None`] for blank user ids.
    pub fn account_id(&self, user_id: &str) -> Option<AccountId> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return None;
        }
        Some(AccountId(Uuid::new_v5(&self.namespace, user_id.as_bytes())))
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver for UserDirectory {
    fn resolve(&self, caller: &Caller) -> Option<AccountId> {
        self.account_id(&caller.user_id)
    }
}
