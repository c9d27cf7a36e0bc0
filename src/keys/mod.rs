//! Access keys, their persisted usage counts and the quota checks
//! built on top of them.

pub mod quota;
pub mod store;

pub use quota::{QuotaGuard, QuotaPermit};
pub use store::{KeyMap, KeyStore, UserKeyRecord, generate_key};

/// The caller behind a request: the key they presented and the record
/// it resolved to.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub key: String,
    pub record: UserKeyRecord,
}

impl AuthContext {
    pub fn resolve(keys: &KeyStore, key: &str) -> Result<Self, crate::core::ChatError> {
        let record = keys.get(key).ok_or(crate::core::ChatError::Unauthorized)?;
        Ok(Self {
            key: key.to_string(),
            record,
        })
    }
}
