//! Public types for login, logout and usage
use serde::{Deserialize, Serialize};

use crate::keys::UserKeyRecord;

#[derive(Deserialize)]
pub struct LoginForm {
    pub key: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserDataResponse {
    pub user_id: String,
    pub description: String,
    pub usage_count: u32,
    pub max_uses: u32,
    pub remaining_uses: u32,
}

impl From<&UserKeyRecord> for UserDataResponse {
    fn from(record: &UserKeyRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            description: record.description.clone(),
            usage_count: record.usage_count,
            max_uses: record.max_uses,
            remaining_uses: record.remaining_uses(),
        }
    }
}
