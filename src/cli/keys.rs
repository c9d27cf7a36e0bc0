use anyhow::Result;

use crate::core::AppConfig;
use crate::keys::{KeyStore, UserKeyRecord, generate_key};

/// Show enough of a key to tell them apart without printing the
/// whole credential.
fn mask(key: &str) -> String {
    if key.chars().count() <= 6 {
        return "*".repeat(key.chars().count());
    }
    let prefix: String = key.chars().take(6).collect();
    format!("{}…", prefix)
}

pub fn list(config: &AppConfig) -> Result<()> {
    let store = KeyStore::open(&config.keys_path, config.default_max_uses)?;
    for record in store.records() {
        println!(
            "{:<10} {:<20} {:>5}/{:<5} {}",
            mask(&record.key),
            record.user_id,
            record.usage_count,
            record.max_uses,
            record.description
        );
    }
    Ok(())
}

pub fn add(
    config: &AppConfig,
    user_id: &str,
    max_uses: Option<u32>,
    description: &str,
) -> Result<()> {
    let store = KeyStore::open(&config.keys_path, config.default_max_uses)?;
    let key = generate_key();
    let max_uses = max_uses.unwrap_or(config.default_max_uses);
    store.insert(UserKeyRecord::new(&key, max_uses, user_id, description))?;
    println!("{}", key);
    eprintln!(
        "A running server picks up the new key on its next recorded use, or right away after `kill -HUP <pid>`"
    );
    Ok(())
}
