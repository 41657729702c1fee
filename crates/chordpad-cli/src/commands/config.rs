use std::path::Path;

use chordpad_core::db::{LibSqlSettingsRepository, SettingsRepository, SharedDatabase};
use chordpad_core::DraftConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::load_config;
use crate::error::CliError;

pub async fn run_config(
    db: &SharedDatabase,
    command: ConfigCommands,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { json } => {
            let config = load_config(db, config_path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                for (key, value) in config.entries() {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigCommands::Set { key, value } => {
            let config = store_setting(db, config_path, &key, &value).await?;
            let stored = config
                .entries()
                .into_iter()
                .find(|(entry, _)| *entry == key.as_str())
                .map_or(value, |(_, stored)| stored);
            println!("{key} = {stored}");
        }
        ConfigCommands::Reset => {
            let db = db.lock().await;
            LibSqlSettingsRepository::new(db.connection())
                .clear()
                .await?;
            println!("Stored settings cleared");
        }
    }
    Ok(())
}

/// Store one override, refusing values that leave the effective settings invalid.
pub async fn store_setting(
    db: &SharedDatabase,
    config_path: Option<&Path>,
    key: &str,
    value: &str,
) -> Result<DraftConfig, CliError> {
    let mut config = load_config(db, config_path).await?;
    config.apply_override(key, value)?;
    config
        .validate()
        .map_err(|error| CliError::Config(error.to_string()))?;

    let db = db.lock().await;
    LibSqlSettingsRepository::new(db.connection())
        .set(key, value)
        .await?;
    Ok(config)
}
