//! Config command handlers

use anyhow::{bail, Context, Result};

use verse_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let remote = &config.remote;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "sync_enabled": config.sync_enabled,
                    "sync_interval_secs": config.sync_interval_secs,
                    "tombstone_retention_days": config.tombstone_retention_days,
                    "full_sync_after_days": config.full_sync_after_days,
                    "page_size": config.page_size,
                    "remote": {
                        "project_id": remote.project_id,
                        "api_key": remote.api_key.as_ref().map(|_| "(set)"),
                        "auth_token": remote.auth_token.as_ref().map(|_| "(set)"),
                        "base_url": remote.base_url,
                        "root_path": remote.root_path,
                        "poll_interval_secs": remote.poll_interval_secs
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let secret = |value: &Option<String>| if value.is_some() { "(set)" } else { "(not set)" };
            println!("Configuration:");
            println!("  data_dir:                 {}", config.data_dir.display());
            println!("  sync_enabled:             {}", config.sync_enabled);
            println!("  sync_interval_secs:       {}", config.sync_interval_secs);
            println!("  tombstone_retention_days: {}", config.tombstone_retention_days);
            println!("  full_sync_after_days:     {}", config.full_sync_after_days);
            println!("  page_size:                {}", config.page_size);
            println!(
                "  project_id:               {}",
                remote.project_id.as_deref().unwrap_or("(not set)")
            );
            println!("  api_key:                  {}", secret(&remote.api_key));
            println!("  auth_token:               {}", secret(&remote.auth_token));
            println!("  base_url:                 {}", remote.base_url);
            println!(
                "  root_path:                {}",
                remote.root_path.as_deref().unwrap_or("(not set)")
            );
            println!("  poll_interval_secs:       {}", remote.poll_interval_secs);
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    apply(&mut config, &key, &value)?;
    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let optional = |value: &str| {
        if value.is_empty() || value == "none" {
            None
        } else {
            Some(value.to_string())
        }
    };
    let number = |value: &str| -> Result<u64> {
        value
            .parse()
            .with_context(|| format!("Invalid value for {}. Expected a number.", key))
    };

    match key {
        "data_dir" => config.data_dir = value.into(),
        "sync_enabled" => {
            config.sync_enabled = value
                .parse()
                .context("Invalid value for sync_enabled. Use 'true' or 'false'.")?;
        }
        "sync_interval_secs" => config.sync_interval_secs = number(value)?,
        "tombstone_retention_days" => {
            config.tombstone_retention_days = u32::try_from(number(value)?)?
        }
        "full_sync_after_days" => config.full_sync_after_days = u32::try_from(number(value)?)?,
        "page_size" => config.page_size = usize::try_from(number(value)?)?,
        "project_id" => config.remote.project_id = optional(value),
        "api_key" => config.remote.api_key = optional(value),
        "auth_token" => config.remote.auth_token = optional(value),
        "base_url" => config.remote.base_url = value.trim_end_matches('/').to_string(),
        "root_path" => config.remote.root_path = optional(value),
        "poll_interval_secs" => config.remote.poll_interval_secs = number(value)?,
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, sync_enabled, sync_interval_secs, \
                 tombstone_retention_days, full_sync_after_days, page_size, project_id, \
                 api_key, auth_token, base_url, root_path, poll_interval_secs",
                key
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();
        apply(&mut config, "sync_enabled", "true").unwrap();
        apply(&mut config, "project_id", "verse-demo").unwrap();
        apply(&mut config, "tombstone_retention_days", "14").unwrap();
        apply(&mut config, "base_url", "http://localhost:8080/v1/").unwrap();

        assert!(config.sync_enabled);
        assert_eq!(config.remote.project_id.as_deref(), Some("verse-demo"));
        assert_eq!(config.tombstone_retention_days, 14);
        assert_eq!(config.remote.base_url, "http://localhost:8080/v1");

        apply(&mut config, "project_id", "none").unwrap();
        assert!(config.remote.project_id.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(apply(&mut config, "sync_enabled", "maybe").is_err());
        assert!(apply(&mut config, "page_size", "many").is_err());
        assert!(apply(&mut config, "favorite_color", "blue").is_err());
    }
}
