//! `infrared config` — Configuration management commands.

use super::SessionOptions;
use infrared_config::AppConfig;

/// Checks that don't make a config invalid but will trip a session.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.has_api_key() && config.provider != "ollama" {
        warnings.push("No API key set (set INFRARED_API_KEY or DEEPSEEK_API_KEY)".to_string());
    }
    if config.orchestrator.max_attempts > 10 {
        warnings.push(format!(
            "max_attempts = {} may spend many model calls per request",
            config.orchestrator.max_attempts
        ));
    }
    if !config.session.workspace_root.is_dir() {
        warnings.push(format!(
            "Workspace root '{}' is not a directory",
            config.session.workspace_root.display()
        ));
    }
    if infrared_providers::default_base_url(&config.provider).is_none() && config.api_url.is_none()
    {
        warnings.push(format!(
            "Unknown provider '{}' needs api_url to be set",
            config.provider
        ));
    }
    warnings
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if config.has_api_key() {
        config.api_key = Some("***".into());
    }
    config
}

pub fn validate(options: &SessionOptions) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match super::load_config(options) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:   {}", config.provider);
    println!("   Model:      {}", config.model);
    println!("   Attempts:   {}", config.orchestrator.max_attempts);
    println!("   Planning:   {}", config.orchestrator.planning);
    println!("   File limit: {} bytes", config.limits.max_file_bytes);
    println!("   Workspace:  {}", config.session.workspace_root.display());
    Ok(())
}

pub fn show(options: &SessionOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(options)?;
    let toml_str = toml::to_string_pretty(&redacted(&config))?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    println!("# Save as {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", AppConfig::default_toml());
    Ok(())
}
