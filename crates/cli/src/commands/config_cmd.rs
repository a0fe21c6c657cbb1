//! `agentloop config`: show, validate and initialize configuration.

use agentloop_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set OPENROUTER_API_KEY or OPENAI_API_KEY)");
    }
    if config.memory.recent_window_secs > config.memory.ttl_secs {
        warnings.push("memory.recent_window_secs exceeds ttl_secs; expired entries are never recalled");
    }
    if config.memory.experience_recall > config.memory.experience_cap {
        warnings.push("memory.experience_recall exceeds experience_cap");
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Provider:        {}", config.default_provider);
    println!("   Model:           {}", config.default_model);
    println!("   Max iterations:  {}", config.session.max_iterations);
    println!("   Model permits:   {}", config.limits.model_permits);
    println!(
        "   Memory:          {} ({})",
        config.memory.backend,
        if config.memory.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_dir().join("config.toml");
    if path.exists() {
        return Err(format!("Config already exists at {}", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
