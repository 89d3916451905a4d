/// Configuration command handlers
use anyhow::Result;
use pausegate_core::EngineConfig;
use std::path::Path;

pub fn handle_config_show(config_path: &Path) -> Result<()> {
    let config = EngineConfig::load(config_path)?;
    if !config_path.exists() {
        println!("# {} not found, showing defaults", config_path.display());
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}

pub fn handle_config_path(config_path: &Path) {
    println!("{}", config_path.display());
}
