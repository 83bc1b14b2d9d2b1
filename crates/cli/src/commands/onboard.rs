//! `sotto onboard` — write a starter configuration.

use anyhow::Context;
use sotto_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let path = AppConfig::default_path();

    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, AppConfig::starter_toml())
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Wrote starter config to {}", path.display());
    println!("Edit it to point at your local llm/stt/tts servers, then run `sotto chat`.");
    Ok(())
}
