//! `sotto status` — show configuration, providers, and registered tools.

use sotto_config::AppConfig;
use sotto_tools::{Policy, default_registry, register_plugins};

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    println!("Sotto status");
    println!("------------");
    println!("Config file:    {}", AppConfig::default_path().display());
    println!("LLM endpoint:   {} ({})", config.llm.base_url, config.llm.model);
    if let Some(fallback) = &config.llm.fallback_model {
        println!("LLM fallback:   {fallback}");
    }
    println!("STT endpoint:   {} ({})", config.stt.base_url, config.stt.model);
    println!("TTS endpoint:   {} ({})", config.tts.base_url, config.tts.model);
    println!("State backend:  {} ({})", config.state.backend, config.state.dir.display());
    println!(
        "Context budget: {} messages (summarize at {})",
        config.context.max_messages, config.context.summarize_threshold
    );
    println!(
        "Engine:         depth {}, streaming {}, gating {:?}",
        config.engine.max_tool_depth, config.engine.streaming, config.engine.tool_gating
    );

    let policy = Policy {
        allowed_commands: config.autonomy.allowed_commands.clone(),
        allowed_roots: config.autonomy.allowed_roots.clone(),
        forbidden_paths: config.autonomy.forbidden_paths.clone(),
    };
    let mut registry = default_registry(&policy);
    let plugins = register_plugins(&mut registry, &config.autonomy.plugin_dir);

    println!("\nTools ({} built-in + {} plugins):", registry.len() - plugins, plugins);
    for name in registry.names() {
        println!("  - {name}");
    }

    Ok(())
}
