//! `sotto chat` — interactive chat, one-shot messages, or a transcribed
//! audio file, against the configured local providers.

use anyhow::Context;
use sotto_config::AppConfig;
use sotto_core::message::SessionId;
use sotto_core::provider::LanguageModel;
use sotto_core::state::{SessionState, StateStore};
use sotto_engine::{AudioUnit, ContextStore, Engine, ModelSummarizer, TurnOutcome};
use sotto_memory::{FileStateStore, SqliteStateStore};
use sotto_providers::{FallbackModel, HttpSpeechSynthesis, HttpSpeechToText, OpenAiCompatModel};
use sotto_providers::retry::RetryPolicy;
use sotto_tools::{Policy, default_registry, register_plugins};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn run(
    message: Option<String>,
    session: Option<String>,
    speak: bool,
    audio: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    let session_id = session.unwrap_or_else(|| SessionId::new().to_string());

    let mut engine = build_engine(&config, &session_id, speak || audio.is_some()).await?;
    let audio_dir = sotto_config::home_dir().join(".sotto").join("audio");

    if let Some(path) = audio {
        let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let outcome = engine.handle_audio_turn(bytes).await;
        if let Some(transcript) = &outcome.transcript {
            println!("you (heard)> {}", transcript.text);
        }
        print_outcome(&outcome, &audio_dir, 0)?;
        return Ok(());
    }

    if let Some(message) = message {
        let outcome = engine.handle_turn(&message).await;
        print_outcome(&outcome, &audio_dir, 0)?;
        return Ok(());
    }

    println!("Session {session_id} — type your message, or 'exit' to quit.");
    let stdin = std::io::stdin();
    let mut turn = 0usize;

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let outcome = engine.handle_turn(line).await;
        print_outcome(&outcome, &audio_dir, turn)?;
        turn += 1;
    }

    Ok(())
}

async fn build_engine(
    config: &AppConfig,
    session_id: &str,
    with_voice: bool,
) -> anyhow::Result<Engine> {
    // Language model, with the degraded fallback when configured
    let base: Arc<dyn LanguageModel> = Arc::new(OpenAiCompatModel::new(
        "llm",
        &config.llm.base_url,
        config.llm.api_key.clone(),
    ));
    let llm: Arc<dyn LanguageModel> = match &config.llm.fallback_model {
        Some(fallback) => Arc::new(
            FallbackModel::new(base, fallback)
                .with_degraded_max_tokens(config.llm.max_tokens.min(256)),
        ),
        None => base,
    };

    // Tools: built-ins plus discovered plugins
    let policy = Policy {
        allowed_commands: config.autonomy.allowed_commands.clone(),
        allowed_roots: config.autonomy.allowed_roots.clone(),
        forbidden_paths: config.autonomy.forbidden_paths.clone(),
    };
    let mut registry = default_registry(&policy);
    let plugins = register_plugins(&mut registry, &config.autonomy.plugin_dir);
    info!(tools = registry.len(), plugins, "Tool registry ready");

    // State store
    let store: Option<Arc<dyn StateStore>> = match config.state.backend.as_str() {
        "file" => Some(Arc::new(FileStateStore::new(config.state.dir.clone()))),
        "sqlite" => {
            let db = config.state.dir.join("state.db");
            Some(Arc::new(
                SqliteStateStore::new(&db)
                    .await
                    .context("opening state database")?,
            ))
        }
        _ => None,
    };

    let state = match &store {
        Some(store) => Engine::load_state(store.as_ref(), session_id).await,
        None => SessionState::new(session_id),
    };

    let context = ContextStore::new(&config.system_prompt, config.context.max_messages)
        .with_summarize_threshold(config.context.summarize_threshold)
        .with_important_slack(config.context.important_slack)
        .with_summarizer(Arc::new(ModelSummarizer::new(
            llm.clone(),
            config.llm.model.clone(),
        )));

    let retry = RetryPolicy {
        max_retries: config.resilience.max_retries,
        base_delay: Duration::from_millis(config.resilience.base_delay_ms),
        max_delay: Duration::from_millis(config.resilience.max_delay_ms),
    };

    let mut engine = Engine::new(
        llm,
        config.llm.model.clone(),
        Arc::new(registry),
        context,
        state,
    )
    .with_temperature(config.llm.temperature)
    .with_max_tokens(config.llm.max_tokens)
    .with_max_tool_depth(config.engine.max_tool_depth)
    .with_snapshot_window(config.context.snapshot_window)
    .with_streaming(config.engine.streaming)
    .with_tool_gating(config.engine.tool_gating)
    .with_retry_policy(retry)
    .with_state_debounce(Duration::from_millis(config.state.debounce_ms));

    if let Some(store) = store {
        engine = engine.with_state_store(store);
    }

    if with_voice {
        engine = engine
            .with_speech_to_text(Arc::new(HttpSpeechToText::new(
                &config.stt.base_url,
                config.stt.api_key.clone(),
                &config.stt.model,
            )))
            .with_speech_synthesis(Arc::new(HttpSpeechSynthesis::new(
                &config.tts.base_url,
                config.tts.api_key.clone(),
                &config.tts.model,
                &config.tts.voice,
            )));
    }

    Ok(engine)
}

fn print_outcome(outcome: &TurnOutcome, audio_dir: &PathBuf, turn: usize) -> anyhow::Result<()> {
    println!("sotto> {}", outcome.reply);

    if !outcome.audio.is_empty() {
        std::fs::create_dir_all(audio_dir)
            .with_context(|| format!("creating {}", audio_dir.display()))?;
        for (i, unit) in outcome.audio.iter().enumerate() {
            let path = audio_dir.join(format!("turn-{turn}-unit-{i}.wav"));
            write_unit(&path, unit)?;
            println!("  [audio] {}", path.display());
        }
    }
    Ok(())
}

fn write_unit(path: &PathBuf, unit: &AudioUnit) -> anyhow::Result<()> {
    std::fs::write(path, &unit.audio).with_context(|| format!("writing {}", path.display()))
}
