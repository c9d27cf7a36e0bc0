use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::ai::chat::ChatGateway;
use crate::core::{AppConfig, load_system_prompt};
use crate::gemini::GeminiModel;

const EXIT_WORD: &str = "salir";

/// Talk to the assistant from the terminal. Uses the same system
/// prompt and model as the server but no key or quota.
pub async fn run(config: AppConfig) -> Result<()> {
    let api_key = config
        .gemini_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("GEMINI_API_KEY must be set to chat"))?;
    let system_prompt = load_system_prompt(&config.prompt_path)?;
    let timeout = Duration::from_secs(config.model_timeout_secs);
    let model = GeminiModel::new(
        &config.gemini_api_hostname,
        api_key,
        &config.gemini_model,
        config.search_grounding,
        timeout,
    )?;
    let gateway = ChatGateway::builder(Arc::new(model))
        .timeout(timeout)
        .build();
    let mut transcript = gateway.start(&system_prompt);

    let mut rl = DefaultEditor::new()?;
    println!("{}", config.greeting);
    println!("Escribe '{}' para terminar.", EXIT_WORD);

    loop {
        let readline = rl.readline("Tú: ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case(EXIT_WORD) {
                    break;
                }
                let _ = rl.add_history_entry(line);
                match gateway.send(&mut transcript, line).await {
                    Ok(reply) => println!("\nAsistente: {}\n", reply),
                    // The turn wasn't recorded so the user can just try again
                    Err(e) => println!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("¡Hasta luego!");
    Ok(())
}
