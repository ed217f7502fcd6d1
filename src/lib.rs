pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod memory;
pub mod models;
pub mod server;

use agent::ChatAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("History Store Type: {}", args.history_type);
    info!("History Store Host: {}", args.history_host);
    info!("Memory Window: {} messages", args.memory_max_messages);
    info!("Max Message Length: {} chars", args.max_message_chars);
    info!("System Prompt Path: {}", args.system_prompt_path.as_deref().unwrap_or("(built-in)"));
    info!("CORS Origins: {}", args.cors_allowed_origins);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = ChatAgent::from_args(&args).await?;
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, args);
    server.run().await?;

    Ok(())
}
