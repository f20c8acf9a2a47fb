//! `devpilot server` — Start the DevPilot HTTP backend server.

pub async fn run(
    host: String,
    port: u16,
    db_path: String,
    engine_config_path: Option<String>,
    schedule_tick_secs: u64,
) -> Result<(), String> {
    super::load_dotenv();

    let config = devpilot_server::ServerConfig {
        host: host.clone(),
        port,
        db_path,
        engine_config_path,
        schedule_tick_secs,
    };

    println!("Starting DevPilot server on {}:{}...", host, port);

    let addr = devpilot_server::start_server(config).await?;
    println!("DevPilot server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
