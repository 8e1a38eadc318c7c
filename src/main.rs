use clap::Parser;
use dhis2_bridge::config::{Cli, Command, RuntimeConfig, ServeArgs};
use dhis2_bridge::errors::ToolError;
use dhis2_bridge::services::logger::Logger;
use dhis2_bridge::services::verification::VerificationService;

async fn verify_once(url: &str, token: &str) -> Result<(), ToolError> {
    let client = dhis2_bridge::app::App::http_client()?;
    let result = VerificationService::new(client, Logger::new("dhis2"))
        .verify(url, token)
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.success {
        Ok(())
    } else {
        Err(ToolError::denied(result.error.unwrap_or_default()))
    }
}

async fn serve(args: ServeArgs) -> Result<(), ToolError> {
    let config = RuntimeConfig::from_env()?.apply_overrides(&args);
    dhis2_bridge::mcp::server::run_stdio(config).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Some(Command::Verify { url, token }) => verify_once(&url, &token).await,
        Some(Command::Serve(args)) => serve(args).await,
        None => serve(cli.serve).await,
    };
    if let Err(err) = outcome {
        eprintln!("dhis2-bridge: {}", err);
        std::process::exit(1);
    }
}
