use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

const X_CORRELATION_ID: &str = "x-correlation-id";

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the resilient gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Health,
    /// Invoke the resilient external-call endpoint
    Call {
        /// Correlation ID to send; the gateway generates one when omitted
        #[arg(long)]
        correlation_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Call { correlation_id } => {
            let mut headers = HeaderMap::new();
            if let Some(id) = correlation_id {
                headers.insert(X_CORRELATION_ID, HeaderValue::from_str(&id)?);
            }
            let res = client
                .get(format!("{}/external", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let correlation_id = res
        .headers()
        .get(X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    println!("status: {}", status);
    println!("correlation-id: {}", correlation_id);

    let text = res.text().await?;
    if text.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
