use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Inspect a running llm-pool-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Caller token.
    #[arg(short, long, env = "PROXY_CLI_TOKEN")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pool overview and usage metrics
    Status,
    /// Models served by healthy backends
    Models,
    /// One line per pooled backend
    Backends,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.token))?);

    let base = cli.url.trim_end_matches('/');
    match cli.command {
        Commands::Status => {
            if let Some(json) = fetch(&client, &format!("{base}/proxy/v1/status"), headers).await? {
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        Commands::Models => {
            if let Some(json) = fetch(&client, &format!("{base}/proxy/v1/models"), headers).await? {
                let ids = json["data"].as_array().into_iter().flatten();
                for id in ids.filter_map(|m| m["id"].as_str()) {
                    println!("{id}");
                }
            }
        }
        Commands::Backends => {
            if let Some(json) = fetch(&client, &format!("{base}/proxy/v1/status"), headers).await? {
                print_backends(&json["pool_status"]);
            }
        }
    }

    Ok(())
}

async fn fetch(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let res = client.get(url).headers(headers).send().await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(None);
    }
    Ok(Some(res.json().await?))
}

fn print_backends(pool: &Value) {
    println!(
        "{} providers, {} backends, {} healthy",
        pool["total_providers"], pool["total_backends"], pool["healthy_backends"]
    );
    for backend in pool["backends"].as_array().into_iter().flatten() {
        let state = if backend["is_healthy"].as_bool().unwrap_or(false) {
            "healthy"
        } else {
            "unhealthy"
        };
        println!(
            "{:<24} {:<16} {:<10} requests={} failures={} {}",
            backend["name"].as_str().unwrap_or("-"),
            backend["provider"].as_str().unwrap_or("-"),
            state,
            backend["stats"]["total_requests"],
            backend["stats"]["failures"],
            backend["base_url"].as_str().unwrap_or(""),
        );
    }
}
