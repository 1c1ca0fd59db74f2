use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use analysis_gateway::auth::UserDirectory;
use analysis_gateway::config::load_config;
use analysis_gateway::routing::VersionResolver;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the Analysis Gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token for remote commands.
    #[arg(short, long, env = "GATEWAY_TOKEN", default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a gateway configuration file
    Validate {
        #[arg(short, long, default_value = "gateway.toml")]
        config: PathBuf,
    },
    /// Show which backend version a user would be routed to
    Resolve {
        #[arg(short, long, default_value = "gateway.toml")]
        config: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Ask a running gateway for the caller's versions
    Versions,
    /// Submit a document to a running gateway
    Analyze {
        file: PathBuf,
        #[arg(long)]
        options: Option<String>,
        #[arg(long)]
        version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            let config = load_config(&config)?;
            println!(
                "OK: {} backend version(s), default '{}'",
                config.backends.len(),
                config.default_version
            );
        }
        Commands::Resolve {
            config,
            user,
            version,
        } => {
            let config = load_config(&config)?;
            let directory = UserDirectory::load(&config.users.path)?;
            let user = directory
                .get(&user)
                .ok_or_else(|| format!("Unknown user '{}'", user))?;
            let resolver = VersionResolver::new(
                config.default_version.clone(),
                std::sync::Arc::new(config.backends.clone()),
            );
            let resolution = resolver.resolve(version.as_deref(), &user);
            let configured = resolver.backend(&resolution.version).is_ok();
            println!(
                "{} (via {}){}",
                resolution.version,
                resolution.rule.as_str(),
                if configured { "" } else { " [not configured]" }
            );
        }
        Commands::Versions => {
            let client = reqwest::Client::new();
            let res = client
                .get(format!("{}/v1/versions", cli.url))
                .headers(auth_headers(&cli.token)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Analyze {
            file,
            options,
            version,
        } => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("document")
                .to_string();
            let data = tokio::fs::read(&file).await?;
            let mut form =
                Form::new().part("file", Part::bytes(data).file_name(name).mime_str("application/pdf")?);
            if let Some(options) = options {
                form = form.text("options", options);
            }
            if let Some(version) = version {
                form = form.text("version", version);
            }

            let client = reqwest::Client::new();
            let res = client
                .post(format!("{}/v1/analyze", cli.url))
                .headers(auth_headers(&cli.token)?)
                .multipart(form)
                .send()
                .await?;
            if let Some(id) = res.headers().get("x-request-id") {
                eprintln!("Request ID: {}", id.to_str().unwrap_or_default());
            }
            print_response(res).await?;
        }
    }

    Ok(())
}

fn auth_headers(token: &str) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token))?,
    );
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
