//! Hookrelay Sign - webhook signature generator.
//!
//! Produces the `sha256=<hex>` header value a sender must attach, plus a
//! ready-to-run curl command. Useful for testing a deployed receiver.
//!
//! ```text
//! hookrelay-sign '{"event_type":"test","data":{}}' my-secret
//! hookrelay-sign            # prompts for payload and secret
//! ```

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use hookrelay::web::signature::sign;

/// Payload used when the interactive prompt is left empty.
const DEFAULT_PAYLOAD: &str = r#"{"event_type":"test.event","data":{"test":true}}"#;

/// Generate HMAC-SHA256 signatures for webhook payloads
#[derive(Parser, Debug)]
#[command(name = "hookrelay-sign")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate HMAC-SHA256 signatures for webhook payloads")]
struct Cli {
    /// Exact JSON body to sign; prompted for when omitted
    payload: Option<String>,

    /// Signing secret; prompted for when omitted
    #[arg(env = "WEBHOOK_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Receiver URL used in the example curl command
    #[arg(long, default_value = "${WEBHOOK_URL}")]
    url: String,

    /// Signature header name used in the example curl command
    #[arg(long, default_value = "X-Webhook-Signature")]
    header: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let payload = match cli.payload {
        Some(payload) => payload,
        None => {
            println!("=== HMAC Signature Generator ===\n");
            let entered = prompt(
                &mut input,
                "Enter JSON payload (or press Enter for default test payload):",
            )?;
            let payload = if entered.is_empty() {
                println!("Using default payload: {DEFAULT_PAYLOAD}");
                DEFAULT_PAYLOAD.to_string()
            } else {
                entered
            };
            serde_json::from_str::<serde_json::Value>(&payload).context("Invalid JSON")?;
            payload
        }
    };

    let secret = match cli.secret {
        Some(secret) => secret,
        None => {
            let secret = prompt(&mut input, "\nEnter secret key:")?;
            if secret.is_empty() {
                bail!("Secret key cannot be empty");
            }
            secret
        }
    };

    let signature = sign(&secret, payload.as_bytes());
    print!("{}", render(&payload, &signature, &cli.url, &cli.header));

    Ok(())
}

fn prompt(input: &mut impl BufRead, message: &str) -> Result<String> {
    println!("{message}");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read input")?;
    Ok(line.trim().to_string())
}

/// Human-readable result: signature, curl example and shell variables.
fn render(payload: &str, signature: &str, url: &str, header: &str) -> String {
    format!(
        "\n=== Generated Signature ===\n\
         Payload:   {payload}\n\
         Signature: {signature}\n\
         \n=== Example curl command ===\n\
         curl -X POST \"{url}\" \\\n  \
         -H \"Content-Type: application/json\" \\\n  \
         -H \"{header}: {signature}\" \\\n  \
         -d '{payload}'\n\
         \n=== For bash script ===\n\
         SIGNATURE=\"{signature}\"\n\
         PAYLOAD='{payload}'\n"
    )
}
