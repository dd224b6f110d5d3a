//! Command-line exerciser for the Secomat cloud API
//!
//! ```text
//! cargo run --example probe -- <claim-token>                 # print state
//! cargo run --example probe -- <claim-token> --interactive   # send commands by hand
//! cargo run --example probe -- <claim-token> --all           # probe command variations
//! ```

use clap::Parser;
use secomat::{RemoteResult, SecomatClient, StateSnapshot};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Exercise the Secomat cloud API without a host")]
struct Args {
    /// Claim token from the Secomat app
    #[arg(env = "SECOMAT_CLAIM_TOKEN", hide_env_values = true)]
    claim_token: String,

    /// Read commands from stdin and send them one by one
    #[arg(short, long, conflicts_with = "all")]
    interactive: bool,

    /// Probe command name and argument variations
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let client = SecomatClient::new(args.claim_token)?;

    let result = if args.interactive {
        run_interactive(&client).await
    } else if args.all {
        run_all(&client).await
    } else {
        run_basic(&client).await
    };

    client.release().await;
    result
}

fn print_state(state: &StateSnapshot) {
    for (key, value) in state.fields() {
        println!("  {}: {}", key, value);
    }
}

async fn run_basic(client: &SecomatClient) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== GET state ===");
    let state = match client.fetch_state().await {
        Ok(state) => state,
        Err(e) => {
            println!("Error: {}", e);
            println!("Cannot proceed without valid state");
            return Ok(());
        }
    };
    print_state(&state);

    println!("\nKey values:");
    println!("  Temperature: {:?} °C", state.ambient_temperature());
    println!("  Humidity: {:?} %", state.humidity());
    println!("  State: {}", state.secomat_state_label());
    println!("  Operating mode: {}", state.operating_mode_label());
    println!("  Target humidity level: {}", state.target_humidity_level());
    println!("\nUse --interactive to send commands");
    Ok(())
}

/// Parse `COMMAND key=value ...`, coercing integer values
fn parse_command_line(line: &str) -> Option<(String, Map<String, Value>)> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?.to_string();

    let mut args = Map::new();
    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            let value = match value.parse::<i64>() {
                Ok(n) => json!(n),
                Err(_) => json!(value),
            };
            args.insert(key.to_string(), value);
        }
    }
    Some((command, args))
}

async fn run_interactive(client: &SecomatClient) -> Result<(), Box<dyn std::error::Error>> {
    let state = client.fetch_state().await?;
    println!("Current state:");
    print_state(&state);

    println!("\nEnter a command (or 'quit' to exit)");
    println!("Format: COMMAND_NAME arg1=value1 arg2=value2");
    println!("Examples: OFF | PRG_WASH_AUTO | SET_TARGET_HUMIDITY level=2 | PRG_ROOM_ON\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        let Some((command, args)) = parse_command_line(line) else {
            continue;
        };

        println!("Sending: {} with {:?}", command, args);
        let args = (!args.is_empty()).then_some(args);
        match send_and_reload(client, &command, args).await {
            Ok((accepted, state)) => {
                if accepted {
                    println!("Accepted");
                } else {
                    println!("Command sent but status was not OK");
                }
                println!(
                    "New state: secomat_state={}, target_humidity_level={}",
                    state.secomat_state_label(),
                    state.target_humidity_level()
                );
            }
            Err(e) => println!("Error: {}", e),
        }
    }
    Ok(())
}

async fn send_and_reload(
    client: &SecomatClient,
    command: &str,
    args: Option<Map<String, Value>>,
) -> RemoteResult<(bool, StateSnapshot)> {
    let accepted = client.send_command(command, args).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    Ok((accepted, client.fetch_state().await?))
}

async fn probe(client: &SecomatClient, command: &str, args: Value) {
    let map = match &args {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    match client.send_command(command, Some(map)).await {
        Ok(accepted) => println!("{:30} {:40} -> accepted={}", command, args.to_string(), accepted),
        Err(e) => println!("{:30} {:40} -> {}", command, args.to_string(), e),
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
}

async fn run_all(client: &SecomatClient) -> Result<(), Box<dyn std::error::Error>> {
    let state = client.fetch_state().await?;
    println!(
        "Current: secomat_state={}, target_humidity_level={}\n",
        state.secomat_state_label(),
        state.target_humidity_level()
    );

    println!("Testing command name variations...");
    for prefix in ["", "CMD_", "PRG_", "SET_"] {
        for base in ["TARGET_HUMIDITY", "HUMIDITY_LEVEL", "HUMIDITY", "MOISTURE"] {
            probe(client, &format!("{}{}", prefix, base), json!({"level": 2})).await;
        }
    }

    println!("\nTesting argument names...");
    for name in ["level", "value", "target_humidity_level", "humidity_level"] {
        let mut args = Map::new();
        args.insert(name.to_string(), json!(2));
        probe(client, "SET_TARGET_HUMIDITY", Value::Object(args)).await;
    }
    Ok(())
}
