use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use irislink::prelude::*;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

struct Settings {
    client_id: String,
    client_secret: String,
    token_file: PathBuf,
}

fn settings_from_env() -> Result<Settings, String> {
    let client_id = env::var("IRISLINK_CLIENT_ID").map_err(|_| "IRISLINK_CLIENT_ID is not set")?;
    let client_secret =
        env::var("IRISLINK_CLIENT_SECRET").map_err(|_| "IRISLINK_CLIENT_SECRET is not set")?;
    let token_file = env::var_os("IRISLINK_TOKEN_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("irislink-call-monitor-tokens.json"));
    Ok(Settings {
        client_id,
        client_secret,
        token_file,
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn describe(snapshot: &CallSnapshot) -> String {
    let indicators = match (snapshot.settings.muted, snapshot.settings.deafened) {
        (_, true) => " [deafened]",
        (true, false) => " [muted]",
        _ => "",
    };
    let body = match &snapshot.mode {
        CallMode::Idle => match snapshot.last_ring_outcome {
            Some(outcome) => format!("idle (last call: {outcome:?})"),
            None => "idle".to_string(),
        },
        CallMode::Ringing(call) => format!("ringing: {} ({})", call.caller.title, call.caller.body),
        CallMode::InCall(channel) => {
            let people: Vec<String> = channel
                .users
                .values()
                .map(|u| {
                    let talking = if u.speaking { "*" } else { "" };
                    let muted = if u.muted || u.self_muted { " (muted)" } else { "" };
                    format!("{talking}{}{muted}", u.nickname)
                })
                .collect();
            format!("in call {}: {}", channel.channel_id, people.join(", "))
        }
    };
    format!("{body}{indicators}")
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    irislink::logging::init("irislink=info,call_monitor=info");

    let settings = match settings_from_env() {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "call monitor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<(), IrisError> {
    let store = JsonFileCredentialStore::open(&settings.token_file)?;
    tracing::info!(token_file = %settings.token_file.display(), "looking for the chat client");

    let client = RpcClient::builder()
        .credentials(settings.client_id, settings.client_secret)
        .spawn(store)?;

    let outcome = client.wait_until_ready().await;
    if !outcome.success {
        tracing::error!(error = outcome.error.as_deref().unwrap_or("unknown"), "could not connect");
        return Ok(());
    }
    println!("{}", serde_json::to_string(&outcome).unwrap_or_default());

    let mut calls = client.call_state();
    println!("{}", describe(&calls.borrow()));

    loop {
        tokio::select! {
            changed = calls.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", describe(&calls.borrow_and_update()));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}
