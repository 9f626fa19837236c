//! Minimal client for `engine-server`: issues one command over HTTP, or
//! opens a WebSocket and sends one line read from stdin per round.

use clap::{Parser, Subcommand};
use reactive_engine::protocol::Request;

#[derive(Parser)]
#[command(name = "engine-client")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    TableNames { database: String },
    CreateDatabase { database: String },
    Ws,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match args.command {
        Command::TableNames { database } => {
            let req = Request::TableNames { database };
            send_http(&args.url, &req).await;
        }
        Command::CreateDatabase { database } => {
            let req = Request::CreateDatabase { database };
            send_http(&args.url, &req).await;
        }
        Command::Ws => run_ws(&args.url).await,
    }
}

async fn send_http(base_url: &str, req: &Request) {
    let client = reqwest::Client::new();
    match client
        .post(format!("{base_url}/api/v1/command"))
        .json(req)
        .send()
        .await
    {
        Ok(resp) => match resp.text().await {
            Ok(body) => println!("{body}"),
            Err(e) => eprintln!("failed to read response body: {e}"),
        },
        Err(e) => eprintln!("request failed: {e}"),
    }
}

async fn run_ws(base_url: &str) {
    use futures_util::{SinkExt, StreamExt};
    let ws_url = base_url.replacen("http", "ws", 1) + "/ws";
    let (mut socket, _) = match tokio_tungstenite::connect_async(&ws_url).await {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to connect to {ws_url}: {e}");
            return;
        }
    };

    let req = Request::TableNames {
        database: "default".to_string(),
    };
    let payload = serde_json::to_string(&req).unwrap();
    if socket
        .send(tokio_tungstenite::tungstenite::Message::Text(payload))
        .await
        .is_err()
    {
        eprintln!("send failed");
        return;
    }
    if let Some(Ok(msg)) = socket.next().await {
        println!("{msg}");
    }
}
