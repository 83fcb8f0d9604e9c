use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "uniserve-probe")]
#[command(about = "Exercise a running uniserve demo server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the engine banner
    Banner,
    /// Send a body to /echo and print what comes back
    Echo {
        body: String,
        /// Send the body as JSON
        #[arg(long)]
        json: bool,
    },
    /// Join the chat, send one message, and print what others say
    Chat {
        #[arg(short, long, default_value = "probe")]
        name: String,
        message: String,
        /// Messages to wait for before leaving
        #[arg(long, default_value_t = 1)]
        wait: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Banner => {
            let res = client.get(format!("{}/", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Echo { body, json } => {
            let req = client.post(format!("{}/echo", base));
            let req = if json {
                let value: Value = serde_json::from_str(&body)?;
                req.json(&value)
            } else {
                req.body(body)
            };
            print_response(req.send().await?).await?;
        }
        Commands::Chat { name, message, wait } => {
            let ws_url = format!("{}/chat?name={}", base.replacen("http", "ws", 1), name);
            let (mut socket, _) = tokio_tungstenite::connect_async(ws_url.as_str()).await?;
            socket.send(Message::Text(message.into())).await?;

            let mut seen = 0;
            while seen < wait {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        println!("{}", text.as_str());
                        seen += 1;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        println!("<{} bytes>", bytes.len());
                        seen += 1;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            eprintln!("Closed by server: {} {}", u16::from(frame.code), frame.reason.as_str());
                        }
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                }
            }
            socket.close(None).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let is_json = res
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if is_json {
        let json: Value = res.json().await?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print!("{}", res.text().await?);
    }
    Ok(())
}
