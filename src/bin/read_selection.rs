//! read-selection: send text to the read-aloud service.
//!
//! Reads the text from `--text` or stdin and posts it to `/read`. Meant to be
//! bound to a desktop shortcut, e.g. `xclip -o | read-selection`, so it exits
//! quietly when the service isn't running.

use std::io::Read;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "read-selection", about = "Read text aloud via the read-aloud service")]
struct Args {
    /// Text to read (stdin when omitted)
    #[arg(short, long)]
    text: Option<String>,

    /// Language of the text, e.g. en-US
    #[arg(short, long)]
    lang: Option<String>,

    /// Service port
    #[arg(short, long, default_value_t = 8768)]
    port: u16,

    /// Stop current playback instead of reading
    #[arg(long)]
    stop: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadRequest {
    selection_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lang: Option<String>,
}

#[derive(Deserialize)]
struct SimpleResponse {
    status: String,
    error: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let api = format!("http://127.0.0.1:{}", args.port);

    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new());

    // Exit cleanly if the service is down
    if client.get(format!("{api}/status")).send().await.is_err() {
        return;
    }

    if args.stop {
        let _ = client.post(format!("{api}/stop")).send().await;
        return;
    }

    let text = match args.text {
        Some(text) => text,
        None => {
            let mut input = String::new();
            if std::io::stdin().read_to_string(&mut input).is_err() {
                return;
            }
            input
        }
    };
    if text.trim().is_empty() {
        return;
    }

    let Ok(resp) = client
        .post(format!("{api}/read"))
        .json(&ReadRequest {
            selection_text: text,
            lang: args.lang,
        })
        .send()
        .await
    else {
        return;
    };

    if let Ok(body) = resp.json::<SimpleResponse>().await {
        if body.status == "error" {
            eprintln!("read-aloud: {}", body.error.unwrap_or_default());
            std::process::exit(1);
        }
    }
}
