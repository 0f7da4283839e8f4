//! read-aloud-rs: reads selected text aloud through local, remote and
//! translation-service voices.

mod api;
mod auth;
mod config;
mod document;
mod engine;
mod error;
mod lang;
mod player;
mod settings;
mod supervisor;
mod text;
mod voice;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::google::GoogleTranslateTtsEngine;
use engine::local::LocalTtsEngine;
use engine::remote::RemoteTtsEngine;
use engine::Engines;
use player::{PlayerTiming, SpeechFactory};
use settings::Settings;
use supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "read-aloud-rs", about = "Read selected text aloud")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,reqwest=info,hyper=info")
    } else {
        EnvFilter::new("info,reqwest=warn,hyper=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("read-aloud-rs starting");

    let mut config = config::Config::load(args.config.as_deref());
    if let Some(port) = args.port {
        config.api.port = port;
    }
    info!("Config loaded: {:?}", config.playback);

    let settings = Arc::new(Settings::load(&config.settings_file()));

    let engines = Engines {
        local: Arc::new(LocalTtsEngine::new(
            &config.local,
            config.playback.voice_enumeration_timeout(),
        )),
        remote: Arc::new(RemoteTtsEngine::new(&config.service, settings.clone())?),
        google: Arc::new(GoogleTranslateTtsEngine::new(
            config.google_translate.clone(),
            settings.clone(),
        )?),
    };

    let factory = Arc::new(SpeechFactory::new(engines.clone(), settings.clone(), &config));
    let timing = PlayerTiming {
        rewind_window: config.playback.rewind_restart_window(),
        debounce: config.playback.debounce(),
        chunk_gap: config.playback.chunk_gap(),
    };
    let (supervisor, handle) = Supervisor::new(factory, settings.clone(), timing);

    api::start_api(api::ApiState {
        supervisor: handle,
        settings,
        engines,
        web_app_url: config.service.web_app_url.clone(),
        port: config.api.port,
    })
    .await;

    tokio::select! {
        () = supervisor.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
