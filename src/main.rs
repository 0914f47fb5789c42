use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use framesync_lib::{
    agent::AgentOptions,
    run_agent, run_server,
    settings::{debug_mode, SettingsStore},
    utils::logging,
    ServerConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "framesync",
    about = "Capture blurhash fingerprints of a video feed and sync them as recordings"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recording store and its HTTP API.
    Serve(ServeArgs),
    /// Sample frames and sync their fingerprints to a server.
    Capture(CaptureArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "FRAMESYNC_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// SQLite file holding the recordings.
    #[arg(long, env = "FRAMESYNC_DB", default_value = "framesync.sqlite3")]
    db: PathBuf,

    /// Directory served for any path the API does not handle.
    #[arg(long, env = "FRAMESYNC_PUBLIC_DIR")]
    public_dir: Option<PathBuf>,

    /// Directory with index.html, recordings.html and recording.html.
    #[arg(long, env = "FRAMESYNC_PAGES_DIR")]
    pages_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Base URL of the recording server.
    #[arg(long, env = "FRAMESYNC_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Directory of still images to replay as the feed.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Samples per second.
    #[arg(long)]
    fps: Option<f64>,

    /// Canvas size as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_canvas)]
    canvas: Option<(u32, u32)>,

    /// Write the decoded preview of each frame to this PNG file.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// JSON settings file.
    #[arg(long, env = "FRAMESYNC_SETTINGS")]
    settings: Option<PathBuf>,

    /// Write the effective settings back to the settings file.
    #[arg(long, requires = "settings")]
    save_settings: bool,

    /// Run without a background worker: every frame is written directly.
    #[arg(long)]
    no_worker: bool,

    /// Start a recording immediately.
    #[arg(long)]
    record: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn parse_canvas(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = width.trim().parse().map_err(|err| format!("bad width: {err}"))?;
    let height: u32 = height.trim().parse().map_err(|err| format!("bad height: {err}"))?;
    if width == 0 || height == 0 {
        return Err("canvas dimensions must be positive".into());
    }
    Ok((width, height))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            run_server(ServerConfig {
                bind: args.bind,
                db_path: args.db,
                public_dir: args.public_dir,
                pages_dir: args.pages_dir,
            })
            .await
        }
        Command::Capture(args) => capture(args).await,
    }
}

async fn capture(args: CaptureArgs) -> Result<()> {
    let store = SettingsStore::new(args.settings.clone()).context("failed to load settings")?;
    let mut settings = store.agent();

    if let Some(fps) = args.fps {
        settings.fps = fps;
    }
    if let Some((width, height)) = args.canvas {
        settings.canvas_width = width;
        settings.canvas_height = height;
    }
    if args.no_worker {
        settings.worker_enabled = false;
    }
    if args.save_settings {
        store.update_agent(settings.clone())?;
    }

    let mut options = AgentOptions::new(args.server);
    options.frames_dir = args.frames;
    options.preview_path = args.preview;
    options.record = args.record;
    options.debug = debug_mode();

    run_agent(settings, options, args.duration_secs.map(Duration::from_secs)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_parses_width_by_height() {
        assert_eq!(parse_canvas("300x150"), Ok((300, 150)));
        assert!(parse_canvas("300").is_err());
        assert!(parse_canvas("0x10").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
