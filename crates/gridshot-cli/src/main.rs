//! Gridshot - render snapshots on a remote rendering grid
//!
//! The `gridshot` command drives the client library from the shell.
//!
//! ## Commands
//!
//! - `render`: Submit a snapshot and wait for the rendered result
//! - `resolve`: Build the resource mapping for a snapshot without rendering
//! - `devices`: Print a renderer device catalog

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use gridshot_core::{
    CancelSignal, GridClient, GridConfig, Region, RenderSettings, RenderTargetKind,
    RendererSettings, Snapshot,
};

#[derive(Parser)]
#[command(name = "gridshot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for a remote multi-renderer visual-rendering grid", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Grid server URL
    #[arg(long, global = true, env = "GRIDSHOT_SERVER")]
    server: Option<String>,

    /// Grid API key
    #[arg(long, global = true, env = "GRIDSHOT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a snapshot for rendering and wait for the result
    Render {
        /// Path to the snapshot file (JSON)
        snapshot: PathBuf,

        /// Rendering engine name
        #[arg(long, default_value = "chrome")]
        renderer: String,

        /// Viewport width in pixels
        #[arg(long, default_value = "1024")]
        width: u32,

        /// Viewport height in pixels
        #[arg(long, default_value = "768")]
        height: u32,

        /// Device to emulate (see `gridshot devices`)
        #[arg(long)]
        device: Option<String>,

        /// Capture target: viewport, full-page, region, selector or
        /// full-selector
        #[arg(long, default_value = "viewport")]
        target: String,

        /// Capture region as `x,y,width,height` (for `--target region`)
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,

        /// CSS selector for selector-targeted captures
        #[arg(long)]
        selector: Option<String>,

        /// Selectors whose regions the grid reports back (repeatable)
        #[arg(long = "find")]
        selectors_to_find: Vec<String>,

        /// Give up on the render after this many seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Write the render result to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve a snapshot into its resource mapping without rendering
    Resolve {
        /// Path to the snapshot file (JSON)
        snapshot: PathBuf,

        /// Rendering engine name (drives fetch user agents)
        #[arg(long, default_value = "chrome")]
        renderer: String,
    },

    /// Print a renderer device catalog
    Devices {
        /// Catalog to print: chrome, ios or android
        platform: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gridshot_core::init_tracing(cli.json, level);

    let mut config = GridConfig::from_env();
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    if let Some(key) = &cli.api_key {
        config.api_key = key.clone();
    }

    match cli.command {
        Commands::Render {
            snapshot,
            renderer,
            width,
            height,
            device,
            target,
            region,
            selector,
            selectors_to_find,
            deadline,
            output,
        } => {
            if let Some(secs) = deadline {
                config = config.with_render_deadline(std::time::Duration::from_secs(secs));
            }
            let target = parse_target(&target)?;
            if target == RenderTargetKind::Region && region.is_none() {
                anyhow::bail!("--target region requires --region x,y,width,height");
            }
            let client = GridClient::new(config).context("Failed to build grid client")?;
            let settings = RenderSettings {
                renderer: RendererSettings {
                    name: renderer,
                    width,
                    height,
                    platform: None,
                    device,
                },
                target,
                region,
                selector,
                selectors_to_find,
                options: BTreeMap::new(),
            };
            cmd_render(&client, &snapshot, settings, output.as_deref()).await
        }
        Commands::Resolve { snapshot, renderer } => {
            let client = GridClient::new(config).context("Failed to build grid client")?;
            cmd_resolve(&client, &snapshot, &renderer).await
        }
        Commands::Devices { platform } => {
            let client = GridClient::new(config).context("Failed to build grid client")?;
            cmd_devices(&client, &platform).await
        }
    }
}

fn parse_target(name: &str) -> Result<RenderTargetKind> {
    match name {
        "viewport" => Ok(RenderTargetKind::Viewport),
        "full-page" => Ok(RenderTargetKind::FullPage),
        "region" => Ok(RenderTargetKind::Region),
        "selector" => Ok(RenderTargetKind::Selector),
        "full-selector" => Ok(RenderTargetKind::FullSelector),
        other => anyhow::bail!("Unknown render target: {}", other),
    }
}

fn parse_region(s: &str) -> std::result::Result<Region, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err("expected x,y,width,height".to_string());
    };
    Ok(Region {
        x: x.parse().map_err(|_| format!("invalid x: {x}"))?,
        y: y.parse().map_err(|_| format!("invalid y: {y}"))?,
        width: width.parse().map_err(|_| format!("invalid width: {width}"))?,
        height: height.parse().map_err(|_| format!("invalid height: {height}"))?,
    })
}

fn read_snapshot(path: &std::path::Path) -> Result<Snapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid snapshot JSON in {:?}", path))
}

/// Submit a snapshot and poll the render to completion. Ctrl-C aborts
/// the wait without tearing the process down mid-request.
async fn cmd_render(
    client: &GridClient,
    snapshot_path: &std::path::Path,
    settings: RenderSettings,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let snapshot = read_snapshot(snapshot_path)?;

    let cancel = CancelSignal::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, aborting render");
            ctrl_c.cancel();
        }
    });

    let result = client
        .render_snapshot(&snapshot, settings, cancel)
        .await
        .with_context(|| format!("Render failed for {}", snapshot.url))?;

    let json = serde_json::to_string_pretty(&result)?;
    if let Some(path) = output {
        std::fs::write(path, &json)
            .with_context(|| format!("Failed to write result to {:?}", path))?;
        println!("Render result written to {:?}", path);
    } else {
        println!("{}", json);
    }

    if let Some(location) = &result.image_location {
        println!("Image: {}", location);
    }

    Ok(())
}

/// Build the render target for a snapshot and print what would be
/// submitted: the document hash and the flattened resource mapping.
async fn cmd_resolve(
    client: &GridClient,
    snapshot_path: &std::path::Path,
    renderer: &str,
) -> Result<()> {
    let snapshot = read_snapshot(snapshot_path)?;

    let settings = RenderSettings {
        renderer: RendererSettings {
            name: renderer.to_string(),
            ..RendererSettings::default()
        },
        ..RenderSettings::default()
    };
    let target = client
        .build_render_target(&snapshot, &settings)
        .await
        .with_context(|| format!("Resolution failed for {}", snapshot.url))?;

    println!("Document: {}", target.document.hash);
    println!("Resources: {}", target.resources.len());
    println!("{}", serde_json::to_string_pretty(&target.resources)?);

    Ok(())
}

async fn cmd_devices(client: &GridClient, platform: &str) -> Result<()> {
    let catalog = match platform {
        "chrome" => client.chrome_emulation_devices().await,
        "ios" => client.ios_devices().await,
        "android" => client.android_devices().await,
        other => anyhow::bail!("Unknown device platform: {} (expected chrome, ios or android)", other),
    }
    .with_context(|| format!("Failed to fetch {} device catalog", platform))?;

    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_parse() {
        assert_eq!(parse_target("viewport").unwrap(), RenderTargetKind::Viewport);
        assert_eq!(parse_target("full-page").unwrap(), RenderTargetKind::FullPage);
        assert_eq!(
            parse_target("full-selector").unwrap(),
            RenderTargetKind::FullSelector
        );
        assert!(parse_target("screenshot").is_err());
    }

    #[test]
    fn region_flag_parses_a_rectangle() {
        assert_eq!(
            parse_region("10, 20, 300, 200").unwrap(),
            Region { x: 10, y: 20, width: 300, height: 200 }
        );
        assert!(parse_region("10,20,300").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }

    #[test]
    fn cli_parses_region_target() {
        let cli = Cli::parse_from([
            "gridshot",
            "render",
            "snapshot.json",
            "--target",
            "region",
            "--region",
            "0,0,800,600",
        ]);
        match cli.command {
            Commands::Render { target, region, .. } => {
                assert_eq!(target, "region");
                assert_eq!(region, Some(Region { x: 0, y: 0, width: 800, height: 600 }));
            }
            _ => panic!("expected render subcommand"),
        }
    }

    #[test]
    fn cli_parses_render_flags() {
        let cli = Cli::parse_from([
            "gridshot",
            "render",
            "snapshot.json",
            "--renderer",
            "firefox",
            "--width",
            "1280",
            "--find",
            "#header",
            "--find",
            "#footer",
        ]);
        match cli.command {
            Commands::Render {
                renderer,
                width,
                selectors_to_find,
                ..
            } => {
                assert_eq!(renderer, "firefox");
                assert_eq!(width, 1280);
                assert_eq!(selectors_to_find, vec!["#header", "#footer"]);
            }
            _ => panic!("expected render subcommand"),
        }
    }
}
