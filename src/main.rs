use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use obstools::{
    extract_tags, ConnectionEvent, ConnectionEventKind, Error, ObsCredentials, ObsTools,
    DEFAULT_ADDRESS,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::FmtSubscriber;

/// OBS Tools - command line interface for scene tooling over obs-websocket
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connection string in the format [ws://][:password@]host[:port]
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    address: String,

    /// Server password (overrides one given in the address)
    #[arg(short, long)]
    password: Option<String>,

    /// Seconds to wait for OBS to become ready
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay connected and log connection events until interrupted
    Watch,

    /// Print the tags embedded in a name (does not connect)
    Tags {
        /// Scene or source name
        name: String,
    },

    #[command(flatten)]
    Query(Query),
}

/// Commands that run once OBS is ready
#[derive(Subcommand)]
enum Query {
    /// List scenes and their items
    Scenes,

    /// List the games that have scenes
    Games,

    /// Show the active game
    ActiveGame,

    /// Show the sources of a game and hide all others
    SwitchGame {
        /// Game name, as used in [[Game:Name]] tags
        game: String,
    },

    /// Switch the program scene to a game scene
    SwitchScene {
        /// Scene code such as A1 or B2
        code: String,
    },

    /// Show or change debug mode
    Debug {
        /// New state; omit to show the current one
        #[arg(value_enum)]
        state: Option<Switch>,
    },

    /// List the audio inputs of a scene
    Audio {
        /// Scene uuid; defaults to the current program scene
        #[arg(long)]
        scene: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Configure logging
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Initialize the logging subscriber; `try_init` also forwards `log` records
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish()
        .try_init()
        .expect("Failed to set tracing subscriber");

    match cli.command {
        Commands::Tags { name } => {
            for line in tag_lines(&name) {
                println!("{}", line);
            }
        }
        Commands::Watch => {
            let tools = build_tools(&cli.address, cli.password)?;
            for kind in ConnectionEventKind::ALL {
                tools.on(kind, |event| tracing::info!("event: {:?}", event));
            }
            tools.connect().await;
            tokio::signal::ctrl_c().await?;
            tracing::info!("Received interrupt signal, exiting");
        }
        Commands::Query(query) => {
            let tools = build_tools(&cli.address, cli.password)?;
            wait_ready(&tools, Duration::from_secs(cli.timeout)).await?;
            run_query(&tools, query).await?;
        }
    }

    Ok(())
}

/// Build the tools from the connection string and password override
fn build_tools(address: &str, password: Option<String>) -> Result<ObsTools> {
    let mut credentials =
        ObsCredentials::parse(address).context("Failed to parse connection string")?;
    if password.is_some() {
        credentials.password = password;
    }
    Ok(ObsTools::new(credentials))
}

/// One `key[ = value]` line per tag in the name
fn tag_lines(name: &str) -> Vec<String> {
    extract_tags(name)
        .into_iter()
        .map(|tag| {
            format!(
                "{}{}",
                tag.key.unwrap_or_default(),
                tag.value.map(|v| format!(" = {}", v)).unwrap_or_default()
            )
        })
        .collect()
}

async fn run_query(tools: &ObsTools, query: Query) -> Result<()> {
    match query {
        Query::Scenes => {
            for scene in tools.scenes().get_collection_scenes_with_scene_items().await? {
                println!("{} ({})", scene.scene.scene_name, scene.scene.scene_uuid);
                for item in scene.scene_items {
                    let marker = if item.scene_item_enabled { "+" } else { "-" };
                    println!("  {} [{}] {}", marker, item.scene_item_id, item.source_name);
                }
            }
        }
        Query::Games => {
            for game in tools.games().get_games().await? {
                println!("{}", game);
            }
        }
        Query::ActiveGame => match tools.games().get_active_game().await? {
            Some(game) => println!("{}", game),
            None => println!("(none)"),
        },
        Query::SwitchGame { game } => {
            tools.games().switch_active_game(&game).await?;
            tracing::info!("Switched to game {}", game);
        }
        Query::SwitchScene { code } => {
            tools.games().switch_to_game_scene(&code).await?;
            tracing::info!("Switched to game scene {}", code.to_uppercase());
        }
        Query::Debug { state: None } => {
            let enabled = tools.debug().get_debug_mode().await?;
            println!("debug mode: {}", if enabled { "on" } else { "off" });
        }
        Query::Debug { state: Some(state) } => {
            tools.debug().set_debug_mode(matches!(state, Switch::On)).await?;
        }
        Query::Audio { scene } => {
            let inputs = match scene {
                Some(uuid) => tools.audio().get_scene_audio_inputs(&uuid).await?,
                None => tools.audio().get_current_scene_audio_inputs().await?,
            };
            for input in inputs {
                println!(
                    "{:<32} {:>7.1} dB  {}",
                    input.input.input_name,
                    input.volume.input_volume_db,
                    input.monitor_type.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

/// Connect and wait until OBS answers requests
async fn wait_ready(tools: &ObsTools, timeout: Duration) -> Result<()> {
    let (tx, rx) = oneshot::channel::<std::result::Result<(), String>>();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let ready_tx = Arc::clone(&tx);
    let ready = tools.on(ConnectionEventKind::Ready, move |_| {
        if let Some(tx) = ready_tx.lock().ok().and_then(|mut tx| tx.take()) {
            let _ = tx.send(Ok(()));
        }
    });

    // A missing address is never retried, so give up right away
    let failed_tx = Arc::clone(&tx);
    let failed = tools.on(ConnectionEventKind::ConnectionFailed, move |event| {
        if let ConnectionEvent::ConnectionFailed(err) = event {
            if let Error::Config(_) = err.as_ref() {
                if let Some(tx) = failed_tx.lock().ok().and_then(|mut tx| tx.take()) {
                    let _ = tx.send(Err(err.to_string()));
                }
            }
        }
    });

    tools.connect().await;
    let outcome = tokio::time::timeout(timeout, rx).await;
    tools.off(ConnectionEventKind::Ready, ready);
    tools.off(ConnectionEventKind::ConnectionFailed, failed);

    match outcome {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(reason))) => bail!("Connection failed: {}", reason),
        Ok(Err(_)) => bail!("Connection dropped before OBS became ready"),
        Err(_) => bail!("OBS did not become ready within {} seconds", timeout.as_secs()),
    }
}
