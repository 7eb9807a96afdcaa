//! voxcall binary: `serve` runs the credential proxy, `talk` runs the
//! interactive voice client.

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing::debug;

use voxcall::audio::capture::MicCapture;
use voxcall::audio::playback::{AudioSink, RodioSink};
use voxcall::{
    Config, ControllerConfig, CredentialBroker, SessionController, SessionEvent, proxy,
};

/// voxcall - talk to an LLM realtime voice endpoint
#[derive(Parser, Debug)]
#[command(name = "voxcall")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the credential-minting proxy
    Serve {
        /// Bind host (overrides VOXCALL_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides VOXCALL_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the interactive voice client
    Talk,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            proxy::serve(&config).await?;
        }
        Commands::Talk => talk(config).await?,
    }

    Ok(())
}

/// Wire the session controller to real audio hardware and drive it from
/// stdin: each Enter press is one toggle, ctrl-c quits.
async fn talk(config: Config) -> anyhow::Result<()> {
    let broker = CredentialBroker::new(&config);
    let capture_buffer = config.capture_buffer;
    let playback_rate = config.playback_sample_rate;

    let (controller, mut status_rx) = SessionController::new(
        broker,
        ControllerConfig::from(&config),
        Box::new(move |events| Box::new(MicCapture::new(capture_buffer, events))),
        Box::new(move || Ok(Box::new(RodioSink::open(playback_rate)?) as Box<dyn AudioSink>)),
    );
    let events = controller.handle();
    let controller_task = tokio::spawn(controller.run());

    // The status watch is the whole user interface.
    let status_task = tokio::spawn(async move {
        loop {
            println!("{}", *status_rx.borrow_and_update());
            if status_rx.changed().await.is_err() {
                break;
            }
        }
    });

    println!("Press Enter to start or stop a session; ctrl-c to quit.");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(_) => {
                    if events.send(SessionEvent::Toggle).is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    debug!("shutting down");
    let _ = events.send(SessionEvent::Shutdown);
    controller_task.await?;
    status_task.abort();
    Ok(())
}
