mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    daemon::{run_daemon_process, serve, start_daemon, stop_daemon},
    focus, watch,
};
use focusorb_core::config::{get_data_dir, OrbConfig};

#[derive(Parser)]
#[command(name = "focusorb")]
#[command(about = "Keeps distracting video and social pages in check", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the background daemon
    Start,
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart,
    /// Run the daemon in the foreground
    Serve,
    /// Stop the background daemon
    Stop,
    /// Show daemon status, settings and the current break
    Status,
    /// Take a break on a site
    Break {
        /// Minutes to add; extends a running break on the same site
        #[arg(default_value_t = 5.0)]
        minutes: f64,
        /// Site the break applies to
        #[arg(long, default_value = "youtube.com")]
        host: String,
        /// Why you are taking it
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// End the current break
    EndBreak,
    /// Set the topic you are focusing on (omit to clear)
    Focus {
        #[arg(default_value = "")]
        topic: String,
    },
    /// Ask the decision backend whether a page fits your focus
    Evaluate {
        url: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Why you are on the page
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Chat with the focus assistant
    Chat { message: String },
    /// Check that the decision backend is reachable
    Health,
    /// Simulate a page in the terminal with enforcement running
    Watch {
        url: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Start with playback paused
        #[arg(long)]
        paused: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::DaemonInternalStart) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    let data_dir = get_data_dir()?;
    let config = OrbConfig::load(&data_dir)?;

    match cli.command {
        Commands::Start => start_daemon(&data_dir),
        Commands::DaemonInternalStart => run_daemon_process().await,
        Commands::Serve => serve().await,
        Commands::Stop => stop_daemon(&data_dir).await,
        Commands::Status => focus::show_status(&data_dir, &config).await,
        Commands::Break {
            minutes,
            host,
            reason,
        } => focus::start_break(&data_dir, &config, &host, minutes, &reason).await,
        Commands::EndBreak => focus::end_break(&data_dir, &config).await,
        Commands::Focus { topic } => focus::set_focus(&data_dir, &config, &topic).await,
        Commands::Evaluate { url, title, reason } => {
            focus::evaluate(&data_dir, &config, &url, &title, &reason).await
        }
        Commands::Chat { message } => focus::chat(&data_dir, &config, &message).await,
        Commands::Health => focus::check_health(&config).await,
        Commands::Watch { url, title, paused } => {
            watch::watch_page(&config, &url, &title, paused).await
        }
    }
}
