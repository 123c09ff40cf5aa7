use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tokio::io::BufReader;

mod auth;
mod command;
mod config;
mod console;
mod datetime;
mod logging;
mod report;
mod session;
mod session_command;
mod ticker;
mod time_entry;
mod timer;

use auth::AuthProvider;
use config::Config;
use console::{ConsolePresenter, ConsoleText};
use session_command::{SessionArgs, SessionCommand};

/// タスクごとの作業時間を計測するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- session
/// $ cargo run -- projects
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Logs in and tracks time interactively
    Session(SessionArgs),
    /// Lists projects and task types
    Projects,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    logging::init(config.level_filter()?)?;
    info!("Configuration loaded: {:?}", config);

    match args.subcommand {
        SubCommands::Session(session) => {
            if let Some(tick_ms) = session.tick_ms {
                config.tick_interval_ms = tick_ms;
            }
            if let Some(url) = session.auth_url {
                config.auth.url = Some(url);
            }

            let authenticator = AuthProvider::from_url(config.auth.url.as_deref());
            let command =
                SessionCommand::new(&authenticator, config.catalog(), config.tick_interval());
            let reader = BufReader::new(tokio::io::stdin());
            let mut writer = std::io::stdout();
            command
                .run(reader, &mut writer)
                .await
                .context("Session terminated with an error")?;
        }
        SubCommands::Projects => {
            let mut writer = std::io::stdout();
            let mut presenter = ConsoleText::new(&mut writer, config.catalog());
            presenter.show_projects()?;
        }
    }

    Ok(())
}
