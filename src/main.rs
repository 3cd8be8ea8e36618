//! chatline: direct-messaging server binary.

use std::process::ExitCode;

use clap::Parser;

use chatline::identity::provision_user;
use chatline::server::config::{Cli, Command, Config};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(&cli);
    chatline::logging::init(&config.log_filter);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(e) = chatline::server::serve(config).await {
                tracing::error!("server error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        Command::AddUser {
            name,
            email,
            avatar,
            ttl_hours,
        } => {
            let db = match chatline::server::open_db(&config) {
                Ok(db) => db,
                Err(e) => {
                    eprintln!("failed to open database: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let ttl_millis = ttl_hours.map(|h| h * 60 * 60 * 1000);
            match provision_user(&db, &name, email.as_deref(), avatar.as_deref(), ttl_millis) {
                Ok((user_id, token)) => {
                    println!("user_id: {user_id}");
                    println!("token:   {token}");
                }
                Err(e) => {
                    eprintln!("failed to create user: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }
    ExitCode::SUCCESS
}
