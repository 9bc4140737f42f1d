use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use rightsd::rights::document::render_document;
use rightsd::rights::loader::load_document;
use rightsd::rights::merge::merge;
use rightsd::rights::RightsEngine;
use rightsd::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "rightsd",
    version,
    about = "Layered authorization rights engine"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide whether a login may perform an action
    Check { login: String, action: String },
    /// List the actions listed for a login
    Actions { login: String },
    /// Print the merged configuration
    Show,
    /// Parse and validate a rights document without applying it
    Validate { file: PathBuf },
    /// Replace the administrator layer with the given document
    Apply { file: PathBuf },
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    let engine = || RightsEngine::from_settings(&settings);

    match cli.command {
        Command::Check { login, action } => {
            let allowed = engine()?.resolver.try_is_allowed(&login, &action)?;
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        Command::Actions { login } => {
            let engine = engine()?;
            let mode = engine.store.mode()?;
            let actions = engine.resolver.effective_actions(&login)?;
            println!("# {login} ({mode})");
            for action in actions.iter() {
                println!("{action}");
            }
        }
        Command::Show => {
            let auth = engine()?.store.current()?;
            print!("{}", render_document(&auth.to_document()));
        }
        Command::Validate { file } => {
            let document = load_document(&file)?;
            println!(
                "{}: ok ({}, {} profiles, {} userprofiles)",
                file.display(),
                document.mode,
                document.profiles.len(),
                document.user_profiles.len()
            );
        }
        Command::Apply { file } => {
            let layer = load_document(&file)?;
            let base = load_document(&settings.rights.default_path)?;
            let candidate = merge(base, Some(layer))?;
            engine()?.store.update(candidate)?;
            println!(
                "applied {} to {}",
                file.display(),
                settings.rights.override_path.display()
            );
        }
    }
    Ok(())
}
