#![forbid(unsafe_code)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use moa_session::notify::TracingNotifier;
use moa_session::{logging, AppContext, Config, Field, Outcome, SessionState};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "moa-session")]
#[command(about = "Inspect and drive the MoA client session from a terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to ~/.moa-session/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the restored session and anonymous token
    Status,

    /// Sign in with email and password
    SignIn {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Create an account and sign in
    SignUp {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Sign out and forget the stored session
    SignOut,

    /// Print the anonymous device token, minting one if needed
    Token,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let filter = if cli.verbose {
        Some("moa_session=debug")
    } else {
        config.logging.filter.as_deref()
    };
    logging::init(filter);

    let (ctx, bootstrap) = AppContext::assemble(&config, Arc::new(TracingNotifier))?;
    let ready = bootstrap.run().await;

    match cli.command {
        Commands::Status => {
            print_state(&ready.session);
            match ready.anonymous_token {
                Some(token) => println!("anonymous token: {token}"),
                None => println!("anonymous token: (none)"),
            }
        }
        Commands::SignIn { email, password } => {
            let form = ctx.auth_form();
            let outcome = form.submit_sign_in(email, password).await?;
            report(&ctx, &form, outcome)?;
        }
        Commands::SignUp {
            username,
            email,
            password,
        } => {
            let form = ctx.auth_form();
            let outcome = form.submit_sign_up(username, email, password).await?;
            report(&ctx, &form, outcome)?;
        }
        Commands::SignOut => {
            ctx.sign_out().await;
            print_state(&ctx.session_state());
        }
        Commands::Token => match ready.anonymous_token {
            Some(token) => println!("{token}"),
            None => anyhow::bail!("Could not obtain an anonymous token"),
        },
    }

    Ok(())
}

fn report(ctx: &AppContext, form: &moa_session::AuthForm, outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Success(_) => {
            print_state(&ctx.session_state());
            Ok(())
        }
        Outcome::ValidationFailed(_) => {
            for field in Field::ALL {
                let message = form.field_error(field);
                if !message.is_empty() {
                    eprintln!("{field}: {message}");
                }
            }
            anyhow::bail!("Validation failed")
        }
        Outcome::InvalidCredentials => anyhow::bail!("Invalid email or password"),
        Outcome::TransportError(failure) => anyhow::bail!("Request failed: {failure}"),
    }
}

fn print_state(state: &SessionState) {
    match state.user() {
        Some(user) => println!("signed in as {} <{}>", user.username, user.email),
        None => println!("signed out"),
    }
}
