pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use cartwright_core::config::{AppConfig, LoadOptions, LogFormat};
use cartwright_core::ApplicationError;
use clap::{Parser, Subcommand};
use tracing::Level;

use crate::commands::quote::QuoteArgs;
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "cartwright",
    about = "Cartwright cart pricing and coupon engine",
    long_about = "Quote carts against coupon definitions, check coupon definitions, and inspect configuration.",
    after_help = "Examples:\n  cartwright quote --cart cart.json --coupons coupons.json\n  cartwright check-coupons --coupons drafts.json\n  cartwright config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Price a cart and apply coupons, printing the checkout quote as JSON")]
    Quote {
        #[arg(long, help = "Path to the cart snapshot JSON")]
        cart: PathBuf,
        #[arg(long, help = "Path to a JSON array of coupon definitions, in application order")]
        coupons: PathBuf,
        #[arg(long, help = "User id used for per-user usage limits")]
        user: Option<String>,
        #[arg(long, help = "Evaluation time as RFC 3339 (defaults to now)")]
        now: Option<String>,
        #[arg(long, help = "Path to prior usage counts keyed by coupon code")]
        usage: Option<PathBuf>,
        #[arg(long = "order-id", help = "Commit the applied coupons as this order")]
        order_id: Option<String>,
        #[arg(long = "auto-apply", help = "Only apply coupons flagged for automatic application")]
        auto_apply: bool,
    },
    #[command(about = "Validate coupon drafts against the creation-time contracts")]
    CheckCoupons {
        #[arg(long, help = "Path to a JSON array of coupon drafts")]
        coupons: PathBuf,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let error = ApplicationError::from(error).into_interface("startup");
            let result = CommandResult::interface_failure("startup", &error, 2);
            println!("{}", result.output);
            return ExitCode::from(result.exit_code);
        }
    };
    init_logging(&config);

    let result = match cli.command {
        Command::Quote { cart, coupons, user, now, usage, order_id, auto_apply } => {
            commands::quote::run(
                QuoteArgs { cart, coupons, user, now, usage, order_id, auto_apply },
                &config,
            )
        }
        Command::CheckCoupons { coupons } => commands::check_coupons::run(&coupons),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&config) },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
