//! Cart CLI - Drive the cart engine from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Show the device cart
//! cart-cli show
//!
//! # Add two units of product 42, variant 7
//! cart-cli add 42 --variant 7 --quantity 2 --name "Tee" --sku TEE-42 --price 25.00
//!
//! # Sign in as user 5 (merges with their remote cart) and show the result
//! cart-cli --user 5 show
//!
//! # Run remote cart store migrations
//! cart-cli migrate
//! ```
//!
//! # Commands
//!
//! - `show` - Print the cart
//! - `add`, `update`, `remove`, `clear` - Mutate the cart
//! - `refresh-stock` - Re-clamp every line to its current stock ceiling
//! - `logout` - Sign out and clear the device cart
//! - `migrate` - Run database migrations

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use cart_sync::EngineConfig;
use cart_sync_core::{ProductId, UserId, VariantId};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cart-cli")]
#[command(author, version, about = "Cart sync engine tools")]
struct Cli {
    /// Act as this signed-in user; their remote cart is merged in first
    #[arg(long, global = true)]
    user: Option<UserId>,

    /// YAML stock table to use instead of the stock service
    #[arg(long, global = true)]
    stock_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Cart(CartCommand),
    /// Run remote cart store migrations
    Migrate,
}

#[derive(Subcommand)]
enum CartCommand {
    /// Print the cart
    Show,
    /// Add units of a product or variant
    Add {
        product: ProductId,

        #[arg(long)]
        variant: Option<VariantId>,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Product display name
        #[arg(long)]
        name: String,

        #[arg(long)]
        variant_name: Option<String>,

        #[arg(long)]
        sku: String,

        /// Base unit price, e.g. `25.00`
        #[arg(long)]
        price: Decimal,

        #[arg(long)]
        sale_price: Option<Decimal>,

        #[arg(long)]
        image: Option<String>,
    },
    /// Set a line's quantity; zero or less removes it
    Update {
        product: ProductId,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,

        #[arg(long)]
        variant: Option<VariantId>,
    },
    /// Remove a line
    Remove {
        product: ProductId,

        #[arg(long)]
        variant: Option<VariantId>,
    },
    /// Remove every line
    Clear,
    /// Re-check stock for every line
    RefreshStock,
    /// Sign out and clear the device cart
    Logout,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &EngineConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Invalid configuration: {e}");
            }
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cart_sync=info,cart_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let command = match cli.command {
        Commands::Migrate => {
            commands::migrate::run(config).await?;
            return Ok(());
        }
        Commands::Cart(command) => command,
    };

    let engine = commands::cart::open_engine(config, cli.user, cli.stock_file.as_deref()).await?;
    engine.init();
    // Also runs for guests: a cart left by a signed-in run is not theirs.
    engine.handle_identity_change(cli.user).await;

    match command {
        CartCommand::Show => {}
        CartCommand::Add {
            product,
            variant,
            quantity,
            name,
            variant_name,
            sku,
            price,
            sale_price,
            image,
        } => {
            let item = commands::cart::NewItem {
                product,
                variant,
                name,
                variant_name,
                sku,
                price,
                sale_price,
                image,
            };
            commands::cart::add(&engine, &item, quantity).await?;
        }
        CartCommand::Update {
            product,
            quantity,
            variant,
        } => commands::cart::update(&engine, product, variant, quantity),
        CartCommand::Remove { product, variant } => {
            commands::cart::remove(&engine, product, variant);
        }
        CartCommand::Clear => commands::cart::clear(&engine),
        CartCommand::RefreshStock => commands::cart::refresh_stock(&engine).await,
        CartCommand::Logout => commands::cart::logout(&engine).await,
    }

    commands::cart::finish(&engine).await;
    Ok(())
}
