//! Petstore CLI - drive the storefront cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Browse as a guest
//! petstore cart add dog-bowl --name "Dog Bowl" --price 12.50 --quantity 2
//! petstore cart show
//!
//! # Sign in with a token issued by the storefront API
//! petstore login --user-id 64b0c1 --token "$TOKEN" --name "Alex"
//! petstore cart update dog-bowl 3
//! petstore checkout summary
//!
//! petstore logout
//! ```
//!
//! # Commands
//!
//! - `login` / `logout` - Manage the signed-in session of the profile
//! - `cart` - Show and change the cart of the current identity
//! - `checkout summary` - Price the signed-in cart
//!
//! Every invocation restores the session from the profile directory,
//! sources the cart for it and prints the resulting cart.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use petstore_storefront::config::StorefrontConfig;

mod commands;

use commands::{CartAction, CliError, Context};

#[derive(Parser)]
#[command(name = "petstore")]
#[command(author, version, about = "Petstore storefront cart")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a session issued by the storefront API
    Login {
        /// User id
        #[arg(long)]
        user_id: String,

        /// Bearer token
        #[arg(long)]
        token: String,

        /// Display name
        #[arg(long, default_value = "")]
        name: String,

        /// Email address
        #[arg(long)]
        email: Option<String>,

        /// Whether the user is an administrator
        #[arg(long)]
        admin: bool,
    },
    /// Forget the stored session
    Logout,
    /// Show or change the cart
    Cart {
        #[command(subcommand)]
        action: CartCommand,
    },
    /// Checkout pricing
    Checkout {
        #[command(subcommand)]
        action: CheckoutCommand,
    },
}

#[derive(Subcommand)]
enum CartCommand {
    /// Print the cart
    Show,
    /// Add units of a catalog item
    Add {
        /// Catalog item id
        item_id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Unit price
        #[arg(long)]
        price: Decimal,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Image URL
        #[arg(long)]
        image: Option<String>,

        /// Units in stock
        #[arg(long)]
        stock: Option<u32>,
    },
    /// Remove a line
    Remove {
        /// Catalog item id
        item_id: String,
    },
    /// Set the quantity of a line (zero or less removes it)
    Update {
        /// Catalog item id
        item_id: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove every line
    Clear,
}

#[derive(Subcommand)]
enum CheckoutCommand {
    /// Print the order summary
    Summary,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
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

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // No subscriber yet; stderr is the only channel.
            #[allow(clippy::print_stderr)]
            {
                eprintln!("petstore: {e}");
            }
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "petstore_storefront=info,petstore_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CliError> {
    let json = cli.json;

    match cli.command {
        Commands::Login {
            user_id,
            token,
            name,
            email,
            admin,
        } => {
            let session = commands::session::build(&user_id, &token, name, email.as_deref(), admin)?;
            let ctx = Context::open(&config)?;
            commands::session::login(&ctx, session).await?;
            commands::cart::print(&ctx.engine.snapshot().await, json)
        }
        Commands::Logout => {
            let ctx = Context::open(&config)?;
            commands::session::logout(&ctx).await?;
            commands::cart::print(&ctx.engine.snapshot().await, json)
        }
        Commands::Cart { action } => {
            let action = match action {
                CartCommand::Show => CartAction::Show,
                CartCommand::Add {
                    item_id,
                    name,
                    price,
                    quantity,
                    image,
                    stock,
                } => CartAction::Add {
                    item: commands::cart::catalog_item(&item_id, name, price, image, stock)?,
                    quantity,
                },
                CartCommand::Remove { item_id } => CartAction::Remove {
                    item_id: commands::cart::item_id(&item_id)?,
                },
                CartCommand::Update { item_id, quantity } => CartAction::Update {
                    item_id: commands::cart::item_id(&item_id)?,
                    quantity,
                },
                CartCommand::Clear => CartAction::Clear,
            };
            let ctx = Context::open(&config)?;
            ctx.attach().await?;
            commands::cart::run(&ctx, action).await?;
            commands::cart::print(&ctx.engine.snapshot().await, json)
        }
        Commands::Checkout {
            action: CheckoutCommand::Summary,
        } => {
            let ctx = Context::open(&config)?;
            ctx.attach().await?;
            commands::checkout::summary(&ctx, json).await
        }
    }
}
