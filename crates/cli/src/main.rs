//! eshop CLI - the storefront from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! eshop products --query mug
//!
//! # Sign in (the token is kept under --data-dir for later commands)
//! eshop login -e ana@example.com --password ...
//! eshop whoami
//!
//! # Work with the cart
//! eshop cart add p1 --quantity 2
//! eshop cart update p1 3
//! eshop cart show
//!
//! # Pay
//! eshop checkout --card-number 4111111111111111 --holder-name "Ana Perez" --expiry 12/29 --cvv 123
//! ```
//!
//! # Commands
//!
//! - `products` - List the catalog
//! - `register`, `login`, `logout`, `whoami` - Account and session
//! - `cart show|add|update|remove|clear` - Cart
//! - `checkout` - Pay for the cart and print the confirmation

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{CliError, Context};

#[derive(Parser)]
#[command(name = "eshop")]
#[command(author, version, about = "eshop storefront from the terminal")]
struct Cli {
    /// Commerce backend origin
    #[arg(long, env = "ESHOP_API_URL")]
    api_url: String,

    /// Directory holding the persisted auth token
    #[arg(long, env = "STOREFRONT_DATA_DIR", default_value = ".eshop")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products
    Products {
        /// Only products whose name contains this text
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Create an account (does not sign in)
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short = 'n', long)]
        full_name: String,

        #[arg(long, env = "ESHOP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and persist the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(long, env = "ESHOP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the persisted session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Work with the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Pay for the cart
    Checkout {
        #[arg(long, env = "ESHOP_CARD_NUMBER", hide_env_values = true)]
        card_number: String,

        #[arg(long)]
        holder_name: String,

        /// Expiration date (MM/YY)
        #[arg(long)]
        expiry: String,

        #[arg(long, env = "ESHOP_CARD_CVV", hide_env_values = true)]
        cvv: String,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add a product
    Add {
        product_id: String,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity (at least 1)
    Update { product_id: String, quantity: u32 },
    /// Remove a line
    Remove { product_id: String },
    /// Empty the cart
    Clear,
}

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed arguments
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = Context::new(&cli.api_url, &cli.data_dir)?;

    match cli.command {
        Commands::Products { query } => {
            commands::catalog::list(&ctx, query.as_deref().unwrap_or_default()).await?;
        }
        Commands::Register {
            email,
            full_name,
            password,
        } => commands::account::register(&ctx, &email, &full_name, password).await?,
        Commands::Login { email, password } => {
            commands::account::login(&ctx, &email, password).await?;
        }
        Commands::Logout => commands::account::logout(&ctx),
        Commands::Whoami => commands::account::whoami(&ctx),
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx).await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&ctx, &product_id, quantity).await?,
            CartAction::Update {
                product_id,
                quantity,
            } => commands::cart::update(&ctx, &product_id, quantity).await?,
            CartAction::Remove { product_id } => commands::cart::remove(&ctx, &product_id).await?,
            CartAction::Clear => commands::cart::clear(&ctx).await?,
        },
        Commands::Checkout {
            card_number,
            holder_name,
            expiry,
            cvv,
        } => {
            commands::checkout::pay(&ctx, card_number, holder_name, expiry, cvv).await?;
        }
    }
    Ok(())
}
