//! Cart inspection and mutation commands.
//!
//! Each invocation loads the device cart from `CART_STORE_PATH`, applies one
//! command, waits for pending remote syncs and prints the cart.

#![allow(clippy::print_stdout)]

use std::path::Path;

use cart_sync::{
    CachedStockOracle, CartEngine, CartError, ConfigError, EngineConfig, FileStore, FixedStockOracle,
    HttpStockOracle, MutationOutcome, PgRemoteStore, ProductRef, RemoteCartStore, RemoteError,
    StockError, StockOracle, VariantRef,
};
use cart_sync_core::{
    CartContext, CartSnapshot, CurrencyCode, LineKey, Price, ProductId, UserId, VariantId,
};
use rust_decimal::Decimal;
use tracing::warn;

pub type CliEngine = CartEngine<FileStore, CliRemote, CliStock>;

/// Remote cart store selected at startup.
pub enum CliRemote {
    Postgres(PgRemoteStore),
    /// Anonymous sessions never reach the remote store.
    Disabled,
}

impl RemoteCartStore for CliRemote {
    async fn fetch(&self, identity: UserId) -> Result<CartSnapshot, RemoteError> {
        match self {
            Self::Postgres(store) => store.fetch(identity).await,
            Self::Disabled => Err(RemoteError::Unavailable("no cart database".to_string())),
        }
    }

    async fn replace(&self, identity: UserId, snapshot: &CartSnapshot) -> Result<(), RemoteError> {
        match self {
            Self::Postgres(store) => store.replace(identity, snapshot).await,
            Self::Disabled => Err(RemoteError::Unavailable("no cart database".to_string())),
        }
    }
}

/// Stock oracle selected at startup.
pub enum CliStock {
    Http(CachedStockOracle<HttpStockOracle>),
    Fixed(FixedStockOracle),
    /// No stock source; new lines cannot be added.
    Unconfigured,
}

impl StockOracle for CliStock {
    async fn current_ceiling(&self, key: LineKey) -> Result<u32, StockError> {
        match self {
            Self::Http(oracle) => oracle.current_ceiling(key).await,
            Self::Fixed(oracle) => oracle.current_ceiling(key).await,
            Self::Unconfigured => Err(StockError::UnknownProduct(key)),
        }
    }
}

/// Build the engine from configuration.
///
/// # Errors
///
/// Fails if `user` is set without a cart database, the database is
/// unreachable, or the stock file cannot be read.
pub async fn open_engine(
    config: &EngineConfig,
    user: Option<UserId>,
    stock_file: Option<&Path>,
) -> cart_sync::Result<CliEngine> {
    let local = FileStore::new(config.store_path.clone());

    let remote = match (user, &config.database_url) {
        (None, _) => CliRemote::Disabled,
        (Some(_), Some(url)) => CliRemote::Postgres(PgRemoteStore::connect(url).await?),
        (Some(_), None) => {
            return Err(CartError::Config(ConfigError::MissingEnvVar(
                "CART_DATABASE_URL".to_string(),
            )));
        }
    };

    let stock = match stock_file {
        Some(path) => CliStock::Fixed(FixedStockOracle::from_yaml_file(path)?),
        None => match HttpStockOracle::from_config(&config.stock) {
            Some(http) => CliStock::Http(CachedStockOracle::from_config(http, &config.stock)),
            None => {
                warn!("No stock source configured (set STOCK_API_URL or --stock-file)");
                CliStock::Unconfigured
            }
        },
    };

    Ok(CartEngine::new(local, remote, stock))
}

/// Catalog data for `add`, as given on the command line.
pub struct NewItem {
    pub product: ProductId,
    pub variant: Option<VariantId>,
    pub name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub image: Option<String>,
}

pub async fn add(engine: &CliEngine, item: &NewItem, quantity: u32) -> cart_sync::Result<()> {
    let product = ProductRef {
        product_id: item.product,
        name: item.name.clone(),
        sku: item.sku.clone(),
        unit_price_base: Price::new(item.price, CurrencyCode::USD),
        unit_price_sale: item.sale_price.map(|p| Price::new(p, CurrencyCode::USD)),
        image: item.image.clone(),
    };
    let variant = item.variant.map(|variant_id| VariantRef {
        variant_id,
        name: item.variant_name.clone(),
    });

    let outcome = engine.add_item(&product, variant.as_ref(), quantity).await?;
    report(LineKey::new(item.product, item.variant), outcome);
    Ok(())
}

pub fn update(engine: &CliEngine, product: ProductId, variant: Option<VariantId>, quantity: i64) {
    let key = LineKey::new(product, variant);
    report(key, engine.update_quantity(key, quantity));
}

pub fn remove(engine: &CliEngine, product: ProductId, variant: Option<VariantId>) {
    let key = LineKey::new(product, variant);
    report(key, engine.remove_item(key));
}

pub fn clear(engine: &CliEngine) {
    if engine.clear_cart() {
        println!("Cart cleared");
    }
}

pub async fn refresh_stock(engine: &CliEngine) {
    let refresh = engine.refresh_stock().await;
    for key in &refresh.reclamped {
        println!("{key}: quantity lowered to current stock");
    }
    for key in &refresh.unavailable {
        println!("{key}: no longer available");
    }
    for key in &refresh.failed {
        println!("{key}: stock lookup failed");
    }
}

/// Sign out, letting the signed-in session's pushes land first.
pub async fn logout(engine: &CliEngine) {
    if engine.context().identity().is_some() {
        engine.flush().await;
        engine.handle_identity_change(None).await;
    } else {
        engine.reset();
    }
    println!("Signed out");
}

/// Wait for pending syncs, then print the cart.
pub async fn finish(engine: &CliEngine) {
    engine.flush().await;
    if let Some(error) = engine.sync_status().and_then(|status| status.last_error) {
        warn!(%error, "Cart changes were kept locally but not synced");
    }
    print_cart(engine);
}

fn report(key: LineKey, outcome: MutationOutcome) {
    match outcome {
        MutationOutcome::Updated {
            quantity,
            clamped: true,
        } => println!("{key}: only {quantity} available, quantity capped"),
        MutationOutcome::Updated { quantity, .. } => println!("{key}: quantity {quantity}"),
        MutationOutcome::Removed => println!("{key}: removed"),
        MutationOutcome::Unchanged => println!("{key}: not in cart"),
        MutationOutcome::Unavailable => println!("{key}: out of stock"),
    }
}

fn print_cart(engine: &CliEngine) {
    let snapshot = engine.snapshot();
    let owner = match engine.context() {
        CartContext::Anonymous => "guest".to_string(),
        CartContext::Authenticated(user) => format!("user {user}"),
    };

    println!();
    println!("Cart for {owner} (version {})", snapshot.version());
    if snapshot.is_empty() {
        println!("  (empty)");
    }
    for line in snapshot.lines() {
        let variant = line
            .variant_name
            .as_deref()
            .map(|name| format!(" ({name})"))
            .unwrap_or_default();
        let status = if line.is_available() {
            String::new()
        } else {
            " [unavailable]".to_string()
        };
        println!(
            "  {:<10} {}{variant} x{} @ {} = {}{status}",
            line.key().to_string(),
            line.name,
            line.quantity,
            line.unit_price(),
            line.line_total(),
        );
    }
    println!("Items: {}  Subtotal: {}", engine.item_count(), engine.subtotal());
    if engine.persistence_degraded() {
        println!("warning: cart could not be saved to disk");
    }
}
