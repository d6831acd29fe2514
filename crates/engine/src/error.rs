//! Unified error handling with Sentry integration.
//!
//! Cart operations themselves never fail because of persistence or sync
//! trouble; those are recorded and logged. [`CartError`] covers what a caller
//! genuinely has to handle: a missing stock ceiling for a new line, and
//! construction-time failures such as bad configuration or an unreachable
//! cart database.

use thiserror::Error;

use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::stock::StockError;

/// Error type for the cart engine's public API.
#[derive(Debug, Error)]
pub enum CartError {
    /// Stock lookup failed, so no ceiling could be established.
    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    /// Remote cart store failed.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Set the Sentry user context from the cart's identity.
///
/// Called when the cart becomes authenticated so errors are associated with
/// the shopper.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Called on logout to stop associating errors with the shopper.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for cart activity.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// operations leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", &[("product_id", "123")]);
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}
