//! Model backend implementations for ssalmuk.
//!
//! All providers implement the `ssalmuk_core::Provider` trait.
//! [`from_config`] builds the configured backend for a resolved credential.

pub mod gemini;

pub use gemini::GeminiProvider;

use std::sync::Arc;

use ssalmuk_config::AppConfig;
use ssalmuk_core::Provider;

/// Build the backend for `api_key`, honouring the configured base URL.
pub fn from_config(config: &AppConfig, api_key: &str) -> Arc<dyn Provider> {
    let mut provider = GeminiProvider::new(api_key);
    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.as_str());
    }
    Arc::new(provider)
}
