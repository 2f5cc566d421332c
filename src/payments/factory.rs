//! `PaymentProviderFactory` (C3 supplemental): generalized from the
//! teacher's multi-provider factory, even though this crate's `AppConfig`
//! only ever registers `LencoProvider` — the spec names a single payout
//! provider, so call sites resolve the provider by name without caring how
//! many are configured.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::PaymentError;
use super::provider::PaymentProvider;

pub struct PaymentProviderFactory {
    providers: HashMap<&'static str, Arc<dyn PaymentProvider>>,
    default_provider: &'static str,
}

impl PaymentProviderFactory {
    pub fn new(default_provider: &'static str) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get_provider(&self, name: &str) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| PaymentError::NotConfigured(format!("payment provider {name}")))
    }

    pub fn default_provider(&self) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.get_provider(self.default_provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_provider_fails_with_not_configured() {
        let factory = PaymentProviderFactory::new("lenco");
        let err = factory.default_provider().unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured(_)));
    }
}
