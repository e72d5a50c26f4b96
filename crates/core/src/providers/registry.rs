#[cfg(not(target_arch = "wasm32"))]
use super::yahoo_finance::YahooPriceStore;
use super::traits::PriceStore;

/// Ordered list of Price Stores.
///
/// The first store is the primary; later ones are tried only when an
/// earlier one fails.
pub struct PriceStoreRegistry {
    stores: Vec<Box<dyn PriceStore>>,
}

impl PriceStoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { stores: Vec::new() }
    }

    /// Create a registry with all default stores pre-configured.
    pub fn new_with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        // Yahoo Finance — no API key needed.
        // Not available on WASM (uses native reqwest/tokio connectors)
        #[cfg(not(target_arch = "wasm32"))]
        {
            match YahooPriceStore::new() {
                Ok(yahoo) => registry.register(Box::new(yahoo)),
                Err(e) => tracing::warn!(error = %e, "Yahoo Finance store unavailable"),
            }
        }

        registry
    }

    /// Register a new store at the lowest priority.
    pub fn register(&mut self, store: Box<dyn PriceStore>) {
        self.stores.push(store);
    }

    /// All stores, in priority order.
    pub fn stores(&self) -> Vec<&dyn PriceStore> {
        self.stores.iter().map(|s| s.as_ref()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.stores.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl Default for PriceStoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
