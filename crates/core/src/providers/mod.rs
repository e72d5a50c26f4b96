pub mod memory;
pub mod registry;
pub mod traits;

// Price Store implementations
#[cfg(not(target_arch = "wasm32"))]
pub mod yahoo_finance;
