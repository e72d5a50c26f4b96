pub mod alignment_service;
pub mod metrics;
pub mod optimization_service;
pub mod price_service;
pub mod risk_service;
pub mod solver;
pub mod statistics_service;
