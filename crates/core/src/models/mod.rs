pub mod dataset;
pub mod matrix;
pub mod optimization;
pub mod price;
pub mod settings;
pub mod statistics;
