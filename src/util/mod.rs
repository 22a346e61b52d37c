// AssetLens - util/mod.rs
//
// Utility modules: error types, named constants, logging setup.
// Only `error` reaches into core::model, for the Category it reports.

pub mod constants;
pub mod error;
pub mod logging;
