// AssetLens - core/mod.rs
//
// Core layer: the Record model, DataSets, the Cache Store and Discovery.
// Dependencies: util, plus filesystem-traversal crates used by Discovery.
// Must NOT depend on: app or platform.

pub mod cache;
pub mod dataset;
pub mod discovery;
pub mod model;
pub mod sequence;
