// AssetLens - platform/mod.rs
//
// Platform abstraction layer: directory resolution, config.toml, file stats.
// Dependencies: standard library, directories crate, core::model value types.
// Must NOT depend on: app.

pub mod config;
pub mod fs;
