// AssetLens - lib.rs
//
// Library entry point. An embedding browser drives `app::pipeline::Pipeline`;
// the `assetlens` binary is a thin command-line front end over the same API.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
