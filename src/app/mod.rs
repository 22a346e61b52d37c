// AssetLens - app/mod.rs
//
// Application layer: category queues, workers, event bus, invalidation and
// the pipeline facade that ties them to the Cache Store.
// Dependencies: core, platform, util.

pub mod events;
pub mod interrupt;
pub mod pipeline;
pub mod processors;
pub mod queue;
pub mod sidecar;
pub mod worker;
