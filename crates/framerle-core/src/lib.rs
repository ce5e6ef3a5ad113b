pub mod config;
pub mod debug;
pub mod pipeline;
pub mod pool;
pub mod rle;
pub mod shutdown;
pub mod stages;
pub mod store;
pub mod transform;
pub mod video;

#[cfg(test)]
mod testing;
