pub mod commands;
pub mod descriptors;
pub mod foundation;
pub mod raytracing;
pub mod resources;
pub mod rhi;
pub mod swapchain;
