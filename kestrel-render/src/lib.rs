pub mod accel_manager;
pub mod frame;
pub mod renderer;
pub mod resource_manager;
pub mod scene_interface;
pub mod shared_ctx;
pub mod upload;
