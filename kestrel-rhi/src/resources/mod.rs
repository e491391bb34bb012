pub mod buffer;
pub mod image;
pub mod render_pass;
pub mod sampler;
