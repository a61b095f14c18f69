pub mod backend;
pub mod camera;
pub mod gpu;
pub mod headless;
pub mod mesh;
pub mod pipeline;
pub mod scene;
pub mod schedule;
