pub mod torus;

pub use torus::{Quad, TorusMesh, TorusParams};
