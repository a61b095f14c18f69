/// The drawable surface could not produce a rendering context.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("failed to create surface: {0}")]
    CreateSurface(String),
    #[error("no compatible graphics adapter")]
    NoAdapter,
    #[error("failed to request device: {0}")]
    RequestDevice(String),
    #[error("surface reported an empty size ({width}x{height})")]
    EmptySize { width: u32, height: u32 },
    #[error("no surface is bound")]
    NotConfigured,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("board has {actual} cells, mesh has {expected} faces")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("face {index} out of range (mesh has {count} faces)")]
    FaceOutOfRange { index: usize, count: usize },
}

/// Failures inside a render backend. Never fatal to the frame loop.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("surface frame unavailable: {0}")]
    Frame(#[from] wgpu::SurfaceError),
    #[error("unknown resource handle {0}")]
    UnknownResource(u64),
    #[error("resource {id} is a {actual:?}, expected {expected:?}")]
    WrongResourceKind {
        id: u64,
        expected: crate::render::backend::ResourceKind,
        actual: crate::render::backend::ResourceKind,
    },
    #[error("buffer write of {len} bytes exceeds capacity {capacity}")]
    BufferOverflow { len: usize, capacity: usize },
}

/// The camera's up vector collapsed onto its view axis. Recovered inside the
/// orientation step and never returned to callers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("camera up is parallel to its position")]
pub struct DegenerateOrientation;
