pub mod edges;
pub mod frame;
pub mod mask;
pub mod pixel;
