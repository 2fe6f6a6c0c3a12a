pub mod convolver;
pub mod loader;
pub mod model;

pub use model::ImpulseResponse;
