pub mod analysis;
pub mod engine;
pub mod oversampler;
pub mod source;

pub use analysis::{AnalysisTap, TapHandle};
pub use engine::{Engine, EngineHandle, EngineMessage};
pub use source::{AudioSource, BufferSource};
