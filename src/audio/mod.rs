pub mod buffer;
pub mod decode;
pub mod render;

pub use self::buffer::AudioBuffer;
