pub mod distortion;

pub use self::distortion::*;
