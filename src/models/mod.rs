pub mod generation;
pub mod image;
pub mod result;

pub use self::generation::*;
pub use self::image::*;
pub use self::result::*;
