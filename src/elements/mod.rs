pub mod partial_date;
pub mod element;
pub mod matching;
pub mod registry;

pub use partial_date::*;
pub use element::*;
pub use matching::*;
pub use registry::*;
