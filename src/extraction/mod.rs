//! Extraction stages: cleanup, fixed phrases, dates, entities, properties
//! and direct speech. Each stage reads one snapshot and returns another.

pub mod annotators;
pub mod cleanup;
pub mod date;
pub mod direct_speech;
pub mod entity;
pub mod placeholder;
pub mod properties;
pub mod special_tokens;

pub use annotators::*;
pub use cleanup::*;
pub use date::*;
pub use direct_speech::*;
pub use entity::*;
pub use placeholder::*;
pub use special_tokens::*;
