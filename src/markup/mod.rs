pub mod token;
pub mod block;
pub mod collapse;
pub mod rearrange;
pub mod event_type;

pub use token::*;
pub use block::*;
pub use collapse::*;
pub use rearrange::*;
pub use event_type::*;

#[cfg(test)]
mod tests;
