pub mod preprocessor;
pub mod paragraphs;
pub mod ledger;
pub mod batch;

pub use preprocessor::*;
pub use paragraphs::*;
pub use ledger::*;
pub use batch::*;
