//! EventCore: narrative and screenplay preprocessing
//!
//! Turns prose or screenplay passages into dependency-annotated sentences
//! whose named entities and dates are replaced by placeholder tokens
//! (`<|PER_1|>`, `<|DATETIME_2|>`), resolved against a persistent registry of
//! story elements, canonically reordered and tagged with an event type.
//!
//! # Architecture
//!
//! ## Token graph (`markup`)
//! - `token.rs` - Token, renumbering, surface joining
//! - `block.rs` - Markup (one sentence) and MarkupBlock (one passage)
//! - `collapse.rs` - Span collapse: token run → single placeholder node
//! - `rearrange.rs` - Relation-priority pre-order reordering, cycle breaking
//! - `event_type.rs` - Dynamic/static evidence scoring
//!
//! ## Story elements (`elements`)
//! - `element.rs` - StoryElement and its merge
//! - `matching.rs` - Pairwise merge predicate
//! - `registry.rs` - Kind-partitioned registry with staged commits
//! - `partial_date.rs` - PartialDateTime with offset masking
//!
//! ## Extraction stages (`extraction`)
//! - `annotators.rs` - Segmenter/tagger/parser/NER/date traits and adapters
//! - `cleanup.rs`, `special_tokens.rs`, `date.rs`, `entity.rs`,
//!   `properties.rs`, `direct_speech.rs`
//!
//! ## Orchestration (`pipeline`)
//! - `preprocessor.rs` - EventPreprocessor: one passage → StoryEvent
//! - `paragraphs.rs`, `ledger.rs`, `batch.rs` - document batches
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { PreprocessCortex } from 'eventcore';
//!
//! await init();
//!
//! const cortex = new PreprocessCortex('literary_prose');
//!
//! // Annotations come from the host's tagger and parser
//! const event = cortex.process(0, "Анна Сергеевна сказала", {
//!   sentences: [{
//!     morph: [{ text: 'Анна', pos: 'PROPN' }, { text: 'Сергеевна', pos: 'PROPN' }, { text: 'сказала', pos: 'VERB' }],
//!     syntax: [
//!       { id: 1, head_id: 3, rel: 'nsubj', text: 'Анна' },
//!       { id: 2, head_id: 1, rel: 'flat:name', text: 'Сергеевна' },
//!       { id: 3, head_id: 0, rel: 'root', text: 'сказала' },
//!     ],
//!   }],
//! });
//!
//! console.log(event.text);            // "<|PER_1|> сказала"
//! console.log(cortex.storyElements()); // Анна Сергеевна, with aliases
//! ```

pub mod config;
pub mod elements;
pub mod error;
pub mod extraction;
pub mod markup;
pub mod pipeline;
pub mod wasm;

pub use config::*;
pub use error::{ErrorKind, PreprocessError, Result, StageWarning};
pub use pipeline::*;
pub use wasm::PreprocessCortex;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("eventcore v{}", env!("CARGO_PKG_VERSION"))
}
