//! PreprocessCortex: WASM facade over [`EventPreprocessor`].
//!
//! The host runs taggers and parsers itself and passes their output in as
//! precomputed annotations, one cross-boundary call per passage.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::{GenreProfile, PreprocessConfig};
use crate::extraction::{Annotators, PrecomputedAnnotations};
use crate::pipeline::{EventPreprocessor, ParagraphSplitter, StoryEvent};

fn to_js<T: Serialize>(value: &T) -> JsValue {
    match serde_wasm_bindgen::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            web_sys::console::error_1(&format!("[PreprocessCortex] Serialization failed: {:?}", e).into());
            JsValue::NULL
        }
    }
}

#[wasm_bindgen]
pub struct PreprocessCortex {
    preprocessor: EventPreprocessor,
    splitter: ParagraphSplitter,
}

#[wasm_bindgen]
impl PreprocessCortex {
    /// Build with a named genre profile: `literary_prose`,
    /// `hollywood_script` or `russian_script`.
    #[wasm_bindgen(constructor)]
    pub fn js_new(profile: &str) -> Result<PreprocessCortex, JsValue> {
        let profile = GenreProfile::by_name(profile).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Self::with_config(PreprocessConfig::with_profile(profile)).map_err(|e| JsValue::from_str(&e))
    }

    /// Build from a JSON `PreprocessConfig`; missing fields take defaults.
    #[wasm_bindgen(js_name = fromConfig)]
    pub fn js_from_config(json: &str) -> Result<PreprocessCortex, JsValue> {
        let config = PreprocessConfig::from_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Self::with_config(config).map_err(|e| JsValue::from_str(&e))
    }

    /// Process one passage.
    ///
    /// annotations: `{ sentences: [{ morph, syntax }], entities?, dates? }`
    #[wasm_bindgen(js_name = process)]
    pub fn js_process(&mut self, index: usize, text: &str, annotations: JsValue) -> Result<JsValue, JsValue> {
        let annotations: PrecomputedAnnotations = serde_wasm_bindgen::from_value(annotations)
            .map_err(|e| JsValue::from_str(&format!("Failed to parse annotations: {}", e)))?;
        let event = self.process(index, text, annotations).map_err(|e| JsValue::from_str(&e))?;
        Ok(to_js(&event))
    }

    /// Paragraphs of a whole document, ready for annotation.
    #[wasm_bindgen(js_name = splitParagraphs)]
    pub fn js_split_paragraphs(&self, text: &str) -> JsValue {
        to_js(&self.splitter.split(text))
    }

    #[wasm_bindgen(js_name = storyElements)]
    pub fn js_story_elements(&self) -> JsValue {
        to_js(&self.preprocessor.story_elements())
    }

    /// Case-insensitive search over element names and aliases.
    #[wasm_bindgen(js_name = search)]
    pub fn js_search(&self, query: &str) -> JsValue {
        let found: Vec<_> = self.preprocessor.registry().search(query).into_iter().cloned().collect();
        to_js(&found)
    }

    #[wasm_bindgen(js_name = elementCount)]
    pub fn element_count(&self) -> usize {
        self.preprocessor.registry().len()
    }

    /// Forget every story element.
    #[wasm_bindgen(js_name = reset)]
    pub fn js_reset(&mut self) {
        self.preprocessor.reset();
    }
}

impl PreprocessCortex {
    pub fn with_config(config: PreprocessConfig) -> Result<Self, String> {
        let splitter = ParagraphSplitter::from_config(&config).map_err(|e| e.to_string())?;
        let preprocessor = EventPreprocessor::new(config).map_err(|e| e.to_string())?;
        Ok(Self {
            preprocessor,
            splitter,
        })
    }

    pub fn process(
        &mut self,
        index: usize,
        text: &str,
        annotations: PrecomputedAnnotations,
    ) -> Result<StoryEvent, String> {
        self.preprocessor
            .process(index, text, &Annotators::precomputed(annotations))
            .map_err(|e| e.to_string())
    }

    pub fn preprocessor(&self) -> &EventPreprocessor {
        &self.preprocessor
    }
}

// =============================================================================
// Tests
// =============================================================================
