//! Paragraph splitting for whole documents.
//!
//! Scene headings always start a new paragraph. Inside a scene, sentences
//! are packed greedily up to a word budget; a sentence longer than the
//! budget is cut into budget-sized word chunks.

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::PreprocessConfig;
use crate::error::Result;

pub struct ParagraphSplitter {
    scene_heading: Regex,
    max_words: usize,
}

impl ParagraphSplitter {
    pub fn new(scene_heading: &str, max_words: usize) -> Result<Self> {
        Ok(Self {
            scene_heading: Regex::new(scene_heading)?,
            max_words: max_words.max(1),
        })
    }

    pub fn from_config(config: &PreprocessConfig) -> Result<Self> {
        Self::new(&config.profile.scene_heading, config.max_paragraph_words)
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let mut cuts: Vec<usize> = std::iter::once(0)
            .chain(self.scene_heading.find_iter(text).map(|m| m.start()))
            .chain(std::iter::once(text.len()))
            .collect();
        cuts.dedup();

        let mut paragraphs = Vec::new();
        for bounds in cuts.windows(2) {
            let scene = text[bounds[0]..bounds[1]].trim();
            if !scene.is_empty() {
                self.pack(scene, &mut paragraphs);
            }
        }
        paragraphs
    }

    fn pack(&self, scene: &str, out: &mut Vec<String>) {
        let mut current: Vec<&str> = Vec::new();
        for sentence in scene.unicode_sentences() {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            if current.len() + words.len() > self.max_words {
                flush(&mut current, out);
                if words.len() > self.max_words {
                    out.extend(words.chunks(self.max_words).map(|chunk| chunk.join(" ")));
                    continue;
                }
            }
            current.extend(words);
        }
        flush(&mut current, out);
    }
}

fn flush(current: &mut Vec<&str>, out: &mut Vec<String>) {
    if !current.is_empty() {
        out.push(current.join(" "));
        current.clear();
    }
}
