//! Text cleanup: ordered regex substitutions from the genre profile.

use regex::Regex;

use crate::config::CleanupRule;
use crate::error::Result;

pub struct TextCleaner {
    rules: Vec<(Regex, String)>,
}

impl TextCleaner {
    pub fn new(rules: &[CleanupRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|r| Ok((Regex::new(&r.pattern)?, r.replacement.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn clean(&self, text: &str) -> String {
        let mut text = text.to_string();
        for (regex, replacement) in &self.rules {
            text = regex.replace_all(&text, replacement.as_str()).into_owned();
        }
        text.trim().to_string()
    }
}
