//! StoryElement: canonical record for a person, location or organization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::partial_date::PartialDateTime;

// =============================================================================
// Kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    #[serde(rename = "PER")]
    Person,
    #[serde(rename = "LOC")]
    Location,
    #[serde(rename = "ORG")]
    Organization,
}

impl ElementKind {
    /// Resolution order used when a bare word could name any kind.
    pub const ALL: [ElementKind; 3] = [
        ElementKind::Person,
        ElementKind::Location,
        ElementKind::Organization,
    ];

    /// Tag used in placeholders and tagger output (`PER`, `LOC`, `ORG`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Person => "PER",
            ElementKind::Location => "LOC",
            ElementKind::Organization => "ORG",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "PER" | "PERSON" => Some(ElementKind::Person),
            "LOC" | "LOCATION" => Some(ElementKind::Location),
            "ORG" | "ORGANIZATION" => Some(ElementKind::Organization),
            _ => None,
        }
    }
}

/// How an element entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionOrigin {
    Manual,
    #[default]
    Pattern,
    Tagger,
}

// =============================================================================
// StoryElement
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryElement {
    pub id: Uuid,
    pub name: String,
    pub kind: ElementKind,
    pub aliases: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<PartialDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_date: Option<PartialDateTime>,
    pub origin: ExtractionOrigin,
}

fn word_split(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split_whitespace().map(str::to_string)
}

fn merge_dates(a: &Option<PartialDateTime>, b: &Option<PartialDateTime>) -> Option<PartialDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.merge(b)),
        (Some(d), None) | (None, Some(d)) => Some(d.clone()),
        (None, None) => None,
    }
}

impl StoryElement {
    /// New element with a fresh id. Aliases start as the name's words.
    pub fn new(name: impl Into<String>, kind: ElementKind, origin: ExtractionOrigin) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            aliases: word_split(&name).collect(),
            name,
            kind,
            properties: Vec::new(),
            birth_date: None,
            last_date: None,
            origin,
        }
    }

    /// Canonical name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn is_known_as(&self, text: &str) -> bool {
        self.name == text || self.aliases.contains(text)
    }

    pub fn add_property(&mut self, property: impl Into<String>) {
        let property = property.into();
        if !property.is_empty() && !self.properties.contains(&property) {
            self.properties.push(property);
        }
    }

    /// Fold `other` into this element. Keeps this element's id, name, kind
    /// and origin.
    pub fn merged(&self, other: &StoryElement) -> StoryElement {
        let mut aliases = self.aliases.clone();
        aliases.extend(other.aliases.iter().cloned());
        aliases.insert(self.name.clone());
        aliases.insert(other.name.clone());
        aliases.extend(word_split(&self.name));
        aliases.extend(word_split(&other.name));

        let mut merged = StoryElement {
            aliases,
            birth_date: merge_dates(&self.birth_date, &other.birth_date),
            last_date: merge_dates(&self.last_date, &other.last_date),
            ..self.clone()
        };
        for property in &other.properties {
            merged.add_property(property.clone());
        }
        merged
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_name_into_aliases() {
        let el = StoryElement::new("Иван Петров", ElementKind::Person, ExtractionOrigin::Tagger);
        assert!(el.aliases.contains("Иван"));
        assert!(el.aliases.contains("Петров"));
        assert!(el.is_known_as("Иван Петров"));
        assert!(el.is_known_as("Петров"));
        assert!(!el.is_known_as("Пётр"));
    }

    #[test]
    fn test_merged_keeps_left_identity() {
        let mut a = StoryElement::new("Анна Сергеевна", ElementKind::Person, ExtractionOrigin::Pattern);
        a.add_property("строгая");
        let mut b = StoryElement::new("Анна", ElementKind::Person, ExtractionOrigin::Tagger);
        b.add_property("строгая");
        b.add_property("учительница");
        b.birth_date = Some(PartialDateTime::from_ymd(1980, 3, 1));

        let merged = a.merged(&b);
        assert_eq!(merged.id, a.id);
        assert_eq!(merged.name, "Анна Сергеевна");
        assert_eq!(merged.origin, ExtractionOrigin::Pattern);
        assert!(merged.aliases.contains("Анна Сергеевна"));
        assert!(merged.aliases.contains("Анна"));
        assert_eq!(merged.properties, vec!["строгая", "учительница"]);
        assert_eq!(merged.birth_date.unwrap().year, Some(1980));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ElementKind::from_tag("per"), Some(ElementKind::Person));
        assert_eq!(ElementKind::from_tag("LOC"), Some(ElementKind::Location));
        assert_eq!(ElementKind::from_tag("MISC"), None);
        assert_eq!(serde_json::to_string(&ElementKind::Organization).unwrap(), "\"ORG\"");
    }
}
