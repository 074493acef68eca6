//! Registry: persistent, kind-partitioned store of story elements.
//!
//! The registry is an ordinary owned value. The preprocessor owns one and
//! hands out `&mut` access per passage; a batch run decides whether it is
//! reset between documents. Writes for one passage can be staged in a
//! [`RegistryTransaction`] and only land when the passage succeeds.
//!
//! # Batch insertion
//! Each extraction pass numbers its mentions locally (`<|PER_1|>`,
//! `<|PER_2|>`, ...). [`Repository::add_elements`] merges them into the
//! registry and renumbers them so that mentions resolving to the same
//! element share one index, with indices starting at 1 per batch.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};
use tracing::debug;
use uuid::Uuid;

use super::element::{ElementKind, StoryElement};
use super::matching::{should_merge, MatchStrictness};

/// Result of merging one batch of pass-local mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAssignment {
    /// Pass-local index → batch index.
    pub new_indexes: BTreeMap<usize, usize>,
    /// Batch index → registry id.
    pub ids: BTreeMap<usize, Uuid>,
}

// =============================================================================
// Repository
// =============================================================================

/// Elements of one kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    kind: ElementKind,
    strictness: MatchStrictness,
    elements: Vec<StoryElement>,
}

impl Repository {
    pub fn new(kind: ElementKind, strictness: MatchStrictness) -> Self {
        Self {
            kind,
            strictness,
            elements: Vec::new(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[StoryElement] {
        &self.elements
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Element whose name or alias is exactly `text`.
    pub fn find_by_text(&self, text: &str) -> Option<&StoryElement> {
        self.elements.iter().find(|e| e.is_known_as(text))
    }

    pub fn find_by_id(&self, id: &Uuid) -> Option<&StoryElement> {
        self.elements.iter().find(|e| e.id == *id)
    }

    pub fn find_by_id_mut(&mut self, id: &Uuid) -> Option<&mut StoryElement> {
        self.elements.iter_mut().find(|e| e.id == *id)
    }

    /// Case-insensitive substring search over names and aliases.
    pub fn search(&self, query: &str) -> Vec<&StoryElement> {
        let query = query.to_lowercase();
        self.elements
            .iter()
            .filter(|e| e.names().any(|n| n.to_lowercase().contains(&query)))
            .collect()
    }

    /// Merge into the first matching element, or append. Returns the id the
    /// mention resolved to.
    pub fn insert_or_update(&mut self, candidate: StoryElement) -> Uuid {
        let strictness = self.strictness;
        if let Some(existing) = self
            .elements
            .iter_mut()
            .find(|e| should_merge(e, &candidate, strictness))
        {
            *existing = existing.merged(&candidate);
            return existing.id;
        }
        let id = candidate.id;
        debug!(kind = self.kind.as_str(), name = %candidate.name, "new story element");
        self.elements.push(candidate);
        id
    }

    /// Merge a batch of pass-local mentions and assign batch indices.
    pub fn add_elements(&mut self, batch: BTreeMap<usize, StoryElement>) -> BatchAssignment {
        let mut assignment = BatchAssignment::default();
        let mut index_of: HashMap<Uuid, usize> = HashMap::new();
        for (local, element) in batch {
            let id = self.insert_or_update(element);
            let next = index_of.len() + 1;
            let final_idx = *index_of.entry(id).or_insert(next);
            assignment.new_indexes.insert(local, final_idx);
            assignment.ids.insert(final_idx, id);
        }
        assignment
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    people: Repository,
    locations: Repository,
    organizations: Repository,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(MatchStrictness::default())
    }
}

impl Registry {
    pub fn new(strictness: MatchStrictness) -> Self {
        Self {
            people: Repository::new(ElementKind::Person, strictness),
            locations: Repository::new(ElementKind::Location, strictness),
            organizations: Repository::new(ElementKind::Organization, strictness),
        }
    }

    pub fn repo(&self, kind: ElementKind) -> &Repository {
        match kind {
            ElementKind::Person => &self.people,
            ElementKind::Location => &self.locations,
            ElementKind::Organization => &self.organizations,
        }
    }

    pub fn repo_mut(&mut self, kind: ElementKind) -> &mut Repository {
        match kind {
            ElementKind::Person => &mut self.people,
            ElementKind::Location => &mut self.locations,
            ElementKind::Organization => &mut self.organizations,
        }
    }

    pub fn len(&self) -> usize {
        ElementKind::ALL.iter().map(|k| self.repo(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every element. Used between independent documents.
    pub fn reset(&mut self) {
        for kind in ElementKind::ALL {
            self.repo_mut(kind).clear();
        }
    }

    /// All elements, people first, then locations, then organizations.
    pub fn elements(&self) -> impl Iterator<Item = &StoryElement> {
        ElementKind::ALL
            .into_iter()
            .flat_map(move |k| self.repo(k).elements().iter())
    }

    /// Exact name/alias lookup across kinds in PER, LOC, ORG order.
    pub fn find_by_text(&self, text: &str) -> Option<&StoryElement> {
        ElementKind::ALL
            .iter()
            .find_map(|k| self.repo(*k).find_by_text(text))
    }

    pub fn find_by_id(&self, id: &Uuid) -> Option<&StoryElement> {
        ElementKind::ALL.iter().find_map(|k| self.repo(*k).find_by_id(id))
    }

    pub fn find_by_id_mut(&mut self, id: &Uuid) -> Option<&mut StoryElement> {
        let kind = ElementKind::ALL
            .into_iter()
            .find(|k| self.repo(*k).find_by_id(id).is_some())?;
        self.repo_mut(kind).find_by_id_mut(id)
    }

    pub fn search(&self, query: &str) -> Vec<&StoryElement> {
        ElementKind::ALL
            .iter()
            .flat_map(|k| self.repo(*k).search(query))
            .collect()
    }

    /// Stage writes against a working copy; they land on `commit`.
    pub fn stage(&mut self) -> RegistryTransaction<'_> {
        RegistryTransaction {
            working: self.clone(),
            target: self,
        }
    }
}

// =============================================================================
// Staging
// =============================================================================

/// Working copy of a registry. Dropping it without `commit` discards every
/// write made through it.
pub struct RegistryTransaction<'a> {
    target: &'a mut Registry,
    working: Registry,
}

impl RegistryTransaction<'_> {
    pub fn commit(self) {
        *self.target = self.working;
    }
}

impl Deref for RegistryTransaction<'_> {
    type Target = Registry;

    fn deref(&self) -> &Registry {
        &self.working
    }
}

impl DerefMut for RegistryTransaction<'_> {
    fn deref_mut(&mut self) -> &mut Registry {
        &mut self.working
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::ExtractionOrigin;

    fn person(name: &str) -> StoryElement {
        StoryElement::new(name, ElementKind::Person, ExtractionOrigin::Tagger)
    }

    #[test]
    fn test_merge_stability() {
        let mut registry = Registry::default();
        let a = person("Иван Петров");
        let a_id = a.id;
        let repo = registry.repo_mut(ElementKind::Person);
        assert_eq!(repo.insert_or_update(a), a_id);
        assert_eq!(repo.insert_or_update(person("Петров")), a_id);

        assert_eq!(repo.len(), 1);
        let stored = repo.find_by_id(&a_id).unwrap();
        assert_eq!(stored.name, "Иван Петров");
        assert!(stored.aliases.contains("Иван Петров"));
        assert!(stored.aliases.contains("Петров"));
    }

    #[test]
    fn test_add_elements_shares_batch_index() {
        let mut repo = Repository::new(ElementKind::Person, MatchStrictness::SharedWord);
        let mut batch = BTreeMap::new();
        batch.insert(1, person("Анна Сергеевна"));
        batch.insert(2, person("Борис"));
        batch.insert(3, person("Анна"));
        let assignment = repo.add_elements(batch);

        assert_eq!(assignment.new_indexes[&1], 1);
        assert_eq!(assignment.new_indexes[&2], 2);
        assert_eq!(assignment.new_indexes[&3], 1);
        assert_eq!(assignment.ids.len(), 2);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_batch_indices_restart_per_batch() {
        let mut repo = Repository::new(ElementKind::Person, MatchStrictness::SharedWord);
        let first = repo.add_elements(BTreeMap::from([(1, person("Анна")), (2, person("Борис"))]));
        let second = repo.add_elements(BTreeMap::from([(1, person("Борис"))]));
        assert_eq!(second.new_indexes[&1], 1);
        assert_eq!(second.ids[&1], first.ids[&2]);
    }

    #[test]
    fn test_find_by_text_kind_order() {
        let mut registry = Registry::default();
        registry
            .repo_mut(ElementKind::Location)
            .insert_or_update(StoryElement::new("Вера", ElementKind::Location, ExtractionOrigin::Manual));
        registry.repo_mut(ElementKind::Person).insert_or_update(person("Вера"));
        let found = registry.find_by_text("Вера").unwrap();
        assert_eq!(found.kind, ElementKind::Person);
        assert!(registry.find_by_text("вера").is_none());
        assert_eq!(registry.search("вер").len(), 2);
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let mut registry = Registry::default();
        {
            let mut tx = registry.stage();
            tx.repo_mut(ElementKind::Person).insert_or_update(person("Анна"));
            // dropped without commit
        }
        assert!(registry.is_empty());

        let mut tx = registry.stage();
        tx.repo_mut(ElementKind::Person).insert_or_update(person("Анна"));
        assert_eq!(tx.len(), 1);
        tx.commit();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reset_clears_all_kinds() {
        let mut registry = Registry::default();
        registry.repo_mut(ElementKind::Person).insert_or_update(person("Анна"));
        registry
            .repo_mut(ElementKind::Organization)
            .insert_or_update(StoryElement::new("МЧС", ElementKind::Organization, ExtractionOrigin::Tagger));
        assert_eq!(registry.len(), 2);
        registry.reset();
        assert!(registry.is_empty());
    }
}
