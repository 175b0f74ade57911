//! Identity resolver
//!
//! Merges (name, email) aliases into canonical author identities. A new
//! pair sharing either the name or the email with an existing person
//! merges into it; a pair bridging two distinct persons unions them.
//! Implemented as a union-find with path compression, exposed only
//! through `resolve` and the read accessors, so merge cost stays
//! near-linear and no cyclic alias graphs exist.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::filters::ExclusionFilter;

/// Handle to a canonical author identity. Ids handed out before a merge
/// remain valid; readers canonicalize through the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PersonId(pub u32);

/// Alias data stored at union-find roots.
#[derive(Debug, Default, Clone)]
struct Slot {
    /// Display-cased names, insertion order preserved
    names: Vec<String>,
    /// Non-empty emails, insertion order preserved
    emails: Vec<String>,
    excluded: bool,
}

/// Read-only view of a resolved person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonView {
    pub display_name: String,
    pub email: String,
    pub names: Vec<String>,
    pub emails: Vec<String>,
    pub excluded: bool,
}

/// Per-run registry of canonical author identities. Owned by one
/// repository-analysis run; merges are serialized by the pipeline
/// (single-writer discipline behind a lock).
pub struct PersonRegistry {
    parent: Vec<u32>,
    slots: Vec<Slot>,
    by_name: FxHashMap<String, u32>,
    by_email: FxHashMap<String, u32>,
    filter: Arc<ExclusionFilter>,
}

impl PersonRegistry {
    pub fn new(filter: Arc<ExclusionFilter>) -> Self {
        Self {
            parent: Vec::new(),
            slots: Vec::new(),
            by_name: FxHashMap::default(),
            by_email: FxHashMap::default(),
            filter,
        }
    }

    /// Resolve a (name, email) pair to a canonical person, creating or
    /// merging identities as needed. Normalization (trimming, case
    /// folding) is applied before comparison.
    pub fn resolve(&mut self, name: &str, email: &str) -> PersonId {
        let name = name.trim();
        let email = email.trim();
        let name_key = name.to_lowercase();
        let email_key = email.to_lowercase();

        if name.is_empty() {
            if !email.is_empty() {
                warn!(email, "commit has an email but no author name");
            }
            // All author-less commits share the single empty identity.
            return match self.by_name.get("") {
                Some(&id) => PersonId(self.find(id)),
                None => self.create("", ""),
            };
        }

        if email.is_empty() {
            return match self.by_name.get(&name_key) {
                Some(&id) => {
                    let root = self.find(id);
                    self.add_aliases(root, name, "");
                    PersonId(root)
                }
                None => self.create(name, ""),
            };
        }

        let by_name = self.by_name.get(&name_key).copied();
        let by_email = self.by_email.get(&email_key).copied();

        let root = match (by_name, by_email) {
            (Some(a), Some(b)) => {
                let ra = self.find(a);
                let rb = self.find(b);
                if ra == rb {
                    ra
                } else {
                    self.union(ra, rb)
                }
            }
            (Some(a), None) => {
                let root = self.find(a);
                self.by_email.insert(email_key, root);
                root
            }
            (None, Some(b)) => {
                let root = self.find(b);
                self.by_name.insert(name_key, root);
                root
            }
            (None, None) => return self.create(name, email),
        };

        self.add_aliases(root, name, email);
        PersonId(root)
    }

    /// Whether the person matches a configured name/email exclusion.
    /// Excluded persons remain addressable; the aggregator omits them
    /// from percentage denominators only.
    pub fn is_excluded(&self, id: PersonId) -> bool {
        self.slots[self.find_readonly(id.0) as usize].excluded
    }

    /// Canonical id after any merges.
    pub fn canonical(&self, id: PersonId) -> PersonId {
        PersonId(self.find_readonly(id.0))
    }

    /// Snapshot view of a person.
    pub fn view(&self, id: PersonId) -> PersonView {
        let slot = &self.slots[self.find_readonly(id.0) as usize];
        let display_name = preferred_name(&slot.names);
        let email = preferred_email(&slot.emails, &display_name);
        PersonView {
            display_name,
            email,
            names: slot.names.clone(),
            emails: slot.emails.clone(),
            excluded: slot.excluded,
        }
    }

    /// All canonical persons, sorted by display name for deterministic
    /// output.
    pub fn persons(&self) -> Vec<(PersonId, PersonView)> {
        let mut out: Vec<(PersonId, PersonView)> = (0..self.parent.len() as u32)
            .filter(|&i| self.find_readonly(i) == i)
            .map(|i| (PersonId(i), self.view(PersonId(i))))
            .collect();
        out.sort_by(|a, b| a.1.display_name.cmp(&b.1.display_name));
        out
    }

    /// Count of canonical persons that are not excluded.
    pub fn included_count(&self) -> usize {
        (0..self.parent.len() as u32)
            .filter(|&i| self.find_readonly(i) == i && !self.slots[i as usize].excluded)
            .count()
    }

    fn create(&mut self, name: &str, email: &str) -> PersonId {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        let mut slot = Slot::default();
        self.slots.push(slot.clone());
        self.fill_alias(&mut slot, name, email);
        self.slots[id as usize] = slot;
        self.by_name.insert(name.to_lowercase(), id);
        if !email.is_empty() {
            self.by_email.insert(email.to_lowercase(), id);
        }
        PersonId(id)
    }

    fn add_aliases(&mut self, root: u32, name: &str, email: &str) {
        let mut slot = std::mem::take(&mut self.slots[root as usize]);
        self.fill_alias(&mut slot, name, email);
        self.slots[root as usize] = slot;
    }

    fn fill_alias(&self, slot: &mut Slot, name: &str, email: &str) {
        if !name.is_empty() || slot.names.is_empty() {
            if !slot.names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                slot.names.push(name.to_string());
                slot.excluded = slot.excluded || self.filter.authors.is_match(name);
            }
        }
        if !email.is_empty() && !slot.emails.iter().any(|e| e.eq_ignore_ascii_case(email)) {
            slot.emails.push(email.to_string());
            slot.excluded = slot.excluded || self.filter.emails.is_match(email);
        }
    }

    /// Union two roots; alias sets and the excluded flag merge into the
    /// surviving root.
    fn union(&mut self, a: u32, b: u32) -> u32 {
        debug_assert!(self.parent[a as usize] == a && self.parent[b as usize] == b);
        let (keep, drop) = if a <= b { (a, b) } else { (b, a) };
        self.parent[drop as usize] = keep;
        let dropped = std::mem::take(&mut self.slots[drop as usize]);
        let mut slot = std::mem::take(&mut self.slots[keep as usize]);
        for name in dropped.names {
            if !slot.names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                slot.names.push(name);
            }
        }
        for email in dropped.emails {
            if !slot.emails.iter().any(|e| e.eq_ignore_ascii_case(&email)) {
                slot.emails.push(email);
            }
        }
        slot.excluded = slot.excluded || dropped.excluded;
        self.slots[keep as usize] = slot;
        keep
    }

    /// Find with path compression.
    fn find(&mut self, mut id: u32) -> u32 {
        let mut root = id;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        while self.parent[id as usize] != root {
            let next = self.parent[id as usize];
            self.parent[id as usize] = root;
            id = next;
        }
        root
    }

    fn find_readonly(&self, mut id: u32) -> u32 {
        while self.parent[id as usize] != id {
            id = self.parent[id as usize];
        }
        id
    }
}

/// Pick the best display name: names with a space and only
/// alphanumeric/space characters first, then any name with a space,
/// then the rest; shortest wins within a tier.
fn preferred_name(names: &[String]) -> String {
    let tier = |name: &str| -> u8 {
        if name.contains(' ') {
            if name.chars().all(|c| c.is_alphanumeric() || c == ' ') {
                0
            } else {
                1
            }
        } else {
            2
        }
    };
    names
        .iter()
        .min_by_key(|n| (tier(n), n.len(), n.as_str().to_string()))
        .cloned()
        .unwrap_or_default()
}

/// Prefer the shortest email that contains a fragment (>= 3 chars) of
/// the display name, else the shortest email.
fn preferred_email(emails: &[String], display_name: &str) -> String {
    if emails.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = display_name
        .split_whitespace()
        .filter(|p| p.len() >= 3)
        .map(|p| p.to_lowercase())
        .collect();
    let mut sorted: Vec<&String> = emails.iter().collect();
    sorted.sort_by_key(|e| (e.len(), e.as_str().to_string()));
    sorted
        .iter()
        .find(|e| {
            let lower = e.to_lowercase();
            parts.iter().any(|p| lower.contains(p.as_str()))
        })
        .or(sorted.first())
        .map(|e| e.to_string())
        .unwrap_or_default()
}
