//! The utterance graph — items, relations, and the utterance container.
//!
//! An utterance is a multi-view linguistic graph. Conceptual units (a word,
//! a syllable, a phone) are **content nodes** holding a [`FeatureSet`];
//! each relation that a unit participates in gets its own thin **item node**
//! carrying only position links. One phone can therefore be a member of the
//! flat `Segment` list and a leaf of the `SylStructure` tree at the same
//! time: two item nodes, one shared content node.
//!
//! Everything lives in arenas owned by the [`Utterance`] and is addressed by
//! copyable ids, so there are no reference cycles and no interior mutability.
//! Sibling order is a doubly linked list per relation; trees are layered on
//! top of it: a parent points at its first daughter, daughters are chained
//! through the same prev/next links, and only the first daughter holds the
//! back-pointer to the parent (parent lookup walks left to the chain head).
//!
//! A single thread owns an utterance while the pipeline runs; shared voice
//! features are a read-only snapshot taken at creation.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::audio::Waveform;
use crate::features::{FeatureSet, Value};

// Well-known relation names.
pub const TOKEN: &str = "Token";
pub const WORD: &str = "Word";
pub const PHRASE: &str = "Phrase";
pub const SYLLABLE: &str = "Syllable";
pub const SYLLABLE_STRUCTURE: &str = "SylStructure";
pub const SEGMENT: &str = "Segment";
pub const TARGET: &str = "Target";
pub const UNIT: &str = "Unit";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("relation `{0}` already exists")]
    DuplicateRelation(String),
    #[error("relation `{0}` is missing")]
    MissingRelation(String),
}

/// Handle to an item node (position of a content node within one relation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(u32);

/// Handle to a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationId(u32);

/// Handle to a shared content node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId(u32);

#[derive(Debug)]
struct Content {
    features: FeatureSet,
    /// Where this content appears, per relation. Re-registering in the same
    /// relation replaces the entry.
    views: HashMap<RelationId, ItemId>,
}

#[derive(Debug)]
struct ItemNode {
    relation: RelationId,
    content: ContentId,
    prev: Option<ItemId>,
    next: Option<ItemId>,
    /// Set only while this node is the first in its daughter chain.
    parent: Option<ItemId>,
    /// First daughter.
    daughter: Option<ItemId>,
}

#[derive(Debug)]
struct RelationData {
    name: String,
    head: Option<ItemId>,
    tail: Option<ItemId>,
}

/// One sentence's full annotation state during synthesis.
#[derive(Debug)]
pub struct Utterance {
    text: String,
    features: FeatureSet,
    voice_features: Arc<FeatureSet>,
    contents: Vec<Content>,
    nodes: Vec<ItemNode>,
    relations: Vec<RelationData>,
    by_name: HashMap<String, RelationId>,
    /// Synthesized audio, filled in by the concatenation stage.
    pub waveform: Option<Waveform>,
}

impl Utterance {
    pub fn new(text: &str, voice_features: Arc<FeatureSet>) -> Self {
        Utterance {
            text: text.to_string(),
            features: FeatureSet::new(),
            voice_features,
            contents: Vec::new(),
            nodes: Vec::new(),
            relations: Vec::new(),
            by_name: HashMap::new(),
            waveform: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    // ── Utterance-level features ────────────────────────────────────────────

    /// Utterance feature with fallback to the voice's feature snapshot.
    pub fn feature(&self, name: &str) -> Option<&Value> {
        self.features.get(name).or_else(|| self.voice_features.get(name))
    }

    pub fn feature_string(&self, name: &str) -> Option<&str> {
        self.feature(name).and_then(Value::as_str)
    }

    pub fn feature_float(&self, name: &str) -> Option<f32> {
        self.feature(name).and_then(Value::to_float)
    }

    /// The utterance's own features (writes never touch the voice snapshot).
    pub fn features_mut(&mut self) -> &mut FeatureSet {
        &mut self.features
    }

    pub fn own_features(&self) -> &FeatureSet {
        &self.features
    }

    // ── Relations ───────────────────────────────────────────────────────────

    /// Create a new, uniquely named relation.
    pub fn create_relation(&mut self, name: &str) -> Result<RelationId, GraphError> {
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateRelation(name.to_string()));
        }
        let id = RelationId(self.relations.len() as u32);
        self.relations.push(RelationData {
            name: name.to_string(),
            head: None,
            tail: None,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn relation(&self, name: &str) -> Option<RelationId> {
        self.by_name.get(name).copied()
    }

    /// Relation lookup that errors when absent — for stages that require
    /// an earlier stage's output.
    pub fn require_relation(&self, name: &str) -> Result<RelationId, GraphError> {
        self.relation(name)
            .ok_or_else(|| GraphError::MissingRelation(name.to_string()))
    }

    pub fn relation_name(&self, rel: RelationId) -> &str {
        &self.relations[rel.0 as usize].name
    }

    pub fn head(&self, rel: RelationId) -> Option<ItemId> {
        self.relations[rel.0 as usize].head
    }

    pub fn tail(&self, rel: RelationId) -> Option<ItemId> {
        self.relations[rel.0 as usize].tail
    }

    /// Iterate the relation's top-level sibling chain.
    pub fn items(&self, rel: RelationId) -> ItemIter<'_> {
        ItemIter {
            utt: self,
            cur: self.head(rel),
        }
    }

    // ── Node creation ───────────────────────────────────────────────────────

    fn new_content(&mut self) -> ContentId {
        let id = ContentId(self.contents.len() as u32);
        self.contents.push(Content {
            features: FeatureSet::new(),
            views: HashMap::new(),
        });
        id
    }

    fn new_node(&mut self, rel: RelationId, content: ContentId) -> ItemId {
        let id = ItemId(self.nodes.len() as u32);
        self.nodes.push(ItemNode {
            relation: rel,
            content,
            prev: None,
            next: None,
            parent: None,
            daughter: None,
        });
        self.contents[content.0 as usize].views.insert(rel, id);
        id
    }

    /// Append a fresh item at the end of a relation.
    pub fn append(&mut self, rel: RelationId) -> ItemId {
        let content = self.new_content();
        self.append_content(rel, content)
    }

    /// Append an item sharing another item's content (mirror it into `rel`).
    pub fn append_shared(&mut self, rel: RelationId, src: ItemId) -> ItemId {
        let content = self.nodes[src.0 as usize].content;
        self.append_content(rel, content)
    }

    fn append_content(&mut self, rel: RelationId, content: ContentId) -> ItemId {
        match self.tail(rel) {
            Some(tail) => self.insert_after_content(tail, content),
            None => {
                let id = self.new_node(rel, content);
                let data = &mut self.relations[rel.0 as usize];
                data.head = Some(id);
                data.tail = Some(id);
                id
            }
        }
    }

    /// Insert a fresh item immediately after `item` in its relation.
    pub fn insert_after(&mut self, item: ItemId) -> ItemId {
        let content = self.new_content();
        self.insert_after_content(item, content)
    }

    /// Insert an item sharing `src`'s content immediately after `item`.
    pub fn insert_after_shared(&mut self, item: ItemId, src: ItemId) -> ItemId {
        let content = self.nodes[src.0 as usize].content;
        self.insert_after_content(item, content)
    }

    fn insert_after_content(&mut self, item: ItemId, content: ContentId) -> ItemId {
        let rel = self.nodes[item.0 as usize].relation;
        let id = self.new_node(rel, content);
        let old_next = self.nodes[item.0 as usize].next;
        self.nodes[id.0 as usize].prev = Some(item);
        self.nodes[id.0 as usize].next = old_next;
        self.nodes[item.0 as usize].next = Some(id);
        if let Some(n) = old_next {
            self.nodes[n.0 as usize].prev = Some(id);
        }
        let data = &mut self.relations[rel.0 as usize];
        if data.tail == Some(item) {
            data.tail = Some(id);
        }
        id
    }

    /// Insert a fresh item immediately before `item` in its relation.
    pub fn insert_before(&mut self, item: ItemId) -> ItemId {
        let content = self.new_content();
        self.insert_before_content(item, content)
    }

    /// Insert an item sharing `src`'s content immediately before `item`.
    pub fn insert_before_shared(&mut self, item: ItemId, src: ItemId) -> ItemId {
        let content = self.nodes[src.0 as usize].content;
        self.insert_before_content(item, content)
    }

    fn insert_before_content(&mut self, item: ItemId, content: ContentId) -> ItemId {
        let rel = self.nodes[item.0 as usize].relation;
        let id = self.new_node(rel, content);
        let old_prev = self.nodes[item.0 as usize].prev;
        self.nodes[id.0 as usize].next = Some(item);
        self.nodes[id.0 as usize].prev = old_prev;
        self.nodes[item.0 as usize].prev = Some(id);
        if let Some(p) = old_prev {
            self.nodes[p.0 as usize].next = Some(id);
        }
        let data = &mut self.relations[rel.0 as usize];
        if data.head == Some(item) {
            data.head = Some(id);
        }
        // `item` was the first daughter: the new node takes over the chain
        // head and with it the parent back-pointer.
        if let Some(parent) = self.nodes[item.0 as usize].parent {
            self.nodes[parent.0 as usize].daughter = Some(id);
            self.nodes[id.0 as usize].parent = Some(parent);
            self.nodes[item.0 as usize].parent = None;
        }
        id
    }

    /// Attach `src`'s content as the last daughter of `parent`. The daughter
    /// node lives in `parent`'s relation; `src` stays where it is.
    pub fn add_daughter(&mut self, parent: ItemId, src: ItemId) -> ItemId {
        let content = self.nodes[src.0 as usize].content;
        self.add_daughter_content(parent, content)
    }

    /// Create a fresh content node as the last daughter of `parent`.
    pub fn create_daughter(&mut self, parent: ItemId) -> ItemId {
        let content = self.new_content();
        self.add_daughter_content(parent, content)
    }

    fn add_daughter_content(&mut self, parent: ItemId, content: ContentId) -> ItemId {
        match self.last_daughter(parent) {
            Some(last) => self.insert_after_content(last, content),
            None => {
                let rel = self.nodes[parent.0 as usize].relation;
                let id = self.new_node(rel, content);
                self.nodes[id.0 as usize].parent = Some(parent);
                self.nodes[parent.0 as usize].daughter = Some(id);
                id
            }
        }
    }

    // ── Traversal ───────────────────────────────────────────────────────────

    pub fn next(&self, item: ItemId) -> Option<ItemId> {
        self.nodes[item.0 as usize].next
    }

    pub fn prev(&self, item: ItemId) -> Option<ItemId> {
        self.nodes[item.0 as usize].prev
    }

    /// Parent of a daughter-chain member: walk left to the chain head,
    /// which holds the back-pointer.
    pub fn parent(&self, item: ItemId) -> Option<ItemId> {
        let mut cur = item;
        while let Some(p) = self.nodes[cur.0 as usize].prev {
            if self.nodes[cur.0 as usize].parent.is_some() {
                break;
            }
            cur = p;
        }
        self.nodes[cur.0 as usize].parent
    }

    pub fn first_daughter(&self, item: ItemId) -> Option<ItemId> {
        self.nodes[item.0 as usize].daughter
    }

    pub fn last_daughter(&self, item: ItemId) -> Option<ItemId> {
        let mut cur = self.first_daughter(item)?;
        while let Some(n) = self.nodes[cur.0 as usize].next {
            cur = n;
        }
        Some(cur)
    }

    /// Zero-based daughter access.
    pub fn nth_daughter(&self, item: ItemId, n: usize) -> Option<ItemId> {
        let mut cur = self.first_daughter(item)?;
        for _ in 0..n {
            cur = self.nodes[cur.0 as usize].next?;
        }
        Some(cur)
    }

    pub fn has_daughters(&self, item: ItemId) -> bool {
        self.nodes[item.0 as usize].daughter.is_some()
    }

    pub fn daughters(&self, item: ItemId) -> ItemIter<'_> {
        ItemIter {
            utt: self,
            cur: self.first_daughter(item),
        }
    }

    pub fn owner_relation(&self, item: ItemId) -> RelationId {
        self.nodes[item.0 as usize].relation
    }

    /// The node representing the same content in another relation.
    pub fn item_in(&self, item: ItemId, relation_name: &str) -> Option<ItemId> {
        let rel = self.relation(relation_name)?;
        let content = self.nodes[item.0 as usize].content;
        self.contents[content.0 as usize].views.get(&rel).copied()
    }

    /// Do two item nodes share one content node?
    pub fn same_content(&self, a: ItemId, b: ItemId) -> bool {
        self.nodes[a.0 as usize].content == self.nodes[b.0 as usize].content
    }

    // ── Item features ───────────────────────────────────────────────────────

    pub fn item_features(&self, item: ItemId) -> &FeatureSet {
        let content = self.nodes[item.0 as usize].content;
        &self.contents[content.0 as usize].features
    }

    pub fn item_features_mut(&mut self, item: ItemId) -> &mut FeatureSet {
        let content = self.nodes[item.0 as usize].content;
        &mut self.contents[content.0 as usize].features
    }

    /// The item's "name" feature.
    pub fn name(&self, item: ItemId) -> Option<&str> {
        self.item_features(item).string("name")
    }

    pub fn set_name(&mut self, item: ItemId, name: &str) {
        self.item_features_mut(item).set_string("name", name);
    }

    // ── Debug helpers ───────────────────────────────────────────────────────

    /// Names of the relation's top-level items, in order. Test/debug aid.
    pub fn item_names(&self, rel: RelationId) -> Vec<String> {
        self.items(rel)
            .map(|i| self.name(i).unwrap_or("?").to_string())
            .collect()
    }
}

/// Forward iterator over a sibling chain.
pub struct ItemIter<'a> {
    utt: &'a Utterance,
    cur: Option<ItemId>,
}

impl<'a> Iterator for ItemIter<'a> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        let cur = self.cur?;
        self.cur = self.utt.next(cur);
        Some(cur)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn utt() -> Utterance {
        Utterance::new("test", Arc::new(FeatureSet::new()))
    }

    #[test]
    fn test_create_relation_unique() {
        let mut u = utt();
        let r = u.create_relation("Word").unwrap();
        assert_eq!(u.relation("Word"), Some(r));
        assert_eq!(
            u.create_relation("Word"),
            Err(GraphError::DuplicateRelation("Word".into()))
        );
    }

    #[test]
    fn test_require_relation_missing() {
        let u = utt();
        assert_eq!(
            u.require_relation("Segment"),
            Err(GraphError::MissingRelation("Segment".into()))
        );
    }

    #[test]
    fn test_append_builds_ordered_chain() {
        let mut u = utt();
        let r = u.create_relation("Word").unwrap();
        for name in ["how", "now", "brown"] {
            let it = u.append(r);
            u.set_name(it, name);
        }
        assert_eq!(u.item_names(r), vec!["how", "now", "brown"]);

        let head = u.head(r).unwrap();
        let tail = u.tail(r).unwrap();
        assert_eq!(u.name(head), Some("how"));
        assert_eq!(u.name(tail), Some("brown"));
        assert_eq!(u.prev(head), None);
        assert_eq!(u.next(tail), None);
        assert_eq!(u.name(u.next(head).unwrap()), Some("now"));
    }

    #[test]
    fn test_insert_before_head_updates_head() {
        let mut u = utt();
        let r = u.create_relation("Segment").unwrap();
        let a = u.append(r);
        u.set_name(a, "ae");
        let pau = u.insert_before(a);
        u.set_name(pau, "pau");
        assert_eq!(u.item_names(r), vec!["pau", "ae"]);
        assert_eq!(u.head(r), Some(pau));
    }

    #[test]
    fn test_insert_after_tail_updates_tail() {
        let mut u = utt();
        let r = u.create_relation("Segment").unwrap();
        let a = u.append(r);
        let b = u.insert_after(a);
        assert_eq!(u.tail(r), Some(b));
        assert_eq!(u.next(a), Some(b));
        assert_eq!(u.prev(b), Some(a));
    }

    #[test]
    fn test_shared_content_across_relations() {
        let mut u = utt();
        let word = u.create_relation("Word").unwrap();
        let syl = u.create_relation("SylStructure").unwrap();

        let w = u.append(word);
        u.set_name(w, "now");
        let sw = u.append_shared(syl, w);

        // One content node, two views.
        assert!(u.same_content(w, sw));
        assert_eq!(u.name(sw), Some("now"));
        u.set_name(sw, "renamed");
        assert_eq!(u.name(w), Some("renamed"));

        assert_eq!(u.item_in(w, "SylStructure"), Some(sw));
        assert_eq!(u.item_in(sw, "Word"), Some(w));
        assert_eq!(u.item_in(w, "Phrase"), None);
    }

    #[test]
    fn test_daughters_and_parent() {
        let mut u = utt();
        let syl = u.create_relation("SylStructure").unwrap();
        let word = u.append(syl);
        u.set_name(word, "now");

        let d1 = u.create_daughter(word);
        u.set_name(d1, "n");
        let d2 = u.create_daughter(word);
        u.set_name(d2, "aw");

        assert!(u.has_daughters(word));
        assert_eq!(u.first_daughter(word), Some(d1));
        assert_eq!(u.last_daughter(word), Some(d2));
        assert_eq!(u.nth_daughter(word, 1), Some(d2));
        assert_eq!(u.nth_daughter(word, 2), None);
        assert_eq!(u.parent(d1), Some(word));
        // Parent lookup from a non-first daughter walks the chain.
        assert_eq!(u.parent(d2), Some(word));
        assert_eq!(u.daughters(word).count(), 2);
    }

    #[test]
    fn test_insert_before_first_daughter_moves_parent_link() {
        let mut u = utt();
        let syl = u.create_relation("SylStructure").unwrap();
        let word = u.append(syl);
        let d1 = u.create_daughter(word);
        u.set_name(d1, "s");

        let schwa = u.insert_before(d1);
        u.set_name(schwa, "ax");

        assert_eq!(u.first_daughter(word), Some(schwa));
        assert_eq!(u.parent(schwa), Some(word));
        assert_eq!(u.parent(d1), Some(word));
        assert_eq!(
            u.daughters(word)
                .map(|d| u.name(d).unwrap().to_string())
                .collect::<Vec<_>>(),
            vec!["ax", "s"]
        );
    }

    #[test]
    fn test_add_daughter_shares_content() {
        let mut u = utt();
        let word = u.create_relation("Word").unwrap();
        let phrase = u.create_relation("Phrase").unwrap();

        let w1 = u.append(word);
        u.set_name(w1, "hello");
        let p = u.append(phrase);
        u.set_name(p, "BB");
        let d = u.add_daughter(p, w1);

        assert!(u.same_content(w1, d));
        // The daughter node lives in the phrase relation.
        assert_eq!(u.owner_relation(d), phrase);
        // The word is still in its own relation's chain.
        assert_eq!(u.head(word), Some(w1));
        assert_eq!(u.parent(d), Some(p));
    }

    #[test]
    fn test_utterance_features_fall_back_to_voice() {
        let mut vf = FeatureSet::new();
        vf.set_float("pitch", 100.0);
        let mut u = Utterance::new("x", Arc::new(vf));

        assert_eq!(u.feature_float("pitch"), Some(100.0));
        u.features_mut().set_float("pitch", 140.0);
        assert_eq!(u.feature_float("pitch"), Some(140.0));
        assert_eq!(u.feature_string("nope"), None);
    }

    #[test]
    fn test_deep_tree_parent_chain() {
        // Word -> Syllable -> Segment, three levels.
        let mut u = utt();
        let syl = u.create_relation("SylStructure").unwrap();
        let word = u.append(syl);
        let s1 = u.create_daughter(word);
        let seg1 = u.create_daughter(s1);
        let seg2 = u.create_daughter(s1);

        assert_eq!(u.parent(seg2), Some(s1));
        assert_eq!(u.parent(s1), Some(word));
        assert_eq!(u.parent(word), None);
        assert_eq!(u.first_daughter(s1), Some(seg1));
    }
}
