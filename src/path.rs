//! Feature-path expressions over the utterance graph.
//!
//! A path is a dot-separated list of steps evaluated relative to a start
//! item, e.g. `R:SylStructure.parent.parent.name`:
//!
//! * `p` / `prev` — previous sibling
//! * `n` / `next` — next sibling
//! * `parent` — tree parent
//! * `daughter` / `daughter1` — first daughter
//! * `daughter2` — second daughter
//! * `daughtern` — last daughter
//! * `R:Name` — the node carrying the same content in relation `Name`
//! * a trailing bare word — the feature to read at the final item
//!
//! Paths are compiled once (decision trees compile theirs at load time) and
//! replayed per item. Any step that walks off the graph makes the whole
//! lookup undefined: [`FeaturePath::find`] returns `None`, it never panics
//! and never reads from a stale node.

use anyhow::{bail, Result};

use crate::features::Value;
use crate::utterance::{ItemId, Utterance};

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Prev,
    Next,
    Parent,
    Daughter,
    Daughter2,
    DaughterN,
    Relation(String),
}

/// A compiled path expression ending in a feature read.
#[derive(Debug, Clone)]
pub struct FeaturePath {
    steps: Vec<Step>,
    feature: String,
    source: String,
}

impl FeaturePath {
    /// Compile a path string. The last component is the feature name; every
    /// earlier component must be a structural step.
    pub fn compile(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.is_empty() || path.trim().is_empty() {
            bail!("empty feature path");
        }
        let (feature, steps_src) = parts.split_last().unwrap();
        if feature.is_empty() {
            bail!("feature path `{}` ends in a dot", path);
        }
        let mut steps = Vec::with_capacity(steps_src.len());
        for part in steps_src {
            steps.push(parse_step(part, path)?);
        }
        // A structural keyword in feature position is almost certainly a
        // truncated path; reject it early rather than reading a feature
        // literally named "parent".
        if parse_step(feature, path).is_ok() {
            bail!("feature path `{}` ends in structural step `{}`", path, feature);
        }
        Ok(FeaturePath {
            steps,
            feature: feature.to_string(),
            source: path.to_string(),
        })
    }

    /// The original path string.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replay the structural steps, returning the item they land on.
    pub fn find_item(&self, utt: &Utterance, item: ItemId) -> Option<ItemId> {
        let mut cur = item;
        for step in &self.steps {
            cur = match step {
                Step::Prev => utt.prev(cur)?,
                Step::Next => utt.next(cur)?,
                Step::Parent => utt.parent(cur)?,
                Step::Daughter => utt.first_daughter(cur)?,
                Step::Daughter2 => utt.nth_daughter(cur, 1)?,
                Step::DaughterN => utt.last_daughter(cur)?,
                Step::Relation(name) => utt.item_in(cur, name)?,
            };
        }
        Some(cur)
    }

    /// Resolve the path to a feature value; `None` when any step walks off
    /// the graph or the final feature is absent.
    pub fn find(&self, utt: &Utterance, item: ItemId) -> Option<Value> {
        let target = self.find_item(utt, item)?;
        utt.item_features(target).get(&self.feature).cloned()
    }

    /// String form of [`FeaturePath::find`], for the common comparisons
    /// against literals. Ints and floats are rendered via `Display`.
    pub fn find_string(&self, utt: &Utterance, item: ItemId) -> Option<String> {
        self.find(utt, item).map(|v| v.to_string())
    }
}

fn parse_step(token: &str, path: &str) -> Result<Step> {
    if let Some(rel) = token.strip_prefix("R:") {
        if rel.is_empty() {
            bail!("empty relation name in path `{}`", path);
        }
        return Ok(Step::Relation(rel.to_string()));
    }
    match token {
        "p" | "prev" => Ok(Step::Prev),
        "n" | "next" => Ok(Step::Next),
        "parent" => Ok(Step::Parent),
        "daughter" | "daughter1" => Ok(Step::Daughter),
        "daughter2" => Ok(Step::Daughter2),
        "daughtern" => Ok(Step::DaughterN),
        other => bail!("unknown step `{}` in path `{}`", other, path),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use std::sync::Arc;

    /// Word "now" with one syllable (stress 1) and segments n/aw, mirrored
    /// across Word, SylStructure and Segment relations.
    fn build_utterance() -> (Utterance, ItemId) {
        let mut u = Utterance::new("now", Arc::new(FeatureSet::new()));
        let word = u.create_relation("Word").unwrap();
        let syls = u.create_relation("SylStructure").unwrap();
        let segr = u.create_relation("Segment").unwrap();

        let w = u.append(word);
        u.set_name(w, "now");

        let sw = u.append_shared(syls, w);
        let syl = u.create_daughter(sw);
        u.item_features_mut(syl).set_int("stress", 1);

        for phone in ["n", "aw"] {
            let seg = u.append(segr);
            u.set_name(seg, phone);
            u.add_daughter(syl, seg);
        }
        let first_seg = u.head(segr).unwrap();
        (u, first_seg)
    }

    #[test]
    fn test_terminal_feature_only() {
        let (u, seg) = build_utterance();
        let p = FeaturePath::compile("name").unwrap();
        assert_eq!(p.find_string(&u, seg), Some("n".into()));
    }

    #[test]
    fn test_next_and_prev() {
        let (u, seg) = build_utterance();
        let next = FeaturePath::compile("n.name").unwrap();
        assert_eq!(next.find_string(&u, seg), Some("aw".into()));

        let aw = u.next(seg).unwrap();
        let prev = FeaturePath::compile("p.name").unwrap();
        assert_eq!(prev.find_string(&u, aw), Some("n".into()));
    }

    #[test]
    fn test_off_end_is_none() {
        let (u, seg) = build_utterance();
        for path in ["p.name", "n.n.name", "parent.name", "daughter.name"] {
            let p = FeaturePath::compile(path).unwrap();
            assert_eq!(p.find(&u, seg), None, "path {}", path);
        }
    }

    #[test]
    fn test_relation_switch_and_parents() {
        let (u, seg) = build_utterance();
        // Segment -> its SylStructure node -> syllable -> word.
        let p = FeaturePath::compile("R:SylStructure.parent.parent.name").unwrap();
        assert_eq!(p.find_string(&u, seg), Some("now".into()));

        let stress = FeaturePath::compile("R:SylStructure.parent.stress").unwrap();
        assert_eq!(stress.find_string(&u, seg), Some("1".into()));
    }

    #[test]
    fn test_daughter_steps() {
        let (u, _) = build_utterance();
        let word_rel = u.relation("Word").unwrap();
        let w = u.head(word_rel).unwrap();

        let first = FeaturePath::compile("R:SylStructure.daughter.daughter.name").unwrap();
        assert_eq!(first.find_string(&u, w), Some("n".into()));
        let last = FeaturePath::compile("R:SylStructure.daughter.daughtern.name").unwrap();
        assert_eq!(last.find_string(&u, w), Some("aw".into()));
        let second = FeaturePath::compile("R:SylStructure.daughter.daughter2.name").unwrap();
        assert_eq!(second.find_string(&u, w), Some("aw".into()));
    }

    #[test]
    fn test_missing_relation_is_none() {
        let (u, seg) = build_utterance();
        let p = FeaturePath::compile("R:Phrase.name").unwrap();
        assert_eq!(p.find(&u, seg), None);
    }

    #[test]
    fn test_compile_rejects_bad_paths() {
        assert!(FeaturePath::compile("").is_err());
        assert!(FeaturePath::compile("sideways.name").is_err());
        assert!(FeaturePath::compile("n.parent").is_err());
        assert!(FeaturePath::compile("R:.name").is_err());
        assert!(FeaturePath::compile("n.").is_err());
    }

    #[test]
    fn test_long_spellings() {
        let (u, seg) = build_utterance();
        let p = FeaturePath::compile("next.name").unwrap();
        assert_eq!(p.find_string(&u, seg), Some("aw".into()));
        let q = FeaturePath::compile("next.prev.name").unwrap();
        assert_eq!(q.find_string(&u, seg), Some("n".into()));
    }
}
