//! Classification and regression trees (CARTs).
//!
//! A CART predicts a linguistic or acoustic feature from an item's context:
//! phrasing verdicts, duration z-scores, accent placement, cluster-unit
//! candidate lists. The tree is parsed and validated once at voice load and
//! is read-only afterwards, shared across utterances.
//!
//! ## Text format
//!
//! One node per line after an optional `TOTAL n` header; `***`-prefixed
//! comment lines are skipped:
//!
//! ```text
//! TOTAL 3
//! NODE <path> <op> <operand> <no_target>
//! LEAF BB
//! LEAF "twenty past"
//! ```
//!
//! The "yes" child of the node on line *i* is line *i+1*; `no_target` is an
//! absolute node index and must point forward, which is what guarantees that
//! evaluation terminates. Operators: `=`, `<`, `>`, `MATCHES` (full-string
//! regex), `IN` (comma-separated membership). Leaf payloads: a float, a
//! string (quote it to keep spaces or to force a numeric-looking string),
//! an `(i1 i2 …)` index list, or `TREE <name>` referencing a named subtree
//! supplied at parse time.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::path::FeaturePath;
use crate::utterance::{ItemId, Utterance};

/// Payload returned by tree evaluation.
#[derive(Debug, Clone)]
pub enum LeafValue {
    Str(String),
    Float(f32),
    /// Candidate index list (cluster-unit selection trees).
    Indices(Vec<u32>),
    /// Delegate to a nested tree, evaluated against the same item.
    Subtree(Cart),
}

#[derive(Debug, Clone)]
enum Test {
    Equals { text: String, num: Option<f32> },
    Less(f32),
    Greater(f32),
    Matches(Regex),
    In(Vec<String>),
}

#[derive(Debug, Clone)]
struct Decision {
    path: FeaturePath,
    test: Test,
    no_target: u32,
}

#[derive(Debug, Clone)]
enum Node {
    Decision(Decision),
    Leaf(LeafValue),
}

/// An immutable, validated decision tree.
#[derive(Debug, Clone)]
pub struct Cart {
    nodes: Vec<Node>,
}

impl Cart {
    pub fn parse(text: &str) -> Result<Cart> {
        Cart::parse_with_subtrees(text, HashMap::new())
    }

    /// Parse with named subtrees available to `TREE <name>` leaves.
    pub fn parse_with_subtrees(text: &str, mut subtrees: HashMap<String, Cart>) -> Result<Cart> {
        let mut nodes = Vec::new();
        let mut expected: Option<usize> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("***") {
                continue;
            }
            let parse = parse_line(line, &mut subtrees)
                .with_context(|| format!("tree line {}: `{}`", lineno + 1, line))?;
            match parse {
                Parsed::Total(n) => expected = Some(n),
                Parsed::Node(node) => nodes.push(node),
            }
        }

        if let Some(n) = expected {
            if n != nodes.len() {
                bail!("tree declares {} nodes but has {}", n, nodes.len());
            }
        }
        Cart::from_nodes(nodes)
    }

    fn from_nodes(nodes: Vec<Node>) -> Result<Cart> {
        if nodes.is_empty() {
            bail!("empty tree");
        }
        let len = nodes.len();
        for (i, node) in nodes.iter().enumerate() {
            if let Node::Decision(d) = node {
                let no = d.no_target as usize;
                if i + 1 >= len {
                    bail!("node {} has no yes-child (runs off the tree)", i);
                }
                if no >= len {
                    bail!("node {} no-branch {} is out of range", i, no);
                }
                if no <= i {
                    bail!("node {} no-branch {} does not point forward", i, no);
                }
            }
        }
        Ok(Cart { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk the tree for one item. Always lands on a leaf: validation
    /// guarantees both children of every decision point forward and in
    /// range, so the walk strictly advances and terminates.
    pub fn interpret<'a>(&'a self, utt: &Utterance, item: ItemId) -> &'a LeafValue {
        let mut cart = self;
        'subtree: loop {
            let mut idx = 0usize;
            loop {
                match &cart.nodes[idx] {
                    Node::Leaf(LeafValue::Subtree(sub)) => {
                        cart = sub;
                        continue 'subtree;
                    }
                    Node::Leaf(value) => return value,
                    Node::Decision(d) => {
                        idx = if d.accepts(utt, item) {
                            idx + 1
                        } else {
                            d.no_target as usize
                        };
                    }
                }
            }
        }
    }

    /// String verdict, `None` for non-string leaves.
    pub fn interpret_string<'a>(&'a self, utt: &Utterance, item: ItemId) -> Option<&'a str> {
        match self.interpret(utt, item) {
            LeafValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Float verdict, `None` for non-float leaves.
    pub fn interpret_float(&self, utt: &Utterance, item: ItemId) -> Option<f32> {
        match self.interpret(utt, item) {
            LeafValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Index-list verdict, `None` for other leaves.
    pub fn interpret_indices<'a>(&'a self, utt: &Utterance, item: ItemId) -> Option<&'a [u32]> {
        match self.interpret(utt, item) {
            LeafValue::Indices(v) => Some(v),
            _ => None,
        }
    }
}

impl Decision {
    /// Missing features take the no-branch by convention.
    fn accepts(&self, utt: &Utterance, item: ItemId) -> bool {
        let value = match self.path.find(utt, item) {
            Some(v) => v,
            None => return false,
        };
        match &self.test {
            Test::Equals { text, num } => match (num, value.to_float()) {
                (Some(lit), Some(v)) => (v - lit).abs() < f32::EPSILON,
                _ => value.to_string() == *text,
            },
            Test::Less(lit) => matches!(value.to_float(), Some(v) if v < *lit),
            Test::Greater(lit) => matches!(value.to_float(), Some(v) if v > *lit),
            Test::Matches(re) => re.is_match(&value.to_string()),
            Test::In(set) => {
                let s = value.to_string();
                set.iter().any(|m| *m == s)
            }
        }
    }
}

enum Parsed {
    Total(usize),
    Node(Node),
}

fn parse_line(line: &str, subtrees: &mut HashMap<String, Cart>) -> Result<Parsed> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens[0] {
        "TOTAL" => {
            if tokens.len() != 2 {
                bail!("TOTAL takes exactly one count");
            }
            Ok(Parsed::Total(tokens[1].parse::<usize>()?))
        }
        "NODE" => {
            if tokens.len() < 5 {
                bail!("NODE needs path, operator, operand and no-target");
            }
            let path = FeaturePath::compile(tokens[1])?;
            let op = tokens[2];
            let operand = tokens[3..tokens.len() - 1].join(" ");
            let operand = unquote(&operand);
            let no_target: u32 = tokens[tokens.len() - 1]
                .parse()
                .context("no-target is not an index")?;
            let test = match op {
                "=" => Test::Equals {
                    num: operand.parse::<f32>().ok(),
                    text: operand,
                },
                "<" => Test::Less(operand.parse::<f32>().context("`<` needs a number")?),
                ">" => Test::Greater(operand.parse::<f32>().context("`>` needs a number")?),
                "MATCHES" => {
                    let anchored = format!("^(?:{})$", operand);
                    Test::Matches(Regex::new(&anchored).context("bad MATCHES pattern")?)
                }
                "IN" => Test::In(operand.split(',').map(str::to_string).collect()),
                other => bail!("unknown operator `{}`", other),
            };
            Ok(Parsed::Node(Node::Decision(Decision {
                path,
                test,
                no_target,
            })))
        }
        "LEAF" => {
            if tokens.len() < 2 {
                bail!("LEAF needs a value");
            }
            let rest = line["LEAF".len()..].trim();
            Ok(Parsed::Node(Node::Leaf(parse_leaf(rest)?)))
        }
        "TREE" => {
            if tokens.len() != 2 {
                bail!("TREE takes exactly one subtree name");
            }
            let sub = subtrees
                .remove(tokens[1])
                .with_context(|| format!("unknown subtree `{}`", tokens[1]))?;
            Ok(Parsed::Node(Node::Leaf(LeafValue::Subtree(sub))))
        }
        other => bail!("unknown line kind `{}`", other),
    }
}

fn parse_leaf(text: &str) -> Result<LeafValue> {
    if text.starts_with('(') {
        let inner = text.trim_start_matches('(').trim_end_matches(')');
        let indices = inner
            .split_whitespace()
            .map(|t| t.parse::<u32>().context("bad index in leaf list"))
            .collect::<Result<Vec<u32>>>()?;
        return Ok(LeafValue::Indices(indices));
    }
    if text.starts_with('"') {
        return Ok(LeafValue::Str(unquote(text)));
    }
    if let Ok(f) = text.parse::<f32>() {
        return Ok(LeafValue::Float(f));
    }
    Ok(LeafValue::Str(text.to_string()))
}

fn unquote(s: &str) -> String {
    let t = s.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        t[1..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureSet, Value};
    use std::sync::Arc;

    fn item_with(features: &[(&str, Value)]) -> (Utterance, ItemId) {
        let mut u = Utterance::new("t", Arc::new(FeatureSet::new()));
        let r = u.create_relation("Word").unwrap();
        let it = u.append(r);
        for (k, v) in features {
            u.item_features_mut(it).set(k, v.clone());
        }
        (u, it)
    }

    #[test]
    fn test_single_leaf_tree() {
        let cart = Cart::parse("LEAF NB").unwrap();
        let (u, it) = item_with(&[]);
        assert_eq!(cart.interpret_string(&u, it), Some("NB"));
    }

    #[test]
    fn test_equals_branches() {
        let text = "TOTAL 3\nNODE name = pau 2\nLEAF yes\nLEAF no\n";
        let cart = Cart::parse(text).unwrap();

        let (u, it) = item_with(&[("name", Value::Str("pau".into()))]);
        assert_eq!(cart.interpret_string(&u, it), Some("yes"));

        let (u, it) = item_with(&[("name", Value::Str("ae".into()))]);
        assert_eq!(cart.interpret_string(&u, it), Some("no"));
    }

    #[test]
    fn test_missing_feature_takes_no_branch() {
        let text = "NODE gpos = det 2\nLEAF yes\nLEAF no\n";
        let cart = Cart::parse(text).unwrap();
        let (u, it) = item_with(&[]);
        assert_eq!(cart.interpret_string(&u, it), Some("no"));
    }

    #[test]
    fn test_numeric_comparisons() {
        let text = "NODE stress > 0.5 2\nLEAF 1.5\nNODE stress < 0.1 4\nLEAF 0.0\nLEAF -0.5\n";
        let cart = Cart::parse(text).unwrap();

        let (u, it) = item_with(&[("stress", Value::Int(1))]);
        assert_eq!(cart.interpret_float(&u, it), Some(1.5));

        let (u, it) = item_with(&[("stress", Value::Float(0.05))]);
        assert_eq!(cart.interpret_float(&u, it), Some(0.0));

        let (u, it) = item_with(&[("stress", Value::Float(0.3))]);
        assert_eq!(cart.interpret_float(&u, it), Some(-0.5));
    }

    #[test]
    fn test_equals_is_numeric_when_both_sides_parse() {
        let text = "NODE stress = 1 2\nLEAF yes\nLEAF no\n";
        let cart = Cart::parse(text).unwrap();
        // Stored as a string, compared numerically.
        let (u, it) = item_with(&[("stress", Value::Str("1.0".into()))]);
        assert_eq!(cart.interpret_string(&u, it), Some("yes"));
    }

    #[test]
    fn test_matches_is_full_string() {
        let text = "NODE punc MATCHES .*[.!?].* 2\nLEAF BB\nLEAF NB\n";
        let cart = Cart::parse(text).unwrap();

        let (u, it) = item_with(&[("punc", Value::Str("?\"".into()))]);
        assert_eq!(cart.interpret_string(&u, it), Some("BB"));

        let (u, it) = item_with(&[("punc", Value::Str(",".into()))]);
        assert_eq!(cart.interpret_string(&u, it), Some("NB"));
    }

    #[test]
    fn test_in_membership() {
        let text = "NODE gpos IN det,in,md 2\nLEAF func\nLEAF content\n";
        let cart = Cart::parse(text).unwrap();

        let (u, it) = item_with(&[("gpos", Value::Str("md".into()))]);
        assert_eq!(cart.interpret_string(&u, it), Some("func"));

        let (u, it) = item_with(&[("gpos", Value::Str("content".into()))]);
        assert_eq!(cart.interpret_string(&u, it), Some("content"));
    }

    #[test]
    fn test_index_list_leaf() {
        let cart = Cart::parse("LEAF (3 1 4 1 5)").unwrap();
        let (u, it) = item_with(&[]);
        assert_eq!(cart.interpret_indices(&u, it), Some(&[3, 1, 4, 1, 5][..]));
    }

    #[test]
    fn test_subtree_delegation() {
        let sub = Cart::parse("NODE stress = 1 2\nLEAF 0.4\nLEAF 0.0\n").unwrap();
        let mut subtrees = HashMap::new();
        subtrees.insert("stressed".to_string(), sub);

        let text = "NODE name = pau 2\nLEAF 0.9\nTREE stressed\n";
        let cart = Cart::parse_with_subtrees(text, subtrees).unwrap();

        let (u, it) = item_with(&[("name", Value::Str("ae".into())), ("stress", Value::Int(1))]);
        assert_eq!(cart.interpret_float(&u, it), Some(0.4));

        let (u, it) = item_with(&[("name", Value::Str("pau".into()))]);
        assert_eq!(cart.interpret_float(&u, it), Some(0.9));
    }

    #[test]
    fn test_quoted_string_leaf_keeps_spaces() {
        let cart = Cart::parse("LEAF \"twenty past\"").unwrap();
        let (u, it) = item_with(&[]);
        assert_eq!(cart.interpret_string(&u, it), Some("twenty past"));
    }

    #[test]
    fn test_malformed_trees_rejected_at_load() {
        // Dangling no-branch.
        assert!(Cart::parse("NODE name = x 9\nLEAF a\nLEAF b\n").is_err());
        // Backward no-branch (would loop).
        assert!(Cart::parse("LEAF a\nNODE name = x 0\nLEAF b\n").is_err());
        // Decision as the last node has no yes-child.
        assert!(Cart::parse("LEAF a\nLEAF b\nNODE name = x 1\n").is_err());
        // Count mismatch.
        assert!(Cart::parse("TOTAL 5\nLEAF a\n").is_err());
        // Unknown operator / non-numeric comparison literal.
        assert!(Cart::parse("NODE name ~ x 2\nLEAF a\nLEAF b\n").is_err());
        assert!(Cart::parse("NODE name < sponge 2\nLEAF a\nLEAF b\n").is_err());
        // Empty input.
        assert!(Cart::parse("").is_err());
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let text = "*** phrasing tree v2\n\nTOTAL 1\nLEAF NB\n";
        let cart = Cart::parse(text).unwrap();
        assert_eq!(cart.len(), 1);
    }
}
