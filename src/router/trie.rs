//! Character trie shared by the content path parser and the class-name index.
//!
//! Patterns are inserted into a mutable builder and then compiled into an
//! arena of [`TrieNode`]s. Runs of single-child literal nodes collapse into
//! one [`NodeKind::Trunk`]; nodes where patterns diverge, or where a
//! placeholder starts, become [`NodeKind::Branch`].

use std::collections::BTreeMap;

/// Character class accepted by a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenClass {
    /// Letters, digits, `-` and `_`.
    Name,
    /// The name class plus `/`.
    Path,
}

impl TokenClass {
    /// Whether `c` belongs to the class.
    pub fn accepts(self, c: char) -> bool {
        match self {
            TokenClass::Name => c.is_ascii_alphanumeric() || c == '-' || c == '_',
            TokenClass::Path => TokenClass::Name.accepts(c) || c == '/',
        }
    }

    /// Whether `value` is a non-empty member of the class.
    pub fn is_valid(self, value: &str) -> bool {
        !value.is_empty() && value.chars().all(|c| self.accepts(c))
    }
}

/// One element of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternPart {
    /// Characters matched verbatim.
    Literal(String),
    /// A placeholder capturing one or more characters of a class.
    Token(TokenClass),
}

/// Shape of a compiled node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// No outgoing edges.
    Leaf,
    /// A literal run with a single continuation.
    Trunk {
        /// The characters consumed by the run.
        run: String,
        /// Node reached after the run.
        next: usize,
    },
    /// Several literal edges and/or placeholder edges.
    Branch {
        /// Literal edges sorted by character.
        literals: Vec<(char, usize)>,
        /// Placeholder edges.
        tokens: Vec<(TokenClass, usize)>,
    },
}

/// A compiled trie node; any node may carry a value.
#[derive(Debug)]
pub struct TrieNode<V> {
    kind: NodeKind,
    value: Option<V>,
}

impl<V> TrieNode<V> {
    /// The node shape.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The value stored at this node.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }
}

#[derive(Debug)]
struct BuildNode<V> {
    literals: BTreeMap<char, usize>,
    tokens: BTreeMap<TokenClass, usize>,
    value: Option<V>,
}

impl<V> BuildNode<V> {
    fn new() -> Self {
        Self {
            literals: BTreeMap::new(),
            tokens: BTreeMap::new(),
            value: None,
        }
    }

    fn single_literal(&self) -> Option<(char, usize)> {
        if self.tokens.is_empty() && self.literals.len() == 1 {
            self.literals.iter().next().map(|(c, next)| (*c, *next))
        } else {
            None
        }
    }
}

/// Collects patterns before compilation.
#[derive(Debug)]
pub struct TrieBuilder<V> {
    nodes: Vec<BuildNode<V>>,
}

impl<V> Default for TrieBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TrieBuilder<V> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            nodes: vec![BuildNode::new()],
        }
    }

    /// Inserts a pattern, handing the value back if the pattern is already taken.
    pub fn insert(&mut self, pattern: &[PatternPart], value: V) -> Result<(), V> {
        let mut current = 0;
        for part in pattern {
            match part {
                PatternPart::Literal(literal) => {
                    for c in literal.chars() {
                        current = self.literal_child(current, c);
                    }
                }
                PatternPart::Token(class) => {
                    current = self.token_child(current, *class);
                }
            }
        }

        let node = &mut self.nodes[current];
        if node.value.is_some() {
            return Err(value);
        }
        node.value = Some(value);
        Ok(())
    }

    /// Inserts a purely literal key.
    pub fn insert_literal(&mut self, key: &str, value: V) -> Result<(), V> {
        self.insert(&[PatternPart::Literal(key.to_string())], value)
    }

    /// Compiles the collected patterns.
    pub fn build(mut self) -> Trie<V> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let _root = compile_node(&mut self.nodes, 0, &mut nodes);
        Trie { nodes }
    }

    fn literal_child(&mut self, node: usize, c: char) -> usize {
        if let Some(next) = self.nodes[node].literals.get(&c) {
            return *next;
        }
        let next = self.nodes.len();
        self.nodes.push(BuildNode::new());
        _ = self.nodes[node].literals.insert(c, next);
        next
    }

    fn token_child(&mut self, node: usize, class: TokenClass) -> usize {
        if let Some(next) = self.nodes[node].tokens.get(&class) {
            return *next;
        }
        let next = self.nodes.len();
        self.nodes.push(BuildNode::new());
        _ = self.nodes[node].tokens.insert(class, next);
        next
    }
}

fn compile_node<V>(
    build: &mut [BuildNode<V>],
    index: usize,
    out: &mut Vec<TrieNode<V>>,
) -> usize {
    let slot = out.len();
    out.push(TrieNode {
        kind: NodeKind::Leaf,
        value: build[index].value.take(),
    });

    let kind = if let Some((first, mut next)) = build[index].single_literal() {
        let mut run = String::new();
        run.push(first);
        while build[next].value.is_none() {
            match build[next].single_literal() {
                Some((c, after)) => {
                    run.push(c);
                    next = after;
                }
                None => break,
            }
        }
        let next = compile_node(build, next, out);
        NodeKind::Trunk { run, next }
    } else if build[index].literals.is_empty() && build[index].tokens.is_empty() {
        NodeKind::Leaf
    } else {
        let literal_edges: Vec<(char, usize)> = build[index]
            .literals
            .iter()
            .map(|(c, next)| (*c, *next))
            .collect();
        let token_edges: Vec<(TokenClass, usize)> = build[index]
            .tokens
            .iter()
            .map(|(class, next)| (*class, *next))
            .collect();

        let literals = literal_edges
            .into_iter()
            .map(|(c, next)| (c, compile_node(build, next, out)))
            .collect();
        let tokens = token_edges
            .into_iter()
            .map(|(class, next)| (class, compile_node(build, next, out)))
            .collect();
        NodeKind::Branch { literals, tokens }
    };

    out[slot].kind = kind;
    slot
}

/// A compiled, immutable trie. Node `0` is the root.
#[derive(Debug)]
pub struct Trie<V> {
    nodes: Vec<TrieNode<V>>,
}

impl<V> Trie<V> {
    /// Number of compiled nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The root node.
    pub fn root(&self) -> &TrieNode<V> {
        &self.nodes[0]
    }

    /// Matches the whole of `input`, returning the value and the placeholder
    /// captures in pattern order.
    ///
    /// Literal edges are tried before placeholder edges; placeholders capture
    /// greedily and give characters back when the remainder fails to match.
    pub fn find<'t, 'i>(&'t self, input: &'i str) -> Option<(&'t V, Vec<&'i str>)> {
        let mut spans = Vec::new();
        let value = self.match_from(0, input, 0, &mut spans)?;
        let captures = spans.iter().map(|(start, end)| &input[*start..*end]).collect();
        Some((value, captures))
    }

    /// Walks literal edges from the start of `text` and returns every stored
    /// value passed on the way, with the number of bytes consumed, shortest
    /// first.
    pub fn literal_prefixes(&self, text: &str) -> Vec<(usize, &V)> {
        let mut found = Vec::new();
        let mut node = 0;
        let mut pos = 0;
        loop {
            if pos > 0 {
                if let Some(value) = self.nodes[node].value.as_ref() {
                    found.push((pos, value));
                }
            }
            match &self.nodes[node].kind {
                NodeKind::Leaf => break,
                NodeKind::Trunk { run, next } => {
                    if text[pos..].starts_with(run.as_str()) {
                        pos += run.len();
                        node = *next;
                    } else {
                        break;
                    }
                }
                NodeKind::Branch { literals, .. } => {
                    let Some(c) = text[pos..].chars().next() else {
                        break;
                    };
                    match literals.binary_search_by(|(edge, _)| edge.cmp(&c)) {
                        Ok(found_at) => {
                            pos += c.len_utf8();
                            node = literals[found_at].1;
                        }
                        Err(_) => break,
                    }
                }
            }
        }
        found
    }

    fn match_from(
        &self,
        node: usize,
        input: &str,
        pos: usize,
        spans: &mut Vec<(usize, usize)>,
    ) -> Option<&V> {
        let current = &self.nodes[node];
        if pos == input.len() {
            return current.value.as_ref();
        }

        match &current.kind {
            NodeKind::Leaf => None,
            NodeKind::Trunk { run, next } => {
                if input[pos..].starts_with(run.as_str()) {
                    self.match_from(*next, input, pos + run.len(), spans)
                } else {
                    None
                }
            }
            NodeKind::Branch { literals, tokens } => {
                if let Some(c) = input[pos..].chars().next() {
                    if let Ok(found_at) =
                        literals.binary_search_by(|(edge, _)| edge.cmp(&c))
                    {
                        let next = literals[found_at].1;
                        if let Some(value) =
                            self.match_from(next, input, pos + c.len_utf8(), spans)
                        {
                            return Some(value);
                        }
                    }
                }

                for (class, next) in tokens {
                    // Token classes are ASCII, so byte offsets are char boundaries.
                    let extent = input.as_bytes()[pos..]
                        .iter()
                        .take_while(|b| class.accepts(char::from(**b)))
                        .count();
                    for end in (pos + 1..=pos + extent).rev() {
                        spans.push((pos, end));
                        if let Some(value) = self.match_from(*next, input, end, spans) {
                            return Some(value);
                        }
                        _ = spans.pop();
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> PatternPart {
        PatternPart::Literal(s.to_string())
    }

    #[test]
    fn test_literal_runs_compress_into_trunks() {
        let mut builder = TrieBuilder::new();
        builder.insert_literal("namespaced-js/bundle.js", 1).unwrap();
        let trie = builder.build();

        assert_eq!(trie.node_count(), 2);
        match trie.root().kind() {
            NodeKind::Trunk { run, next } => {
                assert_eq!(run, "namespaced-js/bundle.js");
                assert_eq!(*next, 1);
            }
            other => panic!("expected trunk, got {other:?}"),
        }
        assert_eq!(trie.find("namespaced-js/bundle.js").map(|(v, _)| *v), Some(1));
        assert!(trie.find("namespaced-js/bundle").is_none());
    }

    #[test]
    fn test_divergent_patterns_branch() {
        let mut builder = TrieBuilder::new();
        builder.insert_literal("js/dev", "dev").unwrap();
        builder.insert_literal("js/prod", "prod").unwrap();
        let trie = builder.build();

        assert_eq!(trie.find("js/dev").map(|(v, _)| *v), Some("dev"));
        assert_eq!(trie.find("js/prod").map(|(v, _)| *v), Some("prod"));
        assert!(trie.find("js/d").is_none());
    }

    #[test]
    fn test_value_bearing_node_continues_as_trunk() {
        let mut builder = TrieBuilder::new();
        builder.insert_literal("bundle.js", 1).unwrap();
        builder.insert_literal("bundle.js.map", 2).unwrap();
        let trie = builder.build();

        assert_eq!(trie.find("bundle.js").map(|(v, _)| *v), Some(1));
        assert_eq!(trie.find("bundle.js.map").map(|(v, _)| *v), Some(2));
    }

    #[test]
    fn test_tokens_capture_and_backtrack() {
        let mut builder = TrieBuilder::new();
        builder
            .insert(
                &[lit("module/"), PatternPart::Token(TokenClass::Path), lit(".js")],
                "module",
            )
            .unwrap();
        builder
            .insert(
                &[lit("i18n/"), PatternPart::Token(TokenClass::Name), lit("-x/"), PatternPart::Token(TokenClass::Name)],
                "dashed",
            )
            .unwrap();
        let trie = builder.build();

        let (value, captures) = trie.find("module/app/pkg/Class.js").unwrap();
        assert_eq!(*value, "module");
        assert_eq!(captures, vec!["app/pkg/Class"]);

        let (value, captures) = trie.find("i18n/en-x-x/fr").unwrap();
        assert_eq!(*value, "dashed");
        assert_eq!(captures, vec!["en-x", "fr"]);

        assert!(trie.find("module/.js").is_none());
        assert!(trie.find("module/a b.js").is_none());
    }

    #[test]
    fn test_duplicate_pattern_returns_value() {
        let mut builder = TrieBuilder::new();
        builder.insert_literal("a", 1).unwrap();
        assert_eq!(builder.insert_literal("a", 2), Err(2));
    }

    #[test]
    fn test_literal_prefixes_reports_every_stop() {
        let mut builder = TrieBuilder::new();
        builder.insert_literal("my.Class", 1).unwrap();
        builder.insert_literal("my.ClassB", 2).unwrap();
        let trie = builder.build();

        let found: Vec<(usize, i32)> = trie
            .literal_prefixes("my.ClassB.extend()")
            .into_iter()
            .map(|(len, v)| (len, *v))
            .collect();
        assert_eq!(found, vec![(8, 1), (9, 2)]);
        assert!(trie.literal_prefixes("other").is_empty());
    }
}
