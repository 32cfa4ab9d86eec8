use crate::indexer::match_strength;
use crate::models::{normalize_term, Term, TermHierarchy, TermKind, TerminologyMatches};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Cap on one-hop expansion results returned by terminology search.
const RELATED_EXPANSION_CAP: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    SynonymOf,
    AntonymOf,
    DefinitionOf,
    UsageExampleOf,
    /// Parent-to-child hierarchy edge. The only relation kind that must
    /// stay acyclic; insertion checks reachability and drops offenders.
    CategoryOf,
    RelatedTo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub text: String,
    pub kind: TermKind,
    pub confidence: f64,
    pub frequency: u64,
    outgoing: Vec<usize>,
    incoming: Vec<usize>,
}

/// In-memory graph of term nodes and typed relationships for one loaded
/// documentation collection. Node ids are normalized term texts, so two
/// spellings of the same term always land on the same vertex.
#[derive(Default)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<Edge>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, term_text: &str) -> Option<&GraphNode> {
        self.nodes.get(&normalize_term(term_text))
    }

    /// Ensure a node exists for the given text, folding stats into an
    /// existing node when one is already present. Returns the node id.
    pub fn ensure_node(
        &mut self,
        text: &str,
        kind: TermKind,
        confidence: f64,
        frequency: u64,
    ) -> String {
        let id = normalize_term(text);
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.confidence = node.confidence.max(confidence);
                node.frequency += frequency;
            }
            None => {
                self.nodes.insert(
                    id.clone(),
                    GraphNode {
                        id: id.clone(),
                        text: text.to_string(),
                        kind,
                        confidence,
                        frequency,
                        outgoing: Vec::new(),
                        incoming: Vec::new(),
                    },
                );
            }
        }
        id
    }

    /// Insert a typed edge between two existing nodes. Self-loops,
    /// duplicates, edges to missing nodes, and `CategoryOf` edges that
    /// would close a hierarchy cycle are dropped; returns whether the
    /// edge was inserted.
    pub fn add_edge(&mut self, source: &str, target: &str, kind: RelationKind) -> bool {
        let source = normalize_term(source);
        let target = normalize_term(target);

        if source == target {
            return false;
        }
        if !self.nodes.contains_key(&source) || !self.nodes.contains_key(&target) {
            debug!(%source, %target, ?kind, "edge endpoint missing; skipping");
            return false;
        }
        if self.has_edge(&source, &target, kind) {
            return false;
        }
        if kind == RelationKind::CategoryOf && self.creates_category_cycle(&source, &target) {
            debug!(parent = %source, child = %target, "category edge would close a cycle; dropping");
            return false;
        }

        let edge_index = self.edges.len();
        self.edges.push(Edge {
            source: source.clone(),
            target: target.clone(),
            kind,
        });
        if let Some(node) = self.nodes.get_mut(&source) {
            node.outgoing.push(edge_index);
        }
        if let Some(node) = self.nodes.get_mut(&target) {
            node.incoming.push(edge_index);
        }
        true
    }

    fn has_edge(&self, source: &str, target: &str, kind: RelationKind) -> bool {
        self.nodes.get(source).is_some_and(|node| {
            node.outgoing.iter().any(|&index| {
                let edge = &self.edges[index];
                edge.target == target && edge.kind == kind
            })
        })
    }

    /// A new parent→child edge closes a cycle iff the parent is already
    /// reachable from the child along `CategoryOf` edges.
    fn creates_category_cycle(&self, parent: &str, child: &str) -> bool {
        let mut stack = vec![child];
        let mut seen: HashSet<&str> = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == parent {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                for &index in &node.outgoing {
                    let edge = &self.edges[index];
                    if edge.kind == RelationKind::CategoryOf {
                        stack.push(&edge.target);
                    }
                }
            }
        }

        false
    }

    /// Add a batch of extracted terms and run relationship detection:
    /// acronyms point at their expansion, co-occurring concepts relate to
    /// each other, code entities become usage examples of page concepts,
    /// and heading trails induce the category hierarchy.
    pub fn add_terms(&mut self, terms: &[Term]) {
        for term in terms {
            self.ensure_node(&term.text, term.kind, term.confidence, term.frequency);
        }

        for term in terms {
            if term.kind == TermKind::Acronym {
                if let Some(expansion) = term.definition.as_deref() {
                    if !normalize_term(expansion).is_empty() {
                        self.ensure_node(expansion, TermKind::Concept, term.confidence, 1);
                        self.add_edge(&term.text, expansion, RelationKind::DefinitionOf);
                    }
                }
            }
        }

        let concepts: Vec<&Term> = terms
            .iter()
            .filter(|term| term.kind == TermKind::Concept)
            .collect();

        for (position, first) in concepts.iter().enumerate() {
            for second in &concepts[position + 1..] {
                if shares_source(first, second) {
                    self.add_edge(&first.text, &second.text, RelationKind::RelatedTo);
                    self.add_edge(&second.text, &first.text, RelationKind::RelatedTo);
                }
            }
        }

        for code_term in terms.iter().filter(|term| term.kind.is_code_entity()) {
            for concept in &concepts {
                if shares_source(code_term, concept) {
                    self.add_edge(&code_term.text, &concept.text, RelationKind::UsageExampleOf);
                }
            }
        }

        for term in terms {
            if let Some(parent) = term.heading_trail.last() {
                if normalize_term(parent) != term.node_id() {
                    self.ensure_node(parent, TermKind::Concept, 0.5, 1);
                    self.add_edge(parent, &term.text, RelationKind::CategoryOf);
                }
            }
        }
    }

    /// Substring search over node texts with the index's ordering policy,
    /// optionally expanded to one-hop neighbors of the matches.
    pub fn search_terminology(&self, query: &str, expand_related: bool) -> TerminologyMatches {
        let normalized_query = normalize_term(query);
        if normalized_query.is_empty() {
            return TerminologyMatches::default();
        }

        let mut hits: Vec<(_, &GraphNode)> = self
            .nodes
            .values()
            .filter_map(|node| {
                match_strength(&normalized_query, &node.id).map(|strength| (strength, node))
            })
            .collect();

        hits.sort_by(|(left_strength, left), (right_strength, right)| {
            right_strength
                .cmp(left_strength)
                .then_with(|| right.frequency.cmp(&left.frequency))
                .then_with(|| right.confidence.total_cmp(&left.confidence))
                .then_with(|| left.id.cmp(&right.id))
        });

        let matches: Vec<String> = hits.iter().map(|(_, node)| node.id.clone()).collect();

        let mut related = Vec::new();
        if expand_related {
            let match_set: HashSet<&str> = matches.iter().map(String::as_str).collect();
            let mut seen: HashSet<String> = HashSet::new();

            'expansion: for id in &matches {
                let mut neighbors = self.neighbor_ids(id, None);
                neighbors.sort();
                for neighbor in neighbors {
                    if match_set.contains(neighbor.as_str()) || !seen.insert(neighbor.clone()) {
                        continue;
                    }
                    related.push(neighbor);
                    if related.len() >= RELATED_EXPANSION_CAP {
                        break 'expansion;
                    }
                }
            }
        }

        TerminologyMatches { matches, related }
    }

    /// Category parents and children of a term plus all other relations
    /// touching it. Unknown terms yield empty lists, not an error.
    pub fn get_term_hierarchy(&self, term_text: &str) -> TermHierarchy {
        let id = normalize_term(term_text);
        let node = match self.nodes.get(&id) {
            Some(node) => node,
            None => return TermHierarchy::default(),
        };

        let mut parents = Vec::new();
        for &index in &node.incoming {
            let edge = &self.edges[index];
            if edge.kind == RelationKind::CategoryOf {
                parents.push(edge.source.clone());
            }
        }

        let mut children = Vec::new();
        for &index in &node.outgoing {
            let edge = &self.edges[index];
            if edge.kind == RelationKind::CategoryOf {
                children.push(edge.target.clone());
            }
        }

        let mut related = self.neighbor_ids(&id, Some(RelationKind::CategoryOf));
        related.sort();
        related.dedup();
        parents.sort();
        children.sort();

        TermHierarchy {
            parents,
            children,
            related,
        }
    }

    /// All one-hop neighbors of a node, excluding edges of `skip` kind.
    fn neighbor_ids(&self, id: &str, skip: Option<RelationKind>) -> Vec<String> {
        let node = match self.nodes.get(id) {
            Some(node) => node,
            None => return Vec::new(),
        };

        let mut neighbors = Vec::new();
        for &index in node.outgoing.iter().chain(node.incoming.iter()) {
            let edge = &self.edges[index];
            if skip.is_some_and(|kind| edge.kind == kind) {
                continue;
            }
            let other = if edge.source == id {
                &edge.target
            } else {
                &edge.source
            };
            neighbors.push(other.clone());
        }
        neighbors
    }
}

fn shares_source(left: &Term, right: &Term) -> bool {
    left.source_locations.iter().any(|location| {
        right
            .source_locations
            .iter()
            .any(|other| other.source_id == location.source_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceLocation;

    fn term(text: &str, kind: TermKind, source_id: &str) -> Term {
        Term {
            text: text.to_string(),
            kind,
            confidence: 0.8,
            frequency: 1,
            definition: None,
            source_locations: vec![SourceLocation {
                source_id: source_id.to_string(),
                excerpt: text.to_string(),
            }],
            heading_trail: Vec::new(),
        }
    }

    #[test]
    fn node_identity_is_normalized() {
        let mut graph = KnowledgeGraph::new();
        let first = graph.ensure_node("Event Loop", TermKind::Concept, 0.8, 1);
        let second = graph.ensure_node("  event   LOOP ", TermKind::Concept, 0.9, 2);
        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);

        let node = graph.node("event loop").expect("node exists");
        assert_eq!(node.frequency, 3);
        assert!((node.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn self_loops_and_duplicate_edges_are_rejected() {
        let mut graph = KnowledgeGraph::new();
        graph.ensure_node("alpha", TermKind::Concept, 0.8, 1);
        graph.ensure_node("beta", TermKind::Concept, 0.8, 1);

        assert!(!graph.add_edge("alpha", "alpha", RelationKind::RelatedTo));
        assert!(graph.add_edge("alpha", "beta", RelationKind::RelatedTo));
        assert!(!graph.add_edge("alpha", "beta", RelationKind::RelatedTo));
        assert!(graph.add_edge("alpha", "beta", RelationKind::SynonymOf));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn category_hierarchy_stays_acyclic() {
        let mut graph = KnowledgeGraph::new();
        for name in ["storage", "indexes", "btree"] {
            graph.ensure_node(name, TermKind::Concept, 0.8, 1);
        }

        assert!(graph.add_edge("storage", "indexes", RelationKind::CategoryOf));
        assert!(graph.add_edge("indexes", "btree", RelationKind::CategoryOf));
        // Closing the loop must be a silent no-op.
        assert!(!graph.add_edge("btree", "storage", RelationKind::CategoryOf));

        let storage = graph.get_term_hierarchy("storage");
        assert_eq!(storage.children, vec!["indexes"]);
        assert!(storage.parents.is_empty());

        // Non-hierarchy relations may still form mutual links.
        assert!(graph.add_edge("btree", "storage", RelationKind::RelatedTo));
        assert!(graph.add_edge("storage", "btree", RelationKind::RelatedTo));
    }

    #[test]
    fn acronym_terms_link_to_their_expansion() {
        let mut graph = KnowledgeGraph::new();
        let mut acronym = term("API", TermKind::Acronym, "page-1");
        acronym.definition = Some("Application Programming Interface".to_string());
        graph.add_terms(&[acronym]);

        let hierarchy = graph.get_term_hierarchy("api");
        assert_eq!(
            hierarchy.related,
            vec!["application programming interface"]
        );
    }

    #[test]
    fn cooccurring_concepts_become_related() {
        let mut graph = KnowledgeGraph::new();
        graph.add_terms(&[
            term("Replication", TermKind::Concept, "page-1"),
            term("Failover", TermKind::Concept, "page-1"),
            term("Sharding", TermKind::Concept, "page-2"),
        ]);

        let replication = graph.get_term_hierarchy("replication");
        assert_eq!(replication.related, vec!["failover"]);
        assert!(graph.get_term_hierarchy("sharding").related.is_empty());
    }

    #[test]
    fn code_entities_become_usage_examples_of_page_concepts() {
        let mut graph = KnowledgeGraph::new();
        graph.add_terms(&[
            term("login", TermKind::FunctionName, "page-1"),
            term("Authentication", TermKind::Concept, "page-1"),
        ]);

        let login = graph.get_term_hierarchy("login");
        assert_eq!(login.related, vec!["authentication"]);
        assert!(graph
            .node("login")
            .is_some_and(|node| node.kind == TermKind::FunctionName));
    }

    #[test]
    fn heading_trails_induce_category_edges() {
        let mut graph = KnowledgeGraph::new();
        let mut child = term("Failover", TermKind::Concept, "page-1");
        child.heading_trail = vec!["Replication".to_string()];
        graph.add_terms(&[child]);

        let failover = graph.get_term_hierarchy("failover");
        assert_eq!(failover.parents, vec!["replication"]);
        let replication = graph.get_term_hierarchy("replication");
        assert_eq!(replication.children, vec!["failover"]);
    }

    #[test]
    fn terminology_search_orders_matches_and_expands_one_hop() {
        let mut graph = KnowledgeGraph::new();
        graph.add_terms(&[
            term("auth", TermKind::Concept, "page-1"),
            term("authenticate", TermKind::FunctionName, "page-1"),
            term("oauth", TermKind::TechnicalTerm, "page-1"),
            term("session", TermKind::Concept, "page-1"),
        ]);

        let result = graph.search_terminology("auth", true);
        assert_eq!(result.matches[0], "auth");
        assert!(result.matches.contains(&"authenticate".to_string()));
        assert!(result.matches.contains(&"oauth".to_string()));
        // "session" is one RelatedTo hop from "auth" and not a match.
        assert!(result.related.contains(&"session".to_string()));
        assert!(!result.related.iter().any(|id| result.matches.contains(id)));
    }

    #[test]
    fn unknown_terms_yield_empty_hierarchy() {
        let graph = KnowledgeGraph::new();
        let hierarchy = graph.get_term_hierarchy("missing");
        assert!(hierarchy.parents.is_empty());
        assert!(hierarchy.children.is_empty());
        assert!(hierarchy.related.is_empty());
    }
}
