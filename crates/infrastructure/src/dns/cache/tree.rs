use super::label_table::LabelTable;
use super::storage::RecordId;
use lodestone_dns_domain::{DomainError, DomainName};

/// Handle to a node of a [`NameTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Default)]
struct Node {
    label: Box<[u8]>,
    parent: Option<NodeId>,
    children: LabelTable,
    records: Vec<RecordId>,
    live: bool,
}

/// Hierarchy of names. Each node owns its children through a label table
/// and keeps a plain back link to its parent for upward walks.
pub struct NameTree {
    nodes: Vec<Node>,
    free: Vec<u32>,
}

impl Default for NameTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                live: true,
                ..Node::default()
            }],
            free: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Deepest existing node on the path to `name`, with the number of
    /// labels it matched.
    pub fn lookup(&self, name: &DomainName) -> (NodeId, usize) {
        let mut current = Self::ROOT;
        let mut matched = 0;
        for label in name.labels().rev() {
            match self.nodes[current.0 as usize].children.get(label) {
                Some(child) => {
                    current = child;
                    matched += 1;
                }
                None => break,
            }
        }
        (current, matched)
    }

    pub fn find_exact(&self, name: &DomainName) -> Option<NodeId> {
        let (node, matched) = self.lookup(name);
        (matched == name.label_count()).then_some(node)
    }

    pub fn find_or_create(&mut self, name: &DomainName) -> NodeId {
        let (mut current, matched) = self.lookup(name);
        let missing = name.label_count() - matched;
        for label in name.labels().take(missing).collect::<Vec<_>>().into_iter().rev() {
            current = self.add_child(current, label);
        }
        current
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0 as usize].parent
    }

    pub fn label(&self, node: NodeId) -> &[u8] {
        &self.nodes[node.0 as usize].label
    }

    /// Full owner name of `node`.
    pub fn name_of(&self, node: NodeId) -> Result<DomainName, DomainError> {
        let mut labels = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            labels.push(self.label(current));
            current = parent;
        }
        DomainName::from_labels(labels)
    }

    /// Label depth of `node`; the root is 0.
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    pub fn records(&self, node: NodeId) -> &[RecordId] {
        &self.nodes[node.0 as usize].records
    }

    pub fn records_mut(&mut self, node: NodeId) -> &mut Vec<RecordId> {
        &mut self.nodes[node.0 as usize].records
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[node.0 as usize].children.nodes()
    }

    pub fn has_children(&self, node: NodeId) -> bool {
        !self.nodes[node.0 as usize].children.is_empty()
    }

    /// Removes `node` and each ancestor that is left with neither records
    /// nor children. The root is kept.
    pub fn prune(&mut self, node: NodeId) -> usize {
        let mut removed = 0;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            let entry = &self.nodes[current.0 as usize];
            if !entry.records.is_empty() || !entry.children.is_empty() {
                break;
            }
            let label = std::mem::take(&mut self.nodes[current.0 as usize].label);
            self.nodes[parent.0 as usize].children.remove(&label);
            self.nodes[current.0 as usize] = Node::default();
            self.free.push(current.0);
            removed += 1;
            current = parent;
        }
        removed
    }

    /// Every live node, parents before children.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack = vec![Self::ROOT];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node));
        }
        out
    }

    pub fn is_live(&self, node: NodeId) -> bool {
        self.nodes
            .get(node.0 as usize)
            .map(|n| n.live)
            .unwrap_or(false)
    }

    fn add_child(&mut self, parent: NodeId, label: &[u8]) -> NodeId {
        let node = Node {
            label: label.into(),
            parent: Some(parent),
            live: true,
            ..Node::default()
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = node;
                NodeId(slot)
            }
            None => {
                self.nodes.push(node);
                NodeId((self.nodes.len() - 1) as u32)
            }
        };
        self.nodes[parent.0 as usize].children.insert(label, id);
        id
    }
}
