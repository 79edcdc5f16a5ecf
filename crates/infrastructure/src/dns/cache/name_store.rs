use super::record::StoredRecord;
use super::storage::{RecordId, RecordStore};
use super::tree::{NameTree, NodeId};
use super::zones::{ZoneId, ZoneTable};
use lodestone_dns_application::ports::{RecordVisitor, VisitedRecord};
use lodestone_dns_domain::{DomainError, DomainName, RecordClass, RecordType};
use tracing::debug;

/// Which tree an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Zone data and the cache.
    Main,
    /// Root hints consulted for priming.
    Hints,
}

/// The name/record database: two name trees sharing one record arena and
/// the zone descriptors.
#[derive(Default)]
pub struct NameStore {
    main: NameTree,
    hints: NameTree,
    records: RecordStore,
    zones: ZoneTable,
}

impl NameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self, table: Table) -> &NameTree {
        match table {
            Table::Main => &self.main,
            Table::Hints => &self.hints,
        }
    }

    fn tree_mut(&mut self, table: Table) -> &mut NameTree {
        match table {
            Table::Main => &mut self.main,
            Table::Hints => &mut self.hints,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn record(&self, id: RecordId) -> &StoredRecord {
        &self.records[id]
    }

    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut StoredRecord> {
        self.records.get_mut(id)
    }

    pub fn zones(&self) -> &ZoneTable {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut ZoneTable {
        &mut self.zones
    }

    pub fn lookup(&self, table: Table, name: &DomainName) -> (NodeId, usize) {
        self.tree(table).lookup(name)
    }

    pub fn find_exact(&self, table: Table, name: &DomainName) -> Option<NodeId> {
        self.tree(table).find_exact(name)
    }

    pub fn find_or_create(&mut self, table: Table, name: &DomainName) -> NodeId {
        self.tree_mut(table).find_or_create(name)
    }

    pub fn name_of(&self, table: Table, node: NodeId) -> Result<DomainName, DomainError> {
        self.tree(table).name_of(node)
    }

    /// Every record linked at `node`, stale or not, in list order.
    pub fn node_records(&self, table: Table, node: NodeId) -> &[RecordId] {
        self.tree(table).records(node)
    }

    /// Records at `node` still valid at `now_secs`.
    pub fn live_records(&self, table: Table, node: NodeId, now_secs: u64) -> Vec<RecordId> {
        self.node_records(table, node)
            .iter()
            .copied()
            .filter(|&id| !self.is_stale(id, now_secs))
            .collect()
    }

    /// Live records at `node` answering a `class`/`rtype` question.
    pub fn matching_records(
        &self,
        table: Table,
        node: NodeId,
        class: RecordClass,
        rtype: RecordType,
        now_secs: u64,
    ) -> Vec<RecordId> {
        self.live_records(table, node, now_secs)
            .into_iter()
            .filter(|&id| {
                let record = &self.records[id];
                class.matches(record.class) && rtype.matches(record.record_type)
            })
            .collect()
    }

    /// Allocates `record` and appends it to the node's list.
    pub fn insert_record(
        &mut self,
        table: Table,
        node: NodeId,
        record: StoredRecord,
    ) -> Result<RecordId, DomainError> {
        let id = self.records.allocate(record);
        self.records.activate(id)?;
        self.tree_mut(table).records_mut(node).push(id);
        Ok(id)
    }

    /// Unlinks `id` from the node's list. The node is not pruned.
    pub fn remove_record(&mut self, table: Table, node: NodeId, id: RecordId) -> Result<(), DomainError> {
        let list = self.tree_mut(table).records_mut(node);
        let pos = list.iter().position(|&r| r == id).ok_or_else(|| {
            DomainError::FatalInvariant(format!("record {} not linked at node {}", id.0, node.0))
        })?;
        list.remove(pos);
        self.records.deactivate(id)
    }

    /// Drops `node` and its ancestors while they hold nothing.
    pub fn prune(&mut self, table: Table, node: NodeId) -> usize {
        let tree = self.tree_mut(table);
        if !tree.is_live(node) {
            return 0;
        }
        tree.prune(node)
    }

    pub fn retain(&mut self, id: RecordId) -> Result<(), DomainError> {
        self.records.retain(id)
    }

    pub fn release(&mut self, id: RecordId) -> Result<(), DomainError> {
        self.records.release(id)
    }

    pub fn is_stale(&self, id: RecordId, now_secs: u64) -> bool {
        self.zones.is_stale(&self.records[id], now_secs)
    }

    /// Label depth of a zone apex; 0 for the cache.
    pub fn zone_clevel(&self, zone: ZoneId) -> u8 {
        self.zones.get(zone).map(|z| z.clevel()).unwrap_or(0)
    }

    /// Moves the first record of the `class`/`rtype` set behind the others.
    pub fn rotate(&mut self, table: Table, node: NodeId, class: RecordClass, rtype: RecordType) {
        let positions: Vec<usize> = self
            .tree(table)
            .records(node)
            .iter()
            .enumerate()
            .filter(|&(_, &id)| {
                let record = &self.records[id];
                record.class == class && record.record_type == rtype
            })
            .map(|(i, _)| i)
            .collect();
        if positions.len() < 2 {
            return;
        }
        let list = self.tree_mut(table).records_mut(node);
        let mut set: Vec<RecordId> = positions.iter().map(|&i| list[i]).collect();
        set.rotate_left(1);
        for (slot, id) in positions.into_iter().zip(set) {
            list[slot] = id;
        }
    }

    /// Hands every live record of `table` to `visitor`.
    pub fn for_each_record(&self, table: Table, visitor: &mut dyn RecordVisitor, now_secs: u64) {
        let tree = self.tree(table);
        for node in tree.walk() {
            if tree.records(node).is_empty() {
                continue;
            }
            let Ok(owner) = tree.name_of(node) else {
                continue;
            };
            for id in self.live_records(table, node, now_secs) {
                let record = &self.records[id];
                let rdata = record.rdata.to_string();
                visitor.visit(&VisitedRecord {
                    owner: &owner,
                    zone: record.zone.0,
                    class: record.class,
                    record_type: record.record_type,
                    ttl: record.ttl_at(now_secs),
                    credibility: record.credibility,
                    security: record.security,
                    hint: record.is_hint(),
                    negative: record.is_negative(),
                    rdata: &rdata,
                });
            }
        }
    }

    /// Unlinks expired cache records from both tables and prunes the nodes
    /// they leave empty. Returns the number of records removed.
    pub fn purge_stale(&mut self, now_secs: u64) -> Result<usize, DomainError> {
        let mut removed = 0;
        for table in [Table::Main, Table::Hints] {
            let nodes = self.tree(table).walk();
            for &node in nodes.iter().rev() {
                if !self.tree(table).is_live(node) {
                    continue;
                }
                let stale: Vec<RecordId> = self
                    .node_records(table, node)
                    .iter()
                    .copied()
                    .filter(|&id| self.records[id].is_cache() && self.is_stale(id, now_secs))
                    .collect();
                for id in stale {
                    self.remove_record(table, node, id)?;
                    removed += 1;
                }
                self.prune(table, node);
            }
        }
        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "Purged stale cache records");
        }
        Ok(removed)
    }
}
