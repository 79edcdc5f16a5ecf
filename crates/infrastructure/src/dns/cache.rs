//! In-memory name and record database.

pub mod label_table;
pub mod name_store;
pub mod negative_cache;
pub mod record;
pub mod storage;
pub mod tree;
pub mod zones;

pub use name_store::{NameStore, Table};
pub use negative_cache::NegativeCache;
pub use record::{NegativeInfo, NegativeKind, RecordFlags, StoredRecord};
pub use storage::{RecordId, RecordStore};
pub use tree::{NameTree, NodeId};
pub use zones::{Zone, ZoneId, ZoneKind, ZoneTable};
