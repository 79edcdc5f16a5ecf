use crate::dns::cache::{NameStore, NodeId, RecordId, Table};
use crate::dns::wire::RecordTypeMapper;
use hickory_proto::dnssec::rdata::DNSSECRData;
use hickory_proto::rr::RData;
use lodestone_dns_domain::{RecordType, RrsetOrder};

/// Order in which one RRset is written. `Cyclic` hands back the current
/// list order and then rotates the set at its node, so the next answer
/// starts one record further along.
pub fn order_rrset(
    store: &mut NameStore,
    node: NodeId,
    mut ids: Vec<RecordId>,
    order: RrsetOrder,
) -> Vec<RecordId> {
    if ids.len() < 2 {
        return ids;
    }
    match order {
        RrsetOrder::Fixed => ids,
        RrsetOrder::Random => {
            fastrand::shuffle(&mut ids);
            ids
        }
        RrsetOrder::Cyclic => {
            let first = store.record(ids[0]);
            let (class, rtype) = (first.class, first.record_type);
            store.rotate(Table::Main, node, class, rtype);
            ids
        }
    }
}

/// Type an RRSIG record covers.
pub fn covered_type(rdata: &RData) -> Option<RecordType> {
    match rdata {
        RData::DNSSEC(DNSSECRData::RRSIG(sig)) => Some(RecordTypeMapper::from_hickory(sig.input().type_covered)),
        _ => None,
    }
}

/// Moves signatures behind the data they cover, keeping relative order.
pub fn signatures_last<T>(records: &mut Vec<T>, record_type: impl Fn(&T) -> RecordType) {
    let (data, signatures): (Vec<T>, Vec<T>) = records
        .drain(..)
        .partition(|r| !record_type(r).is_signature());
    records.extend(data);
    records.extend(signatures);
}
