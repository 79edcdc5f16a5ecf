mod record_class;
mod record_type;
mod security;

pub use record_class::RecordClass;
pub use record_type::RecordType;
pub use security::SecurityState;
