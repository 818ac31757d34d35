pub mod maintenance;
pub mod query_log;
pub mod tracking_store;

pub use maintenance::drop_all_objects;
pub use query_log::{MigrationSession, QueryLog, is_transaction_control};
pub use tracking_store::{TrackingRecord, TrackingStore, TrackingTable, quote_identifier};
