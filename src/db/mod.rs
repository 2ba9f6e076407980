mod audit;
mod campaigns;
mod events;
mod giveaways;
mod items;
mod repository;
mod schema;
mod settings;
mod subscribers;
mod summaries;

pub use audit::AuditEntry;
pub use repository::{now_timestamp, parse_datetime, timestamp, Repository};
pub use subscribers::SubscriberCounts;
pub use summaries::NewSummary;

pub(crate) use subscribers::{find_subscriber, insert_imported_subscriber, merge_imported_subscriber};
