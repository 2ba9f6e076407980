pub mod analytics;
pub mod app_metadata;
pub mod audit;
pub mod auth;
pub mod campaigns;
pub mod csv_import;
pub mod mailgun;

pub use analytics::Analytics;
pub use app_metadata::{AppMetadataFetcher, Enrichment};
pub use auth::{verify_admin_token, UnsubscribeTokens, ADMIN_COOKIE};
pub use campaigns::{handle_mail_webhook, send_campaign};
pub use csv_import::{import_subscribers, ImportOptions, ImportResult};
pub use mailgun::{MailgunClient, MailgunSettings};
