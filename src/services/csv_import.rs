use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{find_subscriber, insert_imported_subscriber, merge_imported_subscriber, parse_datetime, Repository};
use crate::error::Result;
use crate::models::{merge_tags, normalize_email};

pub const DEFAULT_SOURCE: &str = "manual";

/// Header names tried in order for each logical column.
const CANDIDATES: &[(&str, &[&str])] = &[
    ("email", &["email", "Email", "email_address", "Email Address", "recipient_email"]),
    ("name", &["name", "Name", "full_name", "Full Name"]),
    ("created_at", &["created", "created_at", "Created At", "timestamp", "Timestamp"]),
    ("tags", &["tags", "Tags", "tag", "Tag"]),
    ("source", &["source", "Source"]),
];

#[derive(Debug, Clone, Deserialize)]
pub struct ImportOptions {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub extra_tags: Vec<String>,
    /// Logical column -> header name, overriding detection when the header exists.
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            source: default_source(),
            extra_tags: Vec::new(),
            mapping: HashMap::new(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ImportResult {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub mapping: BTreeMap<String, String>,
}

/// One CSV record reduced to the fields the merge needs.
#[derive(Debug, Clone)]
struct ImportRow {
    email: String,
    name: Option<String>,
    created_at: Option<DateTime<Utc>>,
    tags: String,
    source: Option<String>,
}

/// Explicit mapping wins when its header exists; otherwise the first matching candidate.
pub fn resolve_mapping(headers: &[String], explicit: &HashMap<String, String>) -> BTreeMap<String, String> {
    CANDIDATES
        .iter()
        .filter_map(|(field, candidates)| {
            let chosen = explicit
                .get(*field)
                .map(|h| h.trim())
                .filter(|h| headers.iter().any(|header| header == h))
                .map(|h| h.to_string())
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|candidate| headers.iter().any(|header| header == *candidate))
                        .map(|c| c.to_string())
                })?;
            Some((field.to_string(), chosen))
        })
        .collect()
}

fn column(record: &csv::StringRecord, headers: &[String], header: Option<&String>) -> Option<String> {
    let header = header?;
    let idx = headers.iter().position(|h| h == header)?;
    record
        .get(idx)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Import subscribers from CSV bytes, merging on email.
///
/// A dry run executes the same statements in a transaction that is rolled back, so its counts
/// always equal those of the real run.
pub async fn import_subscribers(
    repository: &Repository,
    data: &[u8],
    options: ImportOptions,
) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mapping = resolve_mapping(&headers, &options.mapping);
    let extra_tags = options.extra_tags.join(",");

    let mut result = ImportResult::default();
    let mut rows = Vec::new();

    for (line, record) in reader.records().enumerate() {
        result.total += 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                result.skipped += 1;
                result.errors.push(format!("Row {}: {}", line + 1, e));
                continue;
            }
        };

        let Some(email) = column(&record, &headers, mapping.get("email"))
            .as_deref()
            .and_then(normalize_email)
        else {
            result.skipped += 1;
            continue;
        };

        rows.push(ImportRow {
            email,
            name: column(&record, &headers, mapping.get("name")),
            created_at: column(&record, &headers, mapping.get("created_at"))
                .as_deref()
                .and_then(parse_datetime),
            tags: merge_tags([
                extra_tags.as_str(),
                column(&record, &headers, mapping.get("tags"))
                    .unwrap_or_default()
                    .as_str(),
            ]),
            source: column(&record, &headers, mapping.get("source")),
        });
    }

    if result.total == 0 {
        return Ok(ImportResult::default());
    }
    result.mapping = mapping;

    let default_source = options.source;
    let dry_run = options.dry_run;
    let (inserted, updated) = repository
        .conn()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            let mut updated = 0;

            for row in &rows {
                let source = row.source.as_deref().unwrap_or(&default_source);
                match find_subscriber(&tx, &row.email)? {
                    Some(existing) => {
                        merge_imported_subscriber(
                            &tx,
                            &existing,
                            row.name.as_deref(),
                            source,
                            &row.tags,
                            row.created_at,
                        )?;
                        updated += 1;
                    }
                    None => {
                        insert_imported_subscriber(
                            &tx,
                            &row.email,
                            row.name.as_deref(),
                            source,
                            &row.tags,
                            row.created_at,
                        )?;
                        inserted += 1;
                    }
                }
            }

            if dry_run {
                tx.rollback()?;
            } else {
                tx.commit()?;
            }
            Ok((inserted, updated))
        })
        .await?;

    result.inserted = inserted;
    result.updated = updated;

    tracing::info!(
        "CSV import{}: {} rows, {} inserted, {} updated, {} skipped",
        if dry_run { " (dry run)" } else { "" },
        result.total,
        result.inserted,
        result.updated,
        result.skipped
    );

    Ok(result)
}
