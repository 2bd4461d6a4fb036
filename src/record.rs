use std::collections::HashMap;

use serde::Serialize;

use crate::types::{Header, MessageDetail, MessageSummary};

/// Header names requested for every message.
pub const HEADER_ALLOW_LIST: [&str; 4] = ["Subject", "From", "To", "Date"];

/// Column names of the exported file, in order.
pub const CSV_HEADER: [&str; 7] = ["id", "threadId", "labelIds", "subject", "from", "to", "date"];

pub const LABEL_SEPARATOR: &str = ",";

/// Header name to value mapping for a single message.
///
/// Names match exactly (case-sensitive) and the first occurrence of a
/// repeated header wins.
#[derive(Debug, Default)]
pub struct HeaderLookup<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> HeaderLookup<'a> {
    pub fn new(headers: &'a [Header]) -> Self {
        let mut values = HashMap::with_capacity(headers.len());
        for header in headers {
            values
                .entry(header.name.as_str())
                .or_insert(header.value.as_str());
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.values.get(name).copied()
    }

    pub fn get_or(&self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }
}

/// One exported row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailRecord {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    #[serde(rename = "labelIds")]
    pub label_ids: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
}

impl EmailRecord {
    /// Builds a row from the listing entry and its fetched metadata.
    ///
    /// The listing endpoint usually omits labels, so the detail's labels and
    /// thread id fill in when the summary has none.
    pub fn from_parts(summary: &MessageSummary, detail: &MessageDetail, missing: &str) -> Self {
        let headers = HeaderLookup::new(detail.headers());

        let thread_id = if summary.thread_id.is_empty() {
            detail.thread_id.clone().unwrap_or_default()
        } else {
            summary.thread_id.clone()
        };

        let labels: &[String] = if summary.label_ids.is_empty() {
            detail.label_ids.as_deref().unwrap_or(&[])
        } else {
            &summary.label_ids
        };

        Self {
            id: summary.id.clone(),
            thread_id,
            label_ids: labels.join(LABEL_SEPARATOR),
            subject: headers.get_or("Subject", missing).to_string(),
            from: headers.get_or("From", missing).to_string(),
            to: headers.get_or("To", missing).to_string(),
            date: headers.get_or("Date", missing).to_string(),
        }
    }
}
