//! Paginated review queue over one domain table.
//!
//! The store evaluates a bounded number of items per call and may return fewer
//! matches than requested (or none) while still having more data. The queue keeps
//! reading store pages until the caller's limit is met or the table is exhausted,
//! so callers only ever see short pages at the very end.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::domain::{DomainName, DomainRecord, QualificationStatus, Round};
use super::errors::WorkflowError;
use super::repository::{decode, RecruitmentStores};
use crate::store::{Condition, PageToken};

/// Sentinel filter value selecting records without a decision.
pub const UNMARKED: &str = "unmarked";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Any,
    Unmarked,
    Is(QualificationStatus),
}

impl StatusFilter {
    pub fn parse(raw: Option<&str>) -> Result<Self, WorkflowError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(StatusFilter::Any),
            Some(value) if value.eq_ignore_ascii_case(UNMARKED) => Ok(StatusFilter::Unmarked),
            Some(value) => Ok(StatusFilter::Is(value.parse()?)),
        }
    }

    pub fn condition(self, round: Round) -> Option<Condition> {
        let path = DomainRecord::status_path(round);
        match self {
            StatusFilter::Any => None,
            StatusFilter::Unmarked => Some(Condition::MissingOrNull(path)),
            StatusFilter::Is(status) => Some(Condition::Equals(path, status.to_value())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewQuery {
    pub domain: String,
    pub round: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page_token: Option<PageToken>,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub email: String,
    pub record: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPage {
    pub items: Vec<ReviewItem>,
    pub next_page_token: Option<PageToken>,
}

impl ReviewPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_page_token: None,
        }
    }

    /// Items decoded into typed records, skipping anything malformed.
    pub fn records(&self) -> Vec<DomainRecord> {
        self.items
            .iter()
            .filter_map(|item| match &item.record {
                Value::Object(map) => decode(map.clone()).ok(),
                _ => None,
            })
            .collect()
    }
}

pub struct ReviewQueue {
    stores: Arc<RecruitmentStores>,
    store_page_size: usize,
}

impl ReviewQueue {
    pub fn new(stores: Arc<RecruitmentStores>, store_page_size: usize) -> Self {
        Self {
            stores,
            store_page_size: store_page_size.max(1),
        }
    }

    pub async fn scan(&self, query: ReviewQuery) -> Result<ReviewPage, WorkflowError> {
        if query.limit <= 0 {
            return Ok(ReviewPage::empty());
        }
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);

        let domain = DomainName::parse(&query.domain)?;
        let round = Round::new(query.round)?;
        let filter = StatusFilter::parse(query.status.as_deref())?.condition(round);
        let records = self
            .stores
            .domains
            .for_domain(&domain)
            .ok_or_else(|| WorkflowError::UnknownDomain(domain.to_string()))?;

        let mut items = Vec::new();
        let mut cursor = query.page_token;
        let mut store_pages = 0usize;
        loop {
            let remaining = limit - items.len();
            let page_size = self.store_page_size.min(remaining);
            let page = records
                .scan(filter.as_ref(), cursor.as_ref(), page_size)
                .await?;
            store_pages += 1;

            for (key, item) in page.items {
                items.push(ReviewItem {
                    email: key,
                    record: Value::Object(item),
                });
            }
            cursor = page.next;

            if items.len() >= limit || cursor.is_none() {
                break;
            }
        }

        // A page never evaluates more than `remaining` items, so it cannot overshoot.
        debug_assert!(items.len() <= limit);
        debug!(%domain, %round, store_pages, returned = items.len(), "review scan finished");

        Ok(ReviewPage {
            items,
            next_page_token: cursor,
        })
    }
}
