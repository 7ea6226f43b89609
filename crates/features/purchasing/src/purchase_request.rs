//! Purchase requests and their two-step approval flow.
//!
//! A request starts `pending`. The first approval records `approver1_id`, the
//! second (by a different user) records `approver2_id` and moves it to
//! `approved`. A denial stops the flow; only approved requests can be paid.

use crate::error::{PurchasingError, Result};
use chrono::{DateTime, Utc};
use opsdesk_odm::{
    CacheKeyTemplate, ComputedFields, Model, ObjectId, Odm, Repository, Value, doc, model,
};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::debug;

/// Lifecycle of a purchase request, stored as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Approved,
    Denied,
    Paid,
}

model! {
    pub struct PurchaseRequest {
        status: String => Text [indexed, required],
        payment_date: DateTime<Utc> => Date,
        approver1_id: ObjectId => Identifier [indexed],
        approver2_id: ObjectId => Identifier [indexed],
        requester_id: ObjectId => Identifier [indexed, required],
        notes: String => Text,
        denial_reason: String => Text,
        /// Line items, one document each (`name`, `qty`, `price`).
        items: Vec<Value> => Array,
        /// Documents attached by the import job; not part of the audit trail.
        doc_inserted: Vec<Value> => Array,
    }
}

impl Model for PurchaseRequest {
    const COLLECTION: &'static str = "purchasereq";

    fn cache_keys() -> Vec<CacheKeyTemplate> {
        vec![CacheKeyTemplate::by_id(), CacheKeyTemplate::new().bind("requester_id", "%s")]
    }

    fn timeline_preserve() -> &'static [&'static str] {
        &["status"]
    }

    fn timeline_discard() -> &'static [&'static str] {
        &["doc_inserted"]
    }

    fn as_computed(&self) -> Option<&dyn ComputedFields> {
        Some(self)
    }
}

impl ComputedFields for PurchaseRequest {
    fn computed(&self) -> Vec<(&'static str, Value)> {
        vec![("item_count", Value::from(self.items.as_ref().map_or(0, Vec::len)))]
    }
}

impl PurchaseRequest {
    /// Unsaved pending request of `requester_id`.
    #[must_use]
    pub fn draft(requester_id: ObjectId, items: Vec<Value>) -> Self {
        Self {
            status: Some(PurchaseStatus::Pending.to_string()),
            requester_id: Some(requester_id),
            items: Some(items),
            live: Some(true),
            ..Self::default()
        }
    }

    /// Parsed status; `None` for requests without one.
    pub fn current_status(&self) -> Result<Option<PurchaseStatus>> {
        self.status
            .as_deref()
            .map(|s| {
                PurchaseStatus::from_str(s).map_err(|_| PurchasingError::Internal {
                    message: format!("unknown purchase status '{s}'").into(),
                    context: self.id.map(|id| id.to_hex().into()),
                })
            })
            .transpose()
    }

    fn expect_status(&self, expected: PurchaseStatus, action: &'static str) -> Result<()> {
        match self.current_status()? {
            Some(status) if status == expected => Ok(()),
            other => Err(PurchasingError::Transition {
                message: match other {
                    Some(status) => format!("cannot {action} a request that is {status}"),
                    None => format!("cannot {action} a request without status"),
                }
                .into(),
                context: self.id.map(|id| id.to_hex().into()),
            }),
        }
    }

    /// Records one approval. Returns the status after saving.
    pub fn approve(&mut self, odm: &Odm, approver: ObjectId) -> Result<PurchaseStatus> {
        self.expect_status(PurchaseStatus::Pending, "approve")?;
        if self.requester_id == Some(approver) {
            return Err(PurchasingError::Transition {
                message: "requesters cannot approve their own request".into(),
                context: Some(approver.to_hex().into()),
            });
        }

        let status = match self.approver1_id {
            None => {
                self.approver1_id = Some(approver);
                PurchaseStatus::Pending
            },
            Some(first) if first == approver => {
                return Err(PurchasingError::Transition {
                    message: "the second approval must come from another approver".into(),
                    context: Some(approver.to_hex().into()),
                });
            },
            Some(_) => {
                self.approver2_id = Some(approver);
                PurchaseStatus::Approved
            },
        };
        self.status = Some(status.to_string());
        self.save(odm)?;
        debug!(id = ?self.id, %status, "purchase request approved");
        Ok(status)
    }

    pub fn deny(&mut self, odm: &Odm, reason: impl Into<String>) -> Result<()> {
        self.expect_status(PurchaseStatus::Pending, "deny")?;
        self.status = Some(PurchaseStatus::Denied.to_string());
        self.denial_reason = Some(reason.into());
        self.save(odm)?;
        Ok(())
    }

    pub fn mark_paid(&mut self, odm: &Odm, on: DateTime<Utc>) -> Result<()> {
        self.expect_status(PurchaseStatus::Approved, "pay")?;
        self.status = Some(PurchaseStatus::Paid.to_string());
        self.payment_date = Some(on);
        self.save(odm)?;
        Ok(())
    }

    /// Requests of `requester_id`, newest first, through the read cache.
    pub fn of_requester(odm: &Odm, requester_id: ObjectId) -> Result<Vec<Self>> {
        let filter = doc! { "requester_id" => requester_id };
        let mut requests = Self::cache_all(odm, filter, &[])?.into_vec();
        requests.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(requests)
    }

    /// Number of requests waiting for approval.
    pub fn pending_count(odm: &Odm) -> Result<u64> {
        let filter = doc! { "status" => PurchaseStatus::Pending.as_ref() };
        Ok(Self::count(odm, filter)?)
    }
}
