//! # Purchasing
//!
//! Purchase requests with a two-step approval, the departments they are
//! raised in and the employees who raise and approve them, all persisted
//! through [`opsdesk_odm`].
//!
//! Call [`register`] on the [`OdmBuilder`] so the entities are known to the
//! context before it is built.

mod department;
mod employee;
mod error;
mod purchase_request;

pub use crate::department::Department;
pub use crate::employee::{Employee, SearchKey};
pub use crate::error::{PurchasingError, PurchasingErrorExt};
pub use crate::purchase_request::{PurchaseRequest, PurchaseStatus};

use opsdesk_odm::OdmBuilder;

/// Adds every entity of this slice to `builder`.
#[must_use]
pub fn register(builder: OdmBuilder) -> OdmBuilder {
    builder.register::<PurchaseRequest>().register::<Department>().register::<Employee>()
}
