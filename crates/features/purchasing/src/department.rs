use crate::error::Result;
use opsdesk_odm::{Model, Odm, Repository, doc, model};

model! {
    /// Organizational unit employees belong to.
    pub struct Department {
        name: String => Text [indexed, required],
        description: String => Text,
    }
}

impl Model for Department {
    const COLLECTION: &'static str = "departments";
}

impl Department {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), live: Some(true), ..Self::default() }
    }

    /// Live department called `name`, through the read cache.
    pub fn by_name(odm: &Odm, name: &str) -> Result<Option<Self>> {
        Ok(Self::cache_first(odm, doc! { "name" => name, "live" => true }, &[], None)?)
    }
}
