use crate::error::Result;
use opsdesk_odm::{
    CacheKeyTemplate, Document, Model, ObjectId, Odm, ReadOptions, Regex, Repository, SortOrder,
    Value, doc, model,
};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Field an employee search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SearchKey {
    Name,
    /// Matched exactly, never as a pattern.
    EmpId,
    Phone,
    Email,
}

impl SearchKey {
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::EmpId => "emp_id",
            Self::Phone => "phone",
            Self::Email => "email",
        }
    }

    fn condition(self, term: &str) -> Document {
        let value = match self {
            Self::EmpId => Value::from(term),
            _ => Value::from(Regex::insensitive(regex::escape(term))),
        };
        doc! { self.field() => value }
    }
}

model! {
    pub struct Employee {
        name: String => Text [indexed, required],
        emp_id: String => Text [indexed],
        email: String => Text [indexed],
        phone: String => Text,
        department_id: ObjectId => Identifier [indexed],
        user_id: ObjectId => Identifier [indexed],
        salary: f64 => Decimal,
        /// Remaining leave days.
        leaves: i64 => Integer,
        designation: String => Text,
    }
}

impl Model for Employee {
    const COLLECTION: &'static str = "employees";

    fn cache_keys() -> Vec<CacheKeyTemplate> {
        vec![
            CacheKeyTemplate::by_id(),
            CacheKeyTemplate::new().bind("user_id", "%s"),
            CacheKeyTemplate::new().bind("department_id", "%s"),
        ]
    }
}

impl Employee {
    /// Live records whose `key` field matches `term`: case-insensitive
    /// substring for text keys, exact for the employee number. Without a key
    /// every searchable field is tried. A blank term matches every live record.
    #[must_use]
    pub fn search_filter(key: Option<SearchKey>, term: &str) -> Document {
        let term = term.trim();
        let mut filter = doc! { "live" => true };
        if term.is_empty() {
            return filter;
        }
        match key {
            Some(key) => filter.extend(key.condition(term)),
            None => {
                let any: Vec<Value> =
                    SearchKey::iter().map(|key| Value::from(key.condition(term))).collect();
                filter.insert("$or".to_owned(), Value::from(any));
            },
        }
        filter
    }

    pub fn search(
        odm: &Odm,
        key: Option<SearchKey>,
        term: &str,
        options: &ReadOptions,
    ) -> Result<Vec<Self>> {
        Ok(Self::select_all(odm, Self::search_filter(key, term), &[], options)?.into_vec())
    }

    /// Staff of a department sorted by name, through the read cache.
    pub fn of_department(odm: &Odm, department_id: ObjectId) -> Result<Vec<Self>> {
        let filter = doc! { "department_id" => department_id };
        let mut staff = Self::cache_all(odm, filter, &[])?.into_vec();
        staff.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(staff)
    }

    /// Employee record linked to a login.
    pub fn for_user(odm: &Odm, user_id: ObjectId) -> Result<Option<Self>> {
        Ok(Self::cache_first(odm, doc! { "user_id" => user_id }, &[], None)?)
    }

    /// Deducts `days` from the leave balance and saves.
    pub fn take_leave(&mut self, odm: &Odm, days: i64) -> Result<i64> {
        let left = self.leaves.unwrap_or_default() - days;
        self.leaves = Some(left);
        self.save(odm)?;
        Ok(left)
    }

    #[must_use]
    pub fn listing() -> ReadOptions {
        ReadOptions::new().order("name", SortOrder::Asc)
    }
}
