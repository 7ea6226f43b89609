use crate::value::Document;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sort direction of a single sort key.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Maps the `1` / `-1` direction convention.
    #[must_use]
    pub const fn from_sign(sign: i64) -> Self {
        if sign < 0 { Self::Desc } else { Self::Asc }
    }

    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

/// Options accepted by `find`, `find_one` and `count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Vec<(String, SortOrder)>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub max_time: Option<Duration>,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub const fn max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }
}

/// Acknowledgement of `update_one`, `update_many` and `replace_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Acknowledgement of `delete_one` and `delete_many`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sort_order_parses_both_conventions() {
        assert_eq!(SortOrder::from_str("DESC").unwrap(), SortOrder::Desc);
        assert_eq!(SortOrder::from_sign(-1), SortOrder::Desc);
        assert_eq!(SortOrder::from_sign(1), SortOrder::Asc);
        assert_eq!(SortOrder::Desc.sign(), -1);
        assert_eq!(SortOrder::Asc.to_string(), "asc");
    }
}
