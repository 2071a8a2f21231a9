use chrono::NaiveDate;

/// A show row read from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct Show {
    pub id: i64,
    pub date: NaiveDate,
    pub url: Option<String>,
    /// Id of the original show when this one is a rebroadcast.
    pub repeat_of: Option<i64>,
}

impl Show {
    /// True when `showurl` is NULL or blank.
    pub fn is_missing_url(&self) -> bool {
        self.url.as_deref().is_none_or(|u| u.trim().is_empty())
    }
}

/// A show that can supply a URL to another show.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedShow {
    pub id: i64,
    pub date: NaiveDate,
    pub url: String,
}
