use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateAuthorRequest {
    #[serde(default)]
    pub name: String,
    pub bio: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub birthdate: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAuthorRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub birthdate: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_date: Option<OffsetDateTime>,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_date: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BorrowRequest {
    /// Loan period in days; defaults to 14 when omitted.
    pub days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_book_accepts_rfc3339_dates() {
        let req: CreateBookRequest = serde_json::from_str(
            r#"{"isbn":"978-0","title":"T","published_date":"2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(req.published_date.is_some());
        assert!(req.author_id.is_none());
    }

    #[test]
    fn borrow_request_days_default_to_none() {
        let req: BorrowRequest = serde_json::from_str("{}").unwrap();
        assert!(req.days.is_none());
    }
}
