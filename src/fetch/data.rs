#[derive(Debug, PartialEq, serde::Deserialize)]
pub struct PagedResponse<D> {
    #[serde(rename = "nextPageCursor", default)]
    pub cursor: Option<String>,
    pub data: D,
}

pub type ItemsPage = PagedResponse<Vec<serde_json::Value>>;

impl<D> PagedResponse<D> {
    /// The cursor for the following page, `None` once the listing is exhausted
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Upstream APIs report application errors as an `errors` array inside a
/// successful response
pub fn embedded_errors(body: &serde_json::Value) -> Option<&serde_json::Value> {
    body.get("errors")
        .filter(|errors| errors.as_array().map_or(false, |e| !e.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cursor_variants() {
        let page: ItemsPage =
            serde_json::from_value(json!({ "data": [1], "nextPageCursor": "abc" })).unwrap();
        assert_eq!(page.next_cursor(), Some("abc"));

        let page: ItemsPage =
            serde_json::from_value(json!({ "data": [], "nextPageCursor": "" })).unwrap();
        assert_eq!(page.next_cursor(), None);

        let page: ItemsPage =
            serde_json::from_value(json!({ "data": [], "nextPageCursor": null })).unwrap();
        assert_eq!(page.next_cursor(), None);

        let page: ItemsPage = serde_json::from_value(json!({ "data": [] })).unwrap();
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn missing_data_is_not_a_page() {
        assert!(serde_json::from_value::<ItemsPage>(json!({ "nextPageCursor": "x" })).is_err());
        assert!(serde_json::from_value::<ItemsPage>(json!({ "data": {} })).is_err());
    }

    #[test]
    fn error_payloads() {
        let body = json!({ "errors": [{ "code": 1, "message": "The user is invalid." }] });
        assert!(embedded_errors(&body).is_some());

        assert!(embedded_errors(&json!({ "errors": [] })).is_none());
        assert!(embedded_errors(&json!({ "data": [] })).is_none());
    }
}
