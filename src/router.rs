//! Decides whether a query goes to the text Q&A path or the plotting path.
//!
//! All checks are local, so a rejected plot request never reaches the model.

use crate::doc_processor::ExtractedContent;
use crate::error::ChatError;

pub const PLOT_KEYWORDS: [&str; 8] = [
    "plot",
    "chart",
    "graph",
    "visualize",
    "show",
    "draw",
    "depict",
    "represent",
];

pub const DEFAULT_REQUIRED_COLUMN: &str = "engagement_rate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Text,
    Plot,
}

/// Substring match against the lowercased query.
pub fn is_plot_request(query: &str) -> bool {
    let query = query.to_lowercase();
    PLOT_KEYWORDS.iter().any(|k| query.contains(k))
}

#[derive(Debug, Clone)]
pub struct QueryRouter {
    required_column: String,
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_COLUMN)
    }
}

impl QueryRouter {
    pub fn new(required_column: impl Into<String>) -> Self {
        Self {
            required_column: required_column.into(),
        }
    }

    pub fn route(&self, query: &str, content: &ExtractedContent) -> Result<Route, ChatError> {
        if !is_plot_request(query) {
            return Ok(Route::Text);
        }
        match content {
            ExtractedContent::Table(table) if table.has_column(&self.required_column) => {
                Ok(Route::Plot)
            }
            ExtractedContent::Table(_) => {
                Err(ChatError::MissingColumn(self.required_column.clone()))
            }
            ExtractedContent::Text(_) | ExtractedContent::Image(_) => {
                Err(ChatError::NonTabularPlotRequest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use image::DynamicImage;

    fn table(header: &str) -> ExtractedContent {
        ExtractedContent::Table(Table::from_csv(format!("{}\n", header).as_bytes()).unwrap())
    }

    #[test]
    fn test_keywords_are_case_insensitive_substrings() {
        assert!(is_plot_request("PLOT engagement over time"));
        assert!(is_plot_request("can you visualize this?"));
        assert!(is_plot_request("Showcase the trend"));
        assert!(!is_plot_request("what is the average?"));
    }

    #[test]
    fn test_plot_with_required_column() {
        let router = QueryRouter::default();
        let content = table("date,engagement_rate");
        assert_eq!(
            router.route("plot engagement over time", &content).unwrap(),
            Route::Plot
        );
    }

    #[test]
    fn test_plot_without_required_column() {
        let router = QueryRouter::default();
        let content = table("date,likes");
        assert!(matches!(
            router.route("plot engagement over time", &content),
            Err(ChatError::MissingColumn(c)) if c == "engagement_rate"
        ));
    }

    #[test]
    fn test_plot_against_text_or_image() {
        let router = QueryRouter::default();
        let text = ExtractedContent::Text("quarterly report".into());
        let image = ExtractedContent::Image(DynamicImage::new_rgb8(1, 1));
        assert!(matches!(
            router.route("draw a chart", &text),
            Err(ChatError::NonTabularPlotRequest)
        ));
        assert!(matches!(
            router.route("draw a chart", &image),
            Err(ChatError::NonTabularPlotRequest)
        ));
    }

    #[test]
    fn test_non_plot_query_always_text() {
        let router = QueryRouter::default();
        assert_eq!(router.route("summarize", &table("a")).unwrap(), Route::Text);
        assert_eq!(
            router
                .route("summarize", &ExtractedContent::Text(String::new()))
                .unwrap(),
            Route::Text
        );
    }

    #[test]
    fn test_configured_column() {
        let router = QueryRouter::new("revenue");
        assert_eq!(
            router.route("chart revenue", &table("month,revenue")).unwrap(),
            Route::Plot
        );
        assert!(router
            .route("chart revenue", &table("month,engagement_rate"))
            .is_err());
    }
}
