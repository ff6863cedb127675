use std::path::PathBuf;

use super::ChatSession;
use crate::db::models::ChatTurn;
use crate::error::ChatError;
use crate::llm::{prompts, ChatModel};
use crate::router::Route;

/// Recorded as the bot's answer for a turn that produced a chart.
pub const PLOT_REPLY: &str = "Plot generated successfully.";

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Chart { code: String, path: PathBuf },
}

impl<M: ChatModel> ChatSession<M> {
    /// Answer one query about an open document.
    ///
    /// Only successful turns are recorded. Plot requests that fail local
    /// validation never reach the model.
    pub async fn ask(&self, document: &str, query: &str) -> Result<Reply, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }
        let content = self.document(document)?;
        let route = self.router.route(query, content)?;
        tracing::info!(document = %document, route = ?route, "Handling query");

        match route {
            Route::Text => {
                let history = self.store.recent(document, self.context.max_turns())?;
                let context = self.context.build(content, &history);
                let request = self.request(prompts::text_query(&context, query));

                let response = self.model.complete(&request).await?;
                self.store.append_turn(document, query, &response)?;
                Ok(Reply::Text(response))
            }
            Route::Plot => {
                let table = content.as_table().ok_or(ChatError::NonTabularPlotRequest)?;
                let request = self.request(prompts::plot_code(query, table));

                let response = self.model.complete(&request).await?;
                let chart = self.plots.run(&response, table).await?;
                let path = chart
                    .write_html(&self.chart_dir, document)
                    .map_err(|e| ChatError::ChartOutput(e.to_string()))?;
                tracing::info!(document = %document, path = %path.display(), "Chart written");

                self.store.append_turn(document, query, PLOT_REPLY)?;
                Ok(Reply::Chart {
                    code: chart.code,
                    path,
                })
            }
        }
    }

    /// Every recorded turn for a document, oldest first.
    pub fn history(&self, document: &str) -> Result<Vec<ChatTurn>, ChatError> {
        Ok(self.store.history(document)?)
    }
}
