//! Message templates for the three kinds of request the session makes.

use super::ChatMessage;
use crate::table::Table;

const TEXT_SYSTEM: &str = "You are a chatbot that helps answer questions based on the attached \
document (.docx, .txt, .xlsx, .csv, .pdf, image file). You can also perform math calculations, \
write code and answer questions.";

const PLOT_SYSTEM: &str = "You are a code assistant skilled in Python and Plotly.";

const IMAGE_SYSTEM: &str = "You are a multimodal assistant capable of processing images.";

/// Variable the generated code reads the table from.
pub const DATA_VARIABLE: &str = "df";
/// Variable the generated code must assign the figure to.
pub const FIGURE_VARIABLE: &str = "fig";

pub fn text_query(context: &str, query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(TEXT_SYSTEM),
        ChatMessage::user(format!(
            "Context: {}\n\nQuestion: {}\n\nDetailed Answer:",
            context, query
        )),
    ]
}

pub fn plot_code(query: &str, table: &Table) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(PLOT_SYSTEM),
        ChatMessage::user(format!(
            "Create Python code using Plotly to {}\n\n{}\n\n\
             The data is already loaded as a pandas DataFrame named `{}`; do not read any files. \
             `pd`, `px` (plotly.express) and `go` (plotly.graph_objects) are available. \
             Assign the final figure to a variable named `{}` and do not call `fig.show()`. \
             Return the code in a single ```python block.",
            query,
            table.summary(),
            DATA_VARIABLE,
            FIGURE_VARIABLE
        )),
    ]
}

pub fn describe_image(name: &str, width: u32, height: u32) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(IMAGE_SYSTEM),
        ChatMessage::user(format!(
            "Describe this image: {} ({}x{} pixels)",
            name, width, height
        )),
    ]
}
