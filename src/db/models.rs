use serde::{Deserialize, Serialize};

/// One completed exchange about a document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatTurn {
    pub id: String,
    pub document: String,
    pub query: String,
    pub response: String,
    pub created_at: String,
}
