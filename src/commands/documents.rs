use std::path::Path;

use image::GenericImageView;

use super::ChatSession;
use crate::doc_processor::{self, ExtractedContent, UploadedDocument};
use crate::error::ChatError;
use crate::llm::{prompts, ChatModel};

/// What the user sees right after an upload.
#[derive(Debug)]
pub struct OpenedDocument {
    pub name: String,
    pub kind: &'static str,
    pub preview: String,
    /// Model description of an uploaded image, when requested.
    pub description: Option<Result<String, ChatError>>,
}

impl<M: ChatModel> ChatSession<M> {
    /// Read, extract and register a file from disk.
    pub async fn open(&mut self, path: &Path) -> Result<OpenedDocument, ChatError> {
        let upload = UploadedDocument::read(path, self.max_upload_bytes)?;
        self.upload(upload).await
    }

    /// Extract an upload and make it the current content for its name.
    ///
    /// Re-uploading a name replaces its content but keeps its history.
    pub async fn upload(&mut self, upload: UploadedDocument) -> Result<OpenedDocument, ChatError> {
        let content = doc_processor::extract(&upload)?;
        tracing::info!(
            document = %upload.name,
            file_type = upload.kind.as_str(),
            bytes = upload.bytes.len(),
            content = content.kind_label(),
            "Document extracted"
        );

        let preview = content.preview(self.preview_chars);
        let kind = content.kind_label();
        let dimensions = match &content {
            ExtractedContent::Image(img) => Some(img.dimensions()),
            _ => None,
        };
        self.documents.insert(upload.name.clone(), content);

        let description = match dimensions {
            Some((w, h)) if self.describe_images => {
                Some(self.describe_image(&upload.name, w, h).await)
            }
            _ => None,
        };

        Ok(OpenedDocument {
            name: upload.name,
            kind,
            preview,
            description,
        })
    }

    async fn describe_image(&self, name: &str, width: u32, height: u32) -> Result<String, ChatError> {
        let request = self.request(prompts::describe_image(name, width, height));
        self.model.complete(&request).await.map_err(|e| {
            tracing::warn!(document = %name, error = %e, "Image description failed");
            ChatError::from(e)
        })
    }
}
