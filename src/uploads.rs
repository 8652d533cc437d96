//! Attachment staging and file ingestion
//!
//! Information Hiding:
//! - File type detection hidden behind `classify`
//! - Image encoding (base64) hidden from callers
//! - Each file is read independently; one failure never aborts the batch

use crate::core::message::Message;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

const TEXT_EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("json", "application/json"),
];

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
];

/// Text document staged as model context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAttachment {
    pub name: String,
    pub content: String,
    pub mime: String,
}

/// Image staged for vision models, base64 encoded without a data-URL prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub name: String,
    pub data: String,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    Image(&'static str),
    Text(&'static str),
    Pdf,
    Unsupported,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File type not supported yet: {name}. Supported: images, .txt, .md, .json")]
    Unsupported { name: String },

    #[error("Failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of reading one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    Document(DocumentAttachment),
    Image(ImageAttachment),
    /// PDFs are acknowledged but not extracted
    PdfNotice(String),
}

/// Result of an ingest batch
#[derive(Debug, Default)]
pub struct IngestReport {
    /// System messages to append to the active conversation
    pub notices: Vec<Message>,
    /// Files refused up front; shown to the user, never stored
    pub rejected: Vec<UploadError>,
}

/// Attachments staged for the next outbound request
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    documents: Vec<DocumentAttachment>,
    images: Vec<ImageAttachment>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> &[DocumentAttachment] {
        &self.documents
    }

    pub fn images(&self) -> &[ImageAttachment] {
        &self.images
    }

    pub fn add_document(&mut self, document: DocumentAttachment) {
        self.documents.push(document);
    }

    pub fn add_image(&mut self, image: ImageAttachment) {
        self.images.push(image);
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len() + self.images.len()
    }

    /// Notice recorded before a send that carries attachments
    pub fn sending_notice(&self) -> Message {
        Message::system(format!(
            "📎 Sending with attachments: {} image(s), {} document(s)",
            self.images.len(),
            self.documents.len()
        ))
    }

    /// Drop everything staged and return the notice for the conversation
    pub fn clear(&mut self) -> Message {
        self.documents.clear();
        self.images.clear();
        Message::system("🗑️ All uploaded files cleared")
    }

    /// Read every path concurrently and stage what can be used
    pub async fn ingest(&mut self, paths: &[PathBuf]) -> IngestReport {
        let results = join_all(paths.iter().map(|path| read_attachment(path))).await;
        let mut report = IngestReport::default();

        for result in results {
            match result {
                Ok(Ingested::Document(document)) => {
                    report.notices.push(Message::system(format!(
                        "📄 Document uploaded: {} ({} characters)",
                        document.name,
                        document.content.chars().count()
                    )));
                    self.documents.push(document);
                }
                Ok(Ingested::Image(image)) => {
                    report
                        .notices
                        .push(Message::system(format!("📷 Image uploaded: {}", image.name)));
                    self.images.push(image);
                }
                Ok(Ingested::PdfNotice(name)) => {
                    report.notices.push(Message::system(format!(
                        "📄 PDF uploaded: {}. Note: For full PDF support, you'll need to add a PDF library. For now, I can help with text files and images.",
                        name
                    )));
                }
                Err(err @ UploadError::Unsupported { .. }) => {
                    tracing::info!("[Uploads] {}", err);
                    report.rejected.push(err);
                }
                Err(err @ UploadError::Read { .. }) => {
                    tracing::warn!("[Uploads] {}", err);
                    report.notices.push(Message::system(format!("⚠️ {}", err)));
                }
            }
        }

        report
    }
}

/// Decide how a file is handled from its name
pub fn classify(name: &str) -> AttachmentKind {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if let Some((_, mime)) = IMAGE_EXTENSIONS.iter().find(|(ext, _)| *ext == extension) {
        return AttachmentKind::Image(*mime);
    }
    if let Some((_, mime)) = TEXT_EXTENSIONS.iter().find(|(ext, _)| *ext == extension) {
        return AttachmentKind::Text(*mime);
    }
    if extension == "pdf" {
        return AttachmentKind::Pdf;
    }
    AttachmentKind::Unsupported
}

/// Read a single file into an attachment
pub async fn read_attachment(path: &Path) -> Result<Ingested, UploadError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match classify(&name) {
        AttachmentKind::Image(mime) => {
            let bytes = fs::read(path).await.map_err(|source| UploadError::Read {
                name: name.clone(),
                source,
            })?;
            Ok(Ingested::Image(ImageAttachment {
                name,
                data: STANDARD.encode(bytes),
                mime: mime.to_string(),
            }))
        }
        AttachmentKind::Text(mime) => {
            let content = fs::read_to_string(path)
                .await
                .map_err(|source| UploadError::Read {
                    name: name.clone(),
                    source,
                })?;
            Ok(Ingested::Document(DocumentAttachment {
                name,
                content,
                mime: mime.to_string(),
            }))
        }
        AttachmentKind::Pdf => Ok(Ingested::PdfNotice(name)),
        AttachmentKind::Unsupported => Err(UploadError::Unsupported { name }),
    }
}
