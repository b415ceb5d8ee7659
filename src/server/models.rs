use serde::Serialize;

/// Multipart fields of the upload form.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub(crate) image: Option<Vec<u8>>,
    pub(crate) language: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
