//! # Image Attachments
//!
//! Downloads message attachments, checks that they are images the oracle
//! can read, and encodes them as `data:` URLs. Each attachment fails on its
//! own; a bad photo never blocks the others or the text path.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::oracle::OracleImage;
use crate::pipeline_config::ImageLimits;
use crate::pipeline_errors::PipelineError;

/// A file attached to an inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    /// MIME type reported by the sender, if any
    pub mime: Option<String>,
    pub name: Option<String>,
}

impl Attachment {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            mime: None,
            name: None,
        }
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

fn mime_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// Validate raw attachment bytes and encode them for the oracle.
///
/// The format is sniffed from the bytes; a declared MIME type that disagrees
/// is logged and ignored.
pub fn prepare_image(bytes: &[u8], declared_mime: Option<&str>, limits: &ImageLimits) -> Result<OracleImage, PipelineError> {
    if bytes.len() < limits.min_bytes {
        return Err(PipelineError::Image(format!(
            "attachment too small to identify ({} bytes, need at least {})",
            bytes.len(),
            limits.min_bytes
        )));
    }
    if bytes.len() as u64 > limits.max_bytes {
        return Err(PipelineError::Image(format!(
            "attachment is {} bytes, limit is {}",
            bytes.len(),
            limits.max_bytes
        )));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| PipelineError::Image(format!("could not determine image format: {e}")))?;
    let mime = mime_for(format)
        .ok_or_else(|| PipelineError::Image(format!("unsupported image format: {format:?}")))?;

    if let Some(declared) = declared_mime {
        if !declared.eq_ignore_ascii_case(mime) {
            debug!(declared, detected = mime, "Declared MIME type differs from content");
        }
    }

    Ok(OracleImage {
        mime: mime.to_string(),
        data_or_url: format!("data:{mime};base64,{}", STANDARD.encode(bytes)),
    })
}

async fn download(client: &Client, attachment: &Attachment, auth_token: Option<&str>, limits: &ImageLimits) -> Result<Vec<u8>, PipelineError> {
    let mut request = client.get(&attachment.url);
    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| PipelineError::Image(format!("download failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Image(format!("download returned HTTP {status}")));
    }
    if let Some(length) = response.content_length() {
        if length > limits.max_bytes {
            return Err(PipelineError::Image(format!(
                "attachment is {length} bytes, limit is {}",
                limits.max_bytes
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::Image(format!("download interrupted: {e}")))?;
    Ok(bytes.to_vec())
}

/// Download and prepare up to `max_images` attachments.
///
/// Returns the usable images and one error string per attachment that
/// failed.
pub async fn fetch_images(
    client: &Client,
    attachments: &[Attachment],
    auth_token: Option<&str>,
    max_images: usize,
    limits: &ImageLimits,
) -> (Vec<OracleImage>, Vec<String>) {
    let mut images = Vec::new();
    let mut errors = Vec::new();

    if attachments.len() > max_images {
        info!(
            attached = attachments.len(),
            max_images, "Ignoring attachments beyond the image limit"
        );
    }

    for attachment in attachments.iter().take(max_images) {
        let result = match download(client, attachment, auth_token, limits).await {
            Ok(bytes) => prepare_image(&bytes, attachment.mime.as_deref(), limits),
            Err(e) => Err(e),
        };
        match result {
            Ok(image) => images.push(image),
            Err(e) => {
                warn!(attachment = attachment.label(), error = %e, "Skipping attachment");
                errors.push(format!("{}: {e}", attachment.label()));
            }
        }
    }

    (images, errors)
}
