//! Request handlers for `/api/send`, `/api/receive` and `/api/download`.

use super::response::ApiError;
use crate::transfer::{StoredUpload, TransferRegistry, TransferView};
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub transfer_code: String,
}

/// Accept a multipart submission with optional `message` and `file` parts
pub async fn send_handler(
    State(registry): State<Arc<TransferRegistry>>,
    mut multipart: Multipart,
) -> Result<Json<SendResponse>, ApiError> {
    let mut message = None;
    let mut upload = None;

    if let Err(e) = read_submission(&registry, &mut multipart, &mut message, &mut upload).await {
        if let Some(staged) = &upload {
            registry.discard_upload(staged).await;
        }
        return Err(e);
    }

    let transfer_code = registry.submit(message, upload).await?;
    Ok(Json(SendResponse { transfer_code }))
}

async fn read_submission(
    registry: &TransferRegistry,
    multipart: &mut Multipart,
    message: &mut Option<String>,
    upload: &mut Option<StoredUpload>,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("message") => {
                *message = Some(field.text().await?);
            }
            Some("file") => {
                // Browsers send an empty, unnamed part when no file was picked
                let Some(file_name) = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                else {
                    continue;
                };
                if upload.is_some() {
                    tracing::debug!("Ignoring extra file part {}", file_name);
                    continue;
                }

                let stream = field.map(|chunk| chunk.map_err(multipart_io_error)).boxed();
                *upload = Some(registry.stage_upload(&file_name, stream).await?);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Body-limit failures become `FileTooLarge` so the registry reports them as such
fn multipart_io_error(err: MultipartError) -> std::io::Error {
    let kind = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        std::io::ErrorKind::FileTooLarge
    } else {
        std::io::ErrorKind::Other
    };
    std::io::Error::new(kind, err.body_text())
}

/// Message and file details for a transfer code
pub async fn receive_handler(
    State(registry): State<Arc<TransferRegistry>>,
    Path(code): Path<String>,
) -> Result<Json<TransferView>, ApiError> {
    Ok(Json(registry.retrieve(&code).await?))
}

/// Stream the file of a transfer code as an attachment
pub async fn download_handler(
    State(registry): State<Arc<TransferRegistry>>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let download = registry.download(&code).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&download.file_name),
    );
    if let Some(len) = download.blob.len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    let body = Body::from_stream(ReaderStream::new(download.blob.reader));
    Ok((headers, body).into_response())
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// original name as RFC 5987 `filename*`
pub fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        encode_rfc5987(file_name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn encode_rfc5987(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
