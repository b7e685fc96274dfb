//! The multipart upload protocol: create, upload parts, complete, abort and
//! list.

use super::context::{document_to_error, ServiceContext, Target};
use crate::error::{MultipartError, ResponseError, S3Error};
use crate::signing::uri_encode_query;
use crate::types::*;
use crate::xml::{self, ResultDocument};
use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Service for multipart upload requests.
pub struct MultipartService {
    ctx: Arc<ServiceContext>,
}

impl MultipartService {
    /// Create a new multipart service.
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Open a multipart upload and return its upload ID.
    #[instrument(skip(self, request), fields(bucket = %request.bucket, key = %request.key))]
    pub async fn create(
        &self,
        request: CreateMultipartUploadRequest,
    ) -> Result<CreateMultipartUploadOutput, S3Error> {
        let mut headers = request.headers;
        request.attributes.apply_headers(&mut headers);

        let response = self
            .ctx
            .send(
                Target::object("POST", &request.bucket, &request.key).with_query("uploads"),
                headers,
                None,
            )
            .await?;

        let body = String::from_utf8_lossy(&response.body);
        let mut output = xml::parse_create_multipart_upload(&body)?;
        output.request_id = response.request_id().map(String::from);
        debug!(upload_id = %output.upload_id, "Created multipart upload");
        Ok(output)
    }

    /// Upload one part.
    #[instrument(skip(self, request), fields(
        upload_id = %request.upload_id,
        part_number = request.part_number,
        size = request.body.len()
    ))]
    pub async fn upload_part(&self, request: UploadPartRequest) -> Result<UploadPartOutput, S3Error> {
        let query = part_query(request.part_number, &request.upload_id);
        let response = self
            .ctx
            .send(
                Target::object("PUT", &request.bucket, &request.key).with_query(&query),
                request.headers,
                Some(request.body),
            )
            .await?;

        let e_tag = response
            .etag()
            .map(String::from)
            .ok_or(S3Error::Response(ResponseError::MissingField {
                field: "ETag".to_string(),
            }))?;

        Ok(UploadPartOutput {
            e_tag,
            checksum_crc32c: response
                .get_header("x-amz-checksum-crc32c")
                .map(String::from),
            checksum_sha256: response
                .get_header("x-amz-checksum-sha256")
                .map(String::from),
            request_id: response.request_id().map(String::from),
        })
    }

    /// Fill one part with a range of an existing object.
    #[instrument(skip(self, request), fields(
        upload_id = %request.upload_id,
        part_number = request.part_number,
        source = %request.source.header_value()
    ))]
    pub async fn upload_part_copy(
        &self,
        request: UploadPartCopyRequest,
    ) -> Result<UploadPartCopyOutput, S3Error> {
        let mut headers = HashMap::new();
        headers.insert(
            "x-amz-copy-source".to_string(),
            request.source.header_value(),
        );
        if let Some((start, end)) = request.range {
            headers.insert(
                "x-amz-copy-source-range".to_string(),
                format!("bytes={}-{}", start, end),
            );
        }
        if let Some(ref etag) = request.copy_source_if_match {
            headers.insert("x-amz-copy-source-if-match".to_string(), etag.clone());
        }

        let query = part_query(request.part_number, &request.upload_id);
        let response = self
            .ctx
            .send(
                Target::object("PUT", &request.bucket, &request.key).with_query(&query),
                headers,
                None,
            )
            .await?;
        let request_id = response.request_id().map(String::from);

        let body = String::from_utf8_lossy(&response.body);
        match xml::parse_copy_result(&body)? {
            ResultDocument::Ok(result) => Ok(UploadPartCopyOutput {
                e_tag: result.e_tag.ok_or(S3Error::Response(ResponseError::MissingField {
                    field: "ETag".to_string(),
                }))?,
                last_modified: result.last_modified,
                request_id,
            }),
            ResultDocument::Error(document) => Err(document_to_error(
                document,
                &request.bucket,
                Some(&request.key),
                request_id,
            )),
        }
    }

    /// Assemble the uploaded parts into the final object.
    ///
    /// An `<Error>` document inside a `200 OK` becomes
    /// `MultipartError::CompletionFailed`.
    #[instrument(skip(self, request), fields(upload_id = %request.upload_id, parts = request.parts.len()))]
    pub async fn complete(
        &self,
        request: CompleteMultipartUploadRequest,
    ) -> Result<CompleteMultipartUploadOutput, S3Error> {
        let body = xml::build_complete_multipart_xml(&request.parts);
        let mut headers = request.headers;
        headers.insert("content-type".to_string(), "application/xml".to_string());

        let query = format!("uploadId={}", uri_encode_query(&request.upload_id));
        let response = self
            .ctx
            .send(
                Target::object("POST", &request.bucket, &request.key).with_query(&query),
                headers,
                Some(Bytes::from(body)),
            )
            .await?;
        let request_id = response.request_id().map(String::from);

        let text = String::from_utf8_lossy(&response.body);
        match xml::parse_complete_multipart_upload(&text)? {
            ResultDocument::Ok(mut output) => {
                output.version_id = response.get_header("x-amz-version-id").map(String::from);
                output.request_id = request_id;
                Ok(output)
            }
            ResultDocument::Error(document) => {
                Err(S3Error::Multipart(MultipartError::CompletionFailed {
                    upload_id: request.upload_id.clone(),
                    source: Box::new(document_to_error(
                        document,
                        &request.bucket,
                        Some(&request.key),
                        request_id,
                    )),
                }))
            }
        }
    }

    /// Abort an upload, discarding its parts.
    #[instrument(skip(self, request), fields(upload_id = %request.upload_id))]
    pub async fn abort(&self, request: AbortMultipartUploadRequest) -> Result<(), S3Error> {
        let query = format!("uploadId={}", uri_encode_query(&request.upload_id));
        self.ctx
            .send(
                Target::object("DELETE", &request.bucket, &request.key).with_query(&query),
                HashMap::new(),
                None,
            )
            .await?;
        debug!("Aborted multipart upload");
        Ok(())
    }

    /// List one page of uploaded parts.
    #[instrument(skip(self, request), fields(upload_id = %request.upload_id))]
    pub async fn list_parts(&self, request: ListPartsRequest) -> Result<ListPartsOutput, S3Error> {
        let mut query = Vec::new();
        if let Some(max_parts) = request.max_parts {
            query.push(format!("max-parts={}", max_parts));
        }
        if let Some(marker) = request.part_number_marker {
            query.push(format!("part-number-marker={}", marker));
        }
        query.push(format!("uploadId={}", uri_encode_query(&request.upload_id)));
        let query = query.join("&");

        let response = self
            .ctx
            .send(
                Target::object("GET", &request.bucket, &request.key).with_query(&query),
                HashMap::new(),
                None,
            )
            .await?;

        let body = String::from_utf8_lossy(&response.body);
        let mut output = xml::parse_list_parts(&body)?;
        output.request_id = response.request_id().map(String::from);
        Ok(output)
    }

    /// Stream every part of an upload, following pagination.
    ///
    /// Starting from `request.part_number_marker` resumes a listing.
    pub fn list_parts_stream(
        &self,
        request: ListPartsRequest,
    ) -> impl Stream<Item = Result<Part, S3Error>> + Send + '_ {
        let start = request.part_number_marker;
        stream::try_unfold(Some(start), move |marker| {
            let mut page_request = request.clone();
            async move {
                let Some(marker) = marker else {
                    return Ok(None);
                };
                page_request.part_number_marker = marker;
                let page = self.list_parts(page_request).await?;

                let next = if page.is_truncated {
                    page.next_part_number_marker
                        .or_else(|| page.parts.last().map(|p| p.part_number))
                        .map(Some)
                } else {
                    None
                };
                let parts = stream::iter(page.parts.into_iter().map(Ok::<Part, S3Error>));
                Ok::<_, S3Error>(Some((parts, next)))
            }
        })
        .try_flatten()
    }
}

fn part_query(part_number: u32, upload_id: &str) -> String {
    format!(
        "partNumber={}&uploadId={}",
        part_number,
        uri_encode_query(upload_id)
    )
}

impl std::fmt::Debug for MultipartService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartService").finish_non_exhaustive()
    }
}
