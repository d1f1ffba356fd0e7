use std::sync::Arc;

use blossom_protocol::{BlobDescriptor, ServerEndpoint, UploadCapabilities};
use blossom_transfer::BlobSource;
use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::client::Client;
use crate::error::ClientError;
use crate::types::{BlobUpload, ChunkResponse, ChunkUpload, HeadResponse};

/// One storage server as seen by the upload, mirror and availability
/// coordinators.
///
/// [`Client`] is the HTTP implementation; tests substitute in-process mocks.
pub trait BlobServer: Send + Sync {
    fn endpoint(&self) -> &ServerEndpoint;

    /// Capability discovery. Transport failures come back as
    /// `ChunkedSupport::Unknown`, not as `Err`.
    fn negotiate(&self) -> BoxFuture<'_, Result<UploadCapabilities, ClientError>>;

    fn head_blob<'a>(
        &'a self,
        sha256: &'a str,
        ext: Option<&'a str>,
    ) -> BoxFuture<'a, Result<HeadResponse, ClientError>>;

    fn upload_chunk<'a>(
        &'a self,
        chunk: ChunkUpload,
        authorization: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, Result<ChunkResponse, ClientError>>;

    fn upload_blob<'a>(
        &'a self,
        blob: BlobUpload,
        authorization: &'a str,
        source: Arc<dyn BlobSource>,
    ) -> BoxFuture<'a, Result<BlobDescriptor, ClientError>>;

    fn mirror_blob<'a>(
        &'a self,
        source_url: &'a str,
        authorization: &'a str,
    ) -> BoxFuture<'a, Result<BlobDescriptor, ClientError>>;
}

impl BlobServer for Client {
    fn endpoint(&self) -> &ServerEndpoint {
        Client::endpoint(self)
    }

    fn negotiate(&self) -> BoxFuture<'_, Result<UploadCapabilities, ClientError>> {
        Box::pin(Client::negotiate(self))
    }

    fn head_blob<'a>(
        &'a self,
        sha256: &'a str,
        ext: Option<&'a str>,
    ) -> BoxFuture<'a, Result<HeadResponse, ClientError>> {
        Box::pin(Client::head_blob(self, sha256, ext))
    }

    fn upload_chunk<'a>(
        &'a self,
        chunk: ChunkUpload,
        authorization: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, Result<ChunkResponse, ClientError>> {
        Box::pin(async move { self.patch_chunk(&chunk, authorization, body).await })
    }

    fn upload_blob<'a>(
        &'a self,
        blob: BlobUpload,
        authorization: &'a str,
        source: Arc<dyn BlobSource>,
    ) -> BoxFuture<'a, Result<BlobDescriptor, ClientError>> {
        Box::pin(async move { self.put_blob(&blob, authorization, source).await })
    }

    fn mirror_blob<'a>(
        &'a self,
        source_url: &'a str,
        authorization: &'a str,
    ) -> BoxFuture<'a, Result<BlobDescriptor, ClientError>> {
        Box::pin(self.put_mirror(source_url, authorization))
    }
}
