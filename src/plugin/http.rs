//! HTTP adaptation boundary.
//!
//! The core consumes this layer as an opaque capability: an HTTP entry
//! exposes header and body access plus output setters, and a mux accepts
//! prioritized routing entries scoped to a pipeline context. The mux's
//! matching algorithm lives behind the trait and is not the core's concern.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::context::PipelineContext;
use crate::error::GatewayError;
use crate::plugin::Plugin;

// Well-known data bucket keys shared between HTTP server plugins and the
// mux entries they install.
pub const HTTP_SERVER_MUX_BUCKET_KEY: &str = "HTTP_SERVER_MUX_BUCKET_KEY";
pub const HTTP_SERVER_PIPELINE_ROUTE_TABLE_BUCKET_KEY: &str =
    "HTTP_SERVER_PIPELINE_ROUTE_TABLE_BUCKET_KEY";
pub const HTTP_SERVER_GONE_NOTIFIER_BUCKET_KEY: &str = "HTTP_SERVER_GONE_NOTIFIER_BUCKET_KEY";

/// Readable request body with a known-or-unknown length.
pub trait SizedBody: AsyncRead + Send + Unpin {
    /// Available bytes, `None` when unknown.
    fn size(&self) -> Option<u64>;
}

/// Request or response header view.
pub trait HttpHeader: Send {
    fn proto(&self) -> &str;

    fn method(&self) -> Method;

    fn get(&self, key: &str) -> Option<String>;

    fn host(&self) -> String;

    fn scheme(&self) -> String;

    /// Path component; relative paths may omit the leading slash.
    fn path(&self) -> String;

    /// Full URI including scheme, host, query and fragment.
    fn full_uri(&self) -> String;

    fn query_string(&self) -> String;

    fn content_length(&self) -> Option<u64>;

    /// Calls `f` for each header pair.
    fn visit_all(&self, f: &mut dyn FnMut(&str, &str));

    fn copy_to(&self, dst: &mut dyn HttpHeader) -> Result<(), GatewayError>;

    /// Sets a single `key: value` header, replacing prior values.
    fn set(&mut self, key: &str, value: &str);

    /// Adds a `key: value` header; multiple values per key may accumulate.
    fn add(&mut self, key: &str, value: &str);

    fn set_content_length(&mut self, len: u64);
}

/// One in-flight HTTP exchange, as seen by pipeline plugins.
#[async_trait]
pub trait HttpContext: Send {
    fn request_header(&self) -> &dyn HttpHeader;

    fn response_header(&mut self) -> &mut dyn HttpHeader;

    fn remote_addr(&self) -> String;

    fn body_read_closer(&mut self) -> &mut dyn SizedBody;

    fn dump_request(&self) -> Result<String, GatewayError>;

    /// Fires when the peer goes away; `None` if the underlying transport
    /// cannot observe disconnects.
    fn close_notifier(&self) -> Option<CancellationToken>;

    fn set_status_code(&mut self, status: StatusCode);

    /// Effective only before the first `write`; later calls are ignored.
    fn set_content_length(&mut self, len: u64);

    async fn write(&mut self, body: Bytes) -> Result<usize, GatewayError>;
}

/// Handler dispatched by the mux, receiving the matched URL parameters and
/// the time route matching took.
pub type HttpHandler =
    Arc<dyn Fn(&mut dyn HttpContext, &HashMap<String, String>, Duration) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpUrlPattern {
    pub scheme: String,
    pub host: String,
    pub port: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

/// A prioritized routing entry owned by a plugin instance.
#[derive(Clone)]
pub struct HttpMuxEntry {
    pub pattern: HttpUrlPattern,
    pub method: Method,
    pub priority: u32,
    pub instance: Arc<dyn Plugin>,
    pub headers: HashMap<String, Vec<String>>,
    pub handler: HttpHandler,
}

/// Router consumed as an opaque capability; entries are scoped to the
/// pipeline context that added them.
#[async_trait]
pub trait HttpMux: Send + Sync {
    async fn serve_http(&self, ctx: &mut dyn HttpContext);

    fn add_entry(&self, ctx: &PipelineContext, entry: HttpMuxEntry) -> Result<(), GatewayError>;

    fn add_entries(
        &self,
        ctx: &PipelineContext,
        entries: Vec<HttpMuxEntry>,
    ) -> Result<(), GatewayError>;

    fn delete_entry(&self, ctx: &PipelineContext, entry: &HttpMuxEntry);

    /// Removes and returns every entry scoped to `ctx`.
    fn delete_entries(&self, ctx: &PipelineContext) -> Vec<HttpMuxEntry>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct FixedBody {
        data: io::Cursor<Vec<u8>>,
        len: u64,
    }

    impl AsyncRead for FixedBody {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let pos = self.data.position() as usize;
            let remaining = &self.data.get_ref()[pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            self.data.set_position((pos + n) as u64);
            Poll::Ready(Ok(()))
        }
    }

    impl SizedBody for FixedBody {
        fn size(&self) -> Option<u64> {
            Some(self.len)
        }
    }

    #[tokio::test]
    async fn test_sized_body_reports_length_and_reads() {
        use tokio::io::AsyncReadExt;

        let payload = b"hello pipeline".to_vec();
        let mut body = FixedBody {
            len: payload.len() as u64,
            data: io::Cursor::new(payload),
        };

        assert_eq!(body.size(), Some(14));
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello pipeline");
    }

    #[test]
    fn test_url_pattern_equality() {
        let a = HttpUrlPattern {
            path: "/v1/tasks".to_string(),
            ..Default::default()
        };
        let b = HttpUrlPattern {
            path: "/v1/tasks".to_string(),
            ..Default::default()
        };
        assert_eq!(a, b);
    }
}
