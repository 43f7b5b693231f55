use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam between the fetch step and the transport, so callers can wrap or
/// replace the client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
