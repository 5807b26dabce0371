use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport used by the fetcher. Lets tests and callers swap the HTTP stack.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
