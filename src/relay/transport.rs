use crate::adapter::AdaptedRequest;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::Response;
use reqwest::Client;

/// Longest upstream error body kept for the logs.
const FAILURE_DETAIL_LIMIT: usize = 500;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Sends one adapted request upstream per call.
#[derive(Clone)]
pub struct ProxyTransport {
    client: Client,
}

impl ProxyTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn send(
        &self,
        method: Method,
        request: AdaptedRequest,
    ) -> Result<UpstreamReply, reqwest::Error> {
        let builder = self.client.request(method, &request.url).headers(request.headers);
        let response = request.body.attach(builder).send().await?;
        Ok(UpstreamReply::new(response))
    }
}

/// Upstream response with internal headers already stripped.
pub struct UpstreamReply {
    status: StatusCode,
    headers: HeaderMap,
    response: reqwest::Response,
}

impl UpstreamReply {
    fn new(response: reqwest::Response) -> Self {
        let status = response.status();
        let mut headers = response.headers().clone();
        sanitize_response_headers(&mut headers);
        Self {
            status,
            headers,
            response,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Stream the upstream body back to the caller.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self.response.bytes_stream()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Read the body of a failed attempt for logging, truncated.
    ///
    /// Stops pulling chunks once enough bytes for the limit are buffered.
    pub async fn failure_detail(mut self) -> String {
        let mut buf = Vec::new();
        let cap = FAILURE_DETAIL_LIMIT * 4;
        while buf.len() < cap {
            match self.response.chunk().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) if buf.is_empty() => return format!("<unreadable body: {}>", e),
                Err(_) => break,
            }
        }
        let text = String::from_utf8_lossy(&buf);
        truncate_chars(text.trim(), FAILURE_DETAIL_LIMIT)
    }
}

/// Drop server identity, `x-*` diagnostics, and hop-by-hop headers.
///
/// `content-length` goes too since the body is re-streamed.
pub fn sanitize_response_headers(headers: &mut HeaderMap) {
    let doomed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| {
            let name = name.as_str();
            name.starts_with("x-")
                || matches!(name, "server" | "via" | "content-length")
                || HOP_BY_HOP.contains(&name)
        })
        .cloned()
        .collect();
    for name in doomed {
        headers.remove(name);
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_internal_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("cloudflare"));
        headers.insert("x-request-id", HeaderValue::from_static("req_1"));
        headers.insert("x-ratelimit-remaining-requests", HeaderValue::from_static("99"));
        headers.insert("via", HeaderValue::from_static("1.1 proxy"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-length", HeaderValue::from_static("12"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("openai-processing-ms", HeaderValue::from_static("120"));

        sanitize_response_headers(&mut headers);

        let mut left: Vec<&str> = headers.keys().map(|k| k.as_str()).collect();
        left.sort();
        assert_eq!(left, vec!["content-type", "openai-processing-ms"]);
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("ééééé", 2), "éé…");
    }

    #[tokio::test]
    async fn failure_detail_keeps_only_the_head_of_large_bodies() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("e".repeat(200_000))
            .create_async()
            .await;
        let transport = ProxyTransport::new(Client::new());
        let request = AdaptedRequest {
            url: format!("{}/v1/chat/completions", server.url()),
            headers: HeaderMap::new(),
            body: crate::adapter::RequestBody::Json(serde_json::Map::new()),
        };

        let reply = transport.send(Method::POST, request).await.unwrap();
        assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = reply.failure_detail().await;

        assert_eq!(detail.chars().count(), FAILURE_DETAIL_LIMIT + 1);
        assert!(detail.ends_with('…'));
    }
}
