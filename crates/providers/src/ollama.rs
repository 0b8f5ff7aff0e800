use crate::error::ProviderError;
use crate::ndjson::{classify, Collected, Line, LineBuffer};
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use shared::agent_api::GenerateRequest;
use shared::settings::OllamaSettings;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

/// Outcome of the startup availability check
#[derive(Debug)]
pub enum ModelCheck {
    /// Service reachable and the configured model is pulled
    Available { available: Vec<String> },
    /// Service reachable but the model is not in `/api/tags`
    Missing { available: Vec<String> },
    /// Listing failed
    Unreachable(ProviderError),
}

/// Incremental output of a streamed generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    /// A line of the stream that was not valid JSON (skipped)
    Warning(String),
    /// The service answered with `{"error": ...}`
    Error(String),
    /// The transport failed after the first chunk arrived
    Failed(ProviderError),
    Done,
}

/// Final answer of a non-streamed generation, decided from the last
/// well-formed JSON object of the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// The service returned `{"error": ...}`
    ServiceError(String),
    /// No line of the body parsed as JSON
    Empty,
    /// JSON arrived but had neither `response` nor `error`
    Unexpected,
}

impl Reply {
    pub fn from_last(last: Option<&Value>) -> Self {
        let Some(value) = last.filter(|v| !is_blank(v)) else {
            return Reply::Empty;
        };
        if let Some(text) = value.get("response").and_then(Value::as_str) {
            return Reply::Text(text.trim().to_string());
        }
        match value.get("error") {
            Some(Value::String(e)) => Reply::ServiceError(e.clone()),
            Some(other) => Reply::ServiceError(other.to_string()),
            None => Reply::Unexpected,
        }
    }
}

/// `null`, `false`, `0`, `""`, `{}` and `[]` carry no answer.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub reply: Reply,
    /// Raw lines that could not be decoded and were skipped
    pub warnings: Vec<String>,
}

pub struct OllamaClient {
    http: Client,
    base: String,
    stream: bool,
}

/// `timeout` bounds connecting and each read, not the whole exchange,
/// so a long streamed answer survives as long as bytes keep arriving.
fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .pool_max_idle_per_host(2)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(ProviderError::from)
}

impl OllamaClient {
    pub fn new(settings: &OllamaSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(Duration::from_secs(settings.request_timeout_secs.max(1)))?,
            base: settings.base_url.trim_end_matches('/').to_string(),
            stream: settings.stream,
        })
    }

    pub fn streaming(&self) -> bool {
        self.stream
    }

    /// `GET /api/tags` and return the model names.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base);
        let resp = self.http.get(url).send().await?;
        let resp = ensure_success(resp).await?;
        let bytes = resp.bytes().await?;
        let tags: TagsResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check whether `model` (or a tagged variant such as `model:latest`) is served.
    pub async fn check_model(&self, model: &str) -> ModelCheck {
        match self.list_models().await {
            Ok(available) => {
                if available.iter().any(|name| name.contains(model)) {
                    info!(model, "model available");
                    ModelCheck::Available { available }
                } else {
                    info!(model, ?available, "model not found");
                    ModelCheck::Missing { available }
                }
            }
            Err(e) => {
                warn!(error = %e, "listing models failed");
                ModelCheck::Unreachable(e)
            }
        }
    }

    fn request(&self, model: &str, prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/api/generate", self.base);
        let req = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream,
        };
        self.http.post(url).json(&req)
    }

    /// `POST /api/generate` and keep the last well-formed JSON line of the body.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<Generation, ProviderError> {
        let resp = self.request(model, prompt, self.stream).send().await?;
        let resp = ensure_success(resp).await?;

        let mut body = resp.bytes_stream();
        let mut buf = LineBuffer::new();
        let mut collected = Collected::default();

        while let Some(chunk) = body.next().await {
            let bytes = chunk?;
            for line in buf.feed(&bytes) {
                collected.push(&line);
            }
        }
        if let Some(line) = buf.finish() {
            collected.push(&line);
        }

        for line in &collected.malformed {
            warn!(line = %line, "skipping undecodable line");
        }
        let reply = Reply::from_last(collected.last.as_ref());
        debug!(?reply, "generation finished");
        Ok(Generation {
            reply,
            warnings: collected.malformed,
        })
    }

    /// Streamed generation.
    ///
    /// Contract: if the request fails *before* any chunks are sent, returns
    /// `Err(...)`. Once streaming starts, service errors go through
    /// `StreamChunk::Error`, transport errors through `StreamChunk::Failed`,
    /// and the method returns `Ok(())`.
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        let resp = self.request(model, prompt, true).send().await?;
        let resp = ensure_success(resp).await?;

        let mut stream = resp.bytes_stream();
        let mut buf = LineBuffer::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    let err = ProviderError::from(e);
                    warn!(error = %err, "stream interrupted");
                    let _ = tx.send(StreamChunk::Failed(err));
                    return Ok(());
                }
            };
            for line in buf.feed(&bytes) {
                if forward_line(&line, &tx) {
                    return Ok(());
                }
            }
        }
        if let Some(line) = buf.finish() {
            if forward_line(&line, &tx) {
                return Ok(());
            }
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(())
    }
}

/// Send one stream line to the window. Returns true when the stream is over.
fn forward_line(line: &str, tx: &UnboundedSender<StreamChunk>) -> bool {
    match classify(line) {
        Line::Json(value) => {
            if let Some(err) = value.get("error") {
                let msg = err
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                let _ = tx.send(StreamChunk::Error(msg));
                return true;
            }
            if let Some(text) = value.get("response").and_then(Value::as_str) {
                if !text.is_empty() {
                    let _ = tx.send(StreamChunk::Text(text.to_string()));
                }
            }
            if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
                let _ = tx.send(StreamChunk::Done);
                return true;
            }
            false
        }
        Line::Malformed(raw) => {
            warn!(line = %raw, "skipping undecodable stream line");
            let _ = tx.send(StreamChunk::Warning(raw));
            false
        }
    }
}

async fn ensure_success(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread::JoinHandle;
    use tiny_http::{Response as HttpResponse, Server};

    /// Serve exactly one request and hand back its body.
    fn serve_once(status: u16, body: &'static str, delay: Duration) -> (String, JoinHandle<String>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let handle = std::thread::spawn(move || {
            let mut req = server.recv().unwrap();
            let mut received = String::new();
            req.as_reader().read_to_string(&mut received).unwrap();
            std::thread::sleep(delay);
            let _ = req.respond(HttpResponse::from_string(body).with_status_code(status));
            received
        });
        (format!("http://127.0.0.1:{}", port), handle)
    }

    /// Answer one request by hand: `head` is written after the status line,
    /// then each body piece follows after its delay.
    fn serve_paced(
        head: &'static str,
        pieces: Vec<(Duration, &'static str)>,
    ) -> (String, JoinHandle<()>) {
        use std::io::{BufRead, BufReader, Write};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
            }
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut out = stream;
            write!(out, "HTTP/1.1 200 OK\r\n{}\r\n", head).unwrap();
            out.flush().unwrap();
            for (delay, piece) in pieces {
                std::thread::sleep(delay);
                if out.write_all(piece.as_bytes()).and_then(|_| out.flush()).is_err() {
                    return;
                }
            }
        });
        (format!("http://127.0.0.1:{}", port), handle)
    }

    async fn collect_stream(client: OllamaClient) -> Vec<StreamChunk> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client.generate_stream("llama2", "hi", tx).await.unwrap();
        let mut chunks = Vec::new();
        while let Ok(c) = rx.try_recv() {
            chunks.push(c);
        }
        chunks
    }

    fn client_with_timeout(base: &str, timeout: Duration) -> OllamaClient {
        OllamaClient {
            http: http_client(timeout).unwrap(),
            ..client_for(base)
        }
    }

    fn client_for(base: &str) -> OllamaClient {
        let settings = OllamaSettings {
            base_url: base.to_string(),
            ..OllamaSettings::default()
        };
        OllamaClient::new(&settings).unwrap()
    }

    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_check_model_matches_tagged_name() {
        let (base, handle) = serve_once(
            200,
            r#"{"models":[{"name":"llama2:latest"},{"name":"mistral:7b"}]}"#,
            Duration::ZERO,
        );
        let check = client_for(&base).check_model("llama2").await;
        handle.join().unwrap();
        match check {
            ModelCheck::Available { available } => assert_eq!(available.len(), 2),
            other => panic!("expected Available, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_model_missing() {
        let (base, handle) = serve_once(200, r#"{"models":[]}"#, Duration::ZERO);
        let check = client_for(&base).check_model("llama2").await;
        handle.join().unwrap();
        assert!(matches!(check, ModelCheck::Missing { available } if available.is_empty()));
    }

    #[tokio::test]
    async fn test_tags_without_models_key_is_empty() {
        let (base, handle) = serve_once(200, "{}", Duration::ZERO);
        let models = client_for(&base).list_models().await.unwrap();
        handle.join().unwrap();
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn test_tags_bad_json_is_decode_error() {
        let (base, handle) = serve_once(200, "<html>", Duration::ZERO);
        let err = client_for(&base).list_models().await.unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let base = format!("http://127.0.0.1:{}", closed_port());
        let check = client_for(&base).check_model("llama2").await;
        assert!(matches!(check, ModelCheck::Unreachable(ProviderError::Connect(_))));
    }

    #[tokio::test]
    async fn test_generate_sends_payload_and_keeps_last_line() {
        let (base, handle) = serve_once(
            200,
            "{\"response\":\"partial\",\"done\":false}\ngarbage\n{\"response\":\"  Hello there \",\"done\":true}\n",
            Duration::ZERO,
        );
        let gen = client_for(&base).generate("llama2", "hi").await.unwrap();
        let sent: Value = serde_json::from_str(&handle.join().unwrap()).unwrap();

        assert_eq!(sent["model"], "llama2");
        assert_eq!(sent["prompt"], "hi");
        assert_eq!(sent["stream"], false);
        assert_eq!(gen.reply, Reply::Text("Hello there".into()));
        assert_eq!(gen.warnings, vec!["garbage"]);
    }

    #[tokio::test]
    async fn test_generate_service_error_object() {
        let (base, handle) = serve_once(200, r#"{"error":"model 'x' not found"}"#, Duration::ZERO);
        let gen = client_for(&base).generate("x", "hi").await.unwrap();
        handle.join().unwrap();
        assert_eq!(gen.reply, Reply::ServiceError("model 'x' not found".into()));
    }

    #[tokio::test]
    async fn test_generate_no_json() {
        let (base, handle) = serve_once(200, "nope\n", Duration::ZERO);
        let gen = client_for(&base).generate("llama2", "hi").await.unwrap();
        handle.join().unwrap();
        assert_eq!(gen.reply, Reply::Empty);
    }

    #[tokio::test]
    async fn test_generate_unexpected_shape() {
        let (base, handle) = serve_once(200, r#"{"done":true}"#, Duration::ZERO);
        let gen = client_for(&base).generate("llama2", "hi").await.unwrap();
        handle.join().unwrap();
        assert_eq!(gen.reply, Reply::Unexpected);
    }

    #[tokio::test]
    async fn test_generate_http_error() {
        let (base, handle) = serve_once(500, "boom", Duration::ZERO);
        let err = client_for(&base).generate("llama2", "hi").await.unwrap_err();
        handle.join().unwrap();
        match err {
            ProviderError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Http, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_timeout() {
        let (base, handle) = serve_once(200, "{}", Duration::from_millis(1500));
        let err = client_with_timeout(&base, Duration::from_millis(200))
            .generate("llama2", "hi")
            .await
            .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ProviderError::Timeout));
    }

    #[tokio::test]
    async fn test_generate_stream_forwards_fragments() {
        let (base, handle) = serve_once(
            200,
            "{\"response\":\"Hel\"}\n{\"response\":\"lo\"}\nbad\n{\"response\":\"\",\"done\":true}\n",
            Duration::ZERO,
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client_for(&base)
            .generate_stream("llama2", "hi", tx)
            .await
            .unwrap();
        let sent: Value = serde_json::from_str(&handle.join().unwrap()).unwrap();
        assert_eq!(sent["stream"], true);

        let mut chunks = Vec::new();
        while let Ok(c) = rx.try_recv() {
            chunks.push(c);
        }
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("Hel".into()),
                StreamChunk::Text("lo".into()),
                StreamChunk::Warning("bad".into()),
                StreamChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_stream_error_object() {
        let (base, handle) = serve_once(200, "{\"error\":\"out of memory\"}\n", Duration::ZERO);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client_for(&base)
            .generate_stream("llama2", "hi", tx)
            .await
            .unwrap();
        handle.join().unwrap();
        assert_eq!(rx.try_recv().unwrap(), StreamChunk::Error("out of memory".into()));
    }

    #[tokio::test]
    async fn test_slow_stream_outlives_timeout() {
        // 1.5s of output against a 1s timeout; no single gap exceeds it
        let tick = Duration::from_millis(250);
        let mut pieces = vec![(tick, "{\"response\":\"a\"}\n"); 6];
        pieces.push((tick, "{\"response\":\"\",\"done\":true}\n"));
        let (base, handle) = serve_paced("Connection: close\r\n", pieces);

        let client = client_with_timeout(&base, Duration::from_millis(1000));
        let chunks = collect_stream(client).await;
        handle.join().unwrap();

        let mut expected = vec![StreamChunk::Text("a".into()); 6];
        expected.push(StreamChunk::Done);
        assert_eq!(chunks, expected);
    }

    #[tokio::test]
    async fn test_stalled_stream_fails_with_timeout() {
        let (base, handle) = serve_paced(
            "Connection: close\r\n",
            vec![
                (Duration::ZERO, "{\"response\":\"a\"}\n"),
                (Duration::from_millis(1000), "{\"response\":\"b\"}\n"),
            ],
        );
        let client = client_with_timeout(&base, Duration::from_millis(300));
        let chunks = collect_stream(client).await;
        handle.join().unwrap();

        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("a".into()),
                StreamChunk::Failed(ProviderError::Timeout),
            ]
        );
    }

    #[tokio::test]
    async fn test_truncated_stream_is_transport_failure() {
        // Promises more bytes than it sends, then hangs up
        let (base, handle) = serve_paced(
            "Content-Length: 500\r\n",
            vec![(Duration::ZERO, "{\"response\":\"a\"}\n")],
        );
        let chunks = collect_stream(client_for(&base)).await;
        handle.join().unwrap();

        assert_eq!(chunks.first(), Some(&StreamChunk::Text("a".into())));
        assert_eq!(chunks.len(), 2);
        assert!(matches!(
            chunks.last(),
            Some(StreamChunk::Failed(ProviderError::Decode(_) | ProviderError::Request(_)))
        ));
    }

    #[tokio::test]
    async fn test_generate_trailing_null_is_empty() {
        let (base, handle) = serve_once(200, "{\"response\":\"hi\"}\nnull\n", Duration::ZERO);
        let gen = client_for(&base).generate("llama2", "hi").await.unwrap();
        handle.join().unwrap();
        assert_eq!(gen.reply, Reply::Empty);
    }

    #[test]
    fn test_reply_from_last() {
        assert_eq!(Reply::from_last(None), Reply::Empty);
        for blank in [
            serde_json::json!(null),
            serde_json::json!({}),
            serde_json::json!([]),
            serde_json::json!(""),
            serde_json::json!(0),
            serde_json::json!(false),
        ] {
            assert_eq!(Reply::from_last(Some(&blank)), Reply::Empty, "{}", blank);
        }
        assert_eq!(
            Reply::from_last(Some(&serde_json::json!({"error": {"code": 1}}))),
            Reply::ServiceError("{\"code\":1}".into())
        );
        assert_eq!(
            Reply::from_last(Some(&serde_json::json!([1, 2]))),
            Reply::Unexpected
        );
    }
}
