use std::time::Duration;

use super::ollama_types::{
    nanos_to_secs, validate_base_url, GenerateOptions, GenerateRequest, GenerateResponse,
};
use super::{Generation, InferenceBackend, InferenceError};

/// Time allowed to establish the TCP connection. The request deadline is
/// supplied per call.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    /// Create a client pointing at a local Ollama instance.
    ///
    /// Rejects non-loopback endpoints.
    pub fn new(base_url: &str) -> Result<Self, InferenceError> {
        validate_base_url(base_url)?;

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error, timeout: Duration) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout(timeout.as_secs())
        } else if e.is_connect() {
            tracing::error!(url = %self.base_url, error = %e, "Failed to connect to Ollama server");
            tracing::info!(
                "Make sure Ollama is running and accessible at {}",
                self.base_url
            );
            InferenceError::Connection(self.base_url.clone())
        } else {
            InferenceError::HttpClient(e.to_string())
        }
    }
}

impl InferenceBackend for OllamaClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        context_size: u32,
        timeout: Duration,
    ) -> Result<Generation, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_ctx: context_size,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(timeout.as_secs())
            } else {
                InferenceError::ResponseParsing(e.to_string())
            }
        })?;

        Ok(Generation {
            text: parsed.response,
            tokens_generated: parsed.eval_count.unwrap_or(0),
            prompt_tokens: parsed.prompt_eval_count,
            compute_time_secs: parsed.eval_duration.map(nanos_to_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    /// Read one HTTP request (headers plus Content-Length body).
    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve a single canned response. Returns the base URL and the captured request.
    fn serve_once(
        status_line: &'static str,
        body: &str,
        delay: Duration,
    ) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let body = body.to_string();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let request = read_request(&mut stream);
                let _ = tx.send(request);
                thread::sleep(delay);
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (format!("http://127.0.0.1:{port}"), rx)
    }

    #[test]
    fn generate_parses_metrics() {
        let (url, rx) = serve_once(
            "200 OK",
            r#"{"response":"Forty two.","done":true,"eval_count":100,"eval_duration":500000000,"prompt_eval_count":2000}"#,
            Duration::ZERO,
        );
        let client = OllamaClient::new(&url).unwrap();
        let generation = client
            .generate("llama3", "count this", 2048, Duration::from_secs(5))
            .unwrap();

        assert_eq!(generation.text, "Forty two.");
        assert_eq!(generation.tokens_generated, 100);
        assert_eq!(generation.prompt_tokens, Some(2000));
        assert!((generation.tokens_per_second().unwrap() - 200.0).abs() < 1e-6);

        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /api/generate"));
        assert!(request.contains("\"num_ctx\":2048"));
        assert!(request.contains("\"stream\":false"));
    }

    #[test]
    fn generate_without_duration_has_no_rate() {
        let (url, _rx) = serve_once("200 OK", r#"{"response":"ok","eval_count":5}"#, Duration::ZERO);
        let client = OllamaClient::new(&url).unwrap();
        let generation = client
            .generate("llama3", "p", 1024, Duration::from_secs(5))
            .unwrap();
        assert!(generation.compute_time_secs.is_none());
        assert!(generation.tokens_per_second().is_none());
    }

    #[test]
    fn error_status_maps_to_api_error() {
        let (url, _rx) = serve_once(
            "500 Internal Server Error",
            r#"{"error":"model requires more system memory"}"#,
            Duration::ZERO,
        );
        let client = OllamaClient::new(&url).unwrap();
        let err = client
            .generate("llama3", "p", 131072, Duration::from_secs(5))
            .unwrap_err();
        match err {
            InferenceError::Api { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("system memory"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_body_is_parsing_error() {
        let (url, _rx) = serve_once("200 OK", "not json", Duration::ZERO);
        let client = OllamaClient::new(&url).unwrap();
        let err = client
            .generate("llama3", "p", 1024, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, InferenceError::ResponseParsing(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn slow_server_times_out() {
        let (url, _rx) = serve_once("200 OK", r#"{"response":"late"}"#, Duration::from_secs(3));
        let client = OllamaClient::new(&url).unwrap();
        let err = client
            .generate("llama3", "p", 1024, Duration::from_millis(200))
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[test]
    fn refused_connection_is_connection_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = OllamaClient::new(&format!("http://127.0.0.1:{port}")).unwrap();
        let err = client
            .generate("llama3", "p", 1024, Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, InferenceError::Connection(_)), "got {err:?}");
        assert!(err.is_fatal());
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn constructor_rejects_remote_endpoint() {
        assert!(matches!(
            OllamaClient::new("http://10.0.0.5:11434"),
            Err(InferenceError::NonLocalEndpoint)
        ));
    }
}
