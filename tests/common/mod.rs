//! Canned-response HTTP server for tracking client tests

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

/// One request as the server saw it.
#[derive(Debug)]
pub struct Request {
    /// e.g. `POST /api/2.0/mlflow/runs/create HTTP/1.1`
    pub line: String,
    pub body: String,
}

impl Request {
    pub fn is(&self, method: &str, path: &str) -> bool {
        self.line.starts_with(&format!("{method} {path}"))
    }
}

/// Serves one canned `(status, body)` answer per connection, in order.
pub struct MockServer {
    pub uri: String,
    handle: JoinHandle<Vec<Request>>,
}

impl MockServer {
    pub fn start(answers: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in answers {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let mut content_length = 0;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header.trim().is_empty() {
                        break;
                    }
                    let lower = header.to_ascii_lowercase();
                    if let Some(value) = lower.strip_prefix("content-length:") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                let mut request_body = vec![0; content_length];
                reader.read_exact(&mut request_body).unwrap();
                seen.push(Request {
                    line: line.trim().to_string(),
                    body: String::from_utf8_lossy(&request_body).into_owned(),
                });

                let mut stream = reader.into_inner();
                write!(
                    stream,
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
            }
            seen
        });
        Self { uri, handle }
    }

    /// Wait for every answer to be served and return the requests.
    pub fn requests(self) -> Vec<Request> {
        self.handle.join().unwrap()
    }
}

pub fn ok(body: impl Into<String>) -> (u16, String) {
    (200, body.into())
}

pub fn refuse(status: u16, error_code: &str, message: &str) -> (u16, String) {
    (
        status,
        format!(r#"{{"error_code":"{error_code}","message":"{message}"}}"#),
    )
}
