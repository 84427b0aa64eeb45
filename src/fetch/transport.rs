//! Blocking HTTP GET used by the page fetcher.

use std::time::Duration;

use crate::config::FetchConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status line, `Retry-After` header and body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One GET request. `Err` carries a transport failure (no HTTP status was received).
pub trait HttpTransport {
    fn get(&mut self, url: &str) -> Result<HttpReply, String>;
}

/// `HttpTransport` backed by a `ureq` agent.
pub struct UreqTransport {
    http_client: ureq::Agent,
    user_agent: String,
    accept_language: String,
}

impl UreqTransport {
    pub fn new(config: &FetchConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            http_client,
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn get(&mut self, url: &str) -> Result<HttpReply, String> {
        let result = self
            .http_client
            .get(url)
            .set("User-Agent", &self.user_agent)
            .set("Accept-Language", &self.accept_language)
            .call();
        match result {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|error| format!("Failed to read response: {error}"))?;
                Ok(HttpReply {
                    status,
                    retry_after: None,
                    body,
                })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpReply {
                status,
                retry_after: response.header("Retry-After").map(str::to_string),
                body: String::new(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(format!("Request failed: {transport}")),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    /// Answers one connection per canned response on a loopback port.
    /// Joining the handle yields the raw requests in arrival order.
    pub fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("loopback bind should succeed");
        let address = listener
            .local_addr()
            .expect("bound listener should have an address");
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().expect("client should connect");
                requests.push(read_request(&mut stream));
                stream
                    .write_all(response.as_bytes())
                    .expect("response write should succeed");
            }
            requests
        });
        (format!("http://{address}"), handle)
    }

    /// Base URL of a loopback port nothing listens on.
    pub fn refused_base_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("loopback bind should succeed");
        let address = listener
            .local_addr()
            .expect("bound listener should have an address");
        drop(listener);
        format!("http://{address}")
    }

    pub fn response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut text = format!("HTTP/1.1 {status_line}\r\n");
        for (name, value) in headers {
            text.push_str(&format!("{name}: {value}\r\n"));
        }
        text.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));
        text
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(header_end) = data.windows(4).position(|window| window == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
                let body_len = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.trim().eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + body_len {
                    break;
                }
            }
            let read = stream.read(&mut chunk).expect("request read should succeed");
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
        }
        String::from_utf8_lossy(&data).into_owned()
    }
}
