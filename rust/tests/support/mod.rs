#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Minimal localhost HTTP/1.1 fixture: answers every request with a fixed
/// status and JSON body. Lives for the rest of the test process.
pub struct StubEndpoint {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl StubEndpoint {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn serve_json(status: u16, body: serde_json::Value) -> StubEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub endpoint");
    let addr = listener.local_addr().expect("stub endpoint addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let payload = serde_json::to_string(&body).expect("encode stub body");

    let hits_for_thread = hits.clone();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            hits_for_thread.fetch_add(1, Ordering::SeqCst);
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            read_request(&mut stream);

            let reason = match status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                _ => "Response",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    StubEndpoint {
        url: format!("http://{addr}"),
        hits,
    }
}

/// Drain one full request (headers + declared body) so the client never sees
/// its upload cut short.
fn read_request(stream: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = find_double_crlf(&data) {
            break pos + 4;
        }
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(_) => return,
        }
    };

    let content_length = content_length(&data[..header_end]).unwrap_or(0);
    while data.len() < header_end + content_length {
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(_) => return,
        }
    }
}

fn find_double_crlf(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(headers: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(headers);
    text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
