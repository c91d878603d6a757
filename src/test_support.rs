//! A very hacky in-process HTTP server for tests

use std::sync::Arc;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
};

/// Spawns a server on a random local port and returns its base URL (`http://127.0.0.1:<port>`)
///
/// `handler` receives the request head (the request line, e.g. `GET /list.m3u HTTP/1.1`, followed
/// by the header lines) and returns the status and body.
pub async fn spawn_stub<F>(handler: F) -> String
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut head = String::new();
                {
                    let mut reader = BufReader::new(&mut stream);
                    loop {
                        let mut line = String::new();
                        match reader.read_line(&mut line).await {
                            Ok(n) if n > 2 => head.push_str(&line),
                            _ => break,
                        }
                    }
                }
                if head.is_empty() {
                    return;
                }

                let (status, body) = handler(head.trim_end());
                let mut response = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                if !head.starts_with("HEAD") {
                    response.push_str(&body);
                }

                stream.write_all(response.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            });
        }
    });

    format!("http://{addr}")
}
