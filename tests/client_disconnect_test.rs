//! End-to-end scenario 5 from SPEC_FULL.md §8: a client that disconnects
//! before sending a request line costs the server nothing — no handler is
//! constructed, and the server keeps accepting new connections afterward.

mod common;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn disconnect_before_request_line_does_not_affect_later_connections() {
    let (proxy, _ca) = common::start_forwarding_test_proxy().await;

    // Connect and immediately close without writing anything.
    {
        let client = TcpStream::connect(proxy.local_addr()).await.unwrap();
        drop(client);
    }

    // Give the accept loop a moment to notice and spawn/finish that task.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // The server must still be accepting and forwarding normally.
    let origin_response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    let origin_addr = common::spawn_stub_origin(origin_response).await;

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let request = format!("GET http://{origin_addr}/ HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, origin_response);
    proxy.abort();
}
