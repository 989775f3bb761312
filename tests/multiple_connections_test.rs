//! End-to-end scenario 4 from SPEC_FULL.md §8: concurrent clients each get
//! an independent request/response round trip through one proxy instance.

mod common;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn handles_multiple_concurrent_connections_independently() {
    let (proxy, _ca) = common::start_forwarding_test_proxy().await;

    let bodies = ["first", "second", "third"];
    let mut tasks = Vec::new();

    for body in bodies {
        let proxy_addr = proxy.local_addr();
        tasks.push(tokio::spawn(async move {
            let response_bytes = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let origin_addr =
                common::spawn_stub_origin(Box::leak(response_bytes.into_bytes().into_boxed_slice()))
                    .await;

            let mut client = TcpStream::connect(proxy_addr).await.unwrap();
            let request = format!("GET http://{origin_addr}/ HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
            client.write_all(request.as_bytes()).await.unwrap();

            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            let response = String::from_utf8(response).unwrap();
            assert!(response.ends_with(body));
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    proxy.abort();
}
