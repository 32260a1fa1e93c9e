//! Minimal get/set round trip against a running SSDB server.
//!
//! ```sh
//! cargo run --example get_set -- 127.0.0.1 8888
//! ```

use ssdb::Client;

#[tokio::main]
async fn main() -> ssdb::Result<()> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(ssdb::ConnectionConfig::default().port);

    let client = Client::open(host, port);
    client.set(b"greeting", b"hello from rust").await?;
    match client.get(b"greeting").await? {
        Some(value) => println!("greeting = {}", String::from_utf8_lossy(&value)),
        None => println!("greeting not found"),
    }
    let count = client.incr(b"visits", 1).await?;
    println!("visits = {count}");
    client.close().await
}
