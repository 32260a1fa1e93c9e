//! Walk the whole keyspace page by page.
//!
//! ```sh
//! cargo run --example scan -- 127.0.0.1 8888
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
    let mut start = Vec::new();
    let mut total = 0usize;
    loop {
        let page = client.scan(&start, b"", 100).await?;
        for (key, value) in &page.entries {
            println!(
                "{} = {}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
        total += page.entries.len();
        match page.next {
            Some(next) => start = next.to_vec(),
            None => break,
        }
    }
    println!("{total} keys");
    client.close().await
}
