//! End-to-end tests against a scripted in-process server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use ssdb::{Client, ClientConfig, Reply, SsdbError};

/// Read one request (tokens up to the empty terminator line). `None` on
/// a cleanly closed connection.
async fn read_request(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut tokens = Vec::new();
    loop {
        let mut line = Vec::new();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        if line == b"\n" {
            return Ok(Some(tokens));
        }
        let digits = std::str::from_utf8(&line[..line.len() - 1]).expect("ascii length");
        let len: usize = digits.parse().expect("decimal length");
        let mut token = vec![0u8; len];
        reader.read_exact(&mut token).await?;
        let mut terminator = [0u8; 1];
        reader.read_exact(&mut terminator).await?;
        assert_eq!(terminator[0], b'\n');
        tokens.push(token);
    }
}

/// Emit a response frame: each blob length-prefixed, then an empty line.
fn frame_bytes(blobs: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for blob in blobs {
        out.extend_from_slice(blob.len().to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(blob);
        out.push(b'\n');
    }
    out.push(b'\n');
    out
}

/// Spawn a server that answers each request through `script`, which maps
/// the received tokens to response blobs. Returns the client config and
/// a counter of accepted connections.
async fn spawn_server(
    script: fn(&[Vec<u8>]) -> Vec<Vec<u8>>,
) -> (ClientConfig, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handle_connection(stream, script));
        }
    });
    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ClientConfig::default()
    };
    (config, accepted)
}

async fn handle_connection(stream: TcpStream, script: fn(&[Vec<u8>]) -> Vec<Vec<u8>>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    while let Ok(Some(request)) = read_request(&mut reader).await {
        let blobs = script(&request);
        let refs: Vec<&[u8]> = blobs.iter().map(|b| b.as_slice()).collect();
        if write_half.write_all(&frame_bytes(&refs)).await.is_err() {
            return;
        }
    }
}

fn ok_script(request: &[Vec<u8>]) -> Vec<Vec<u8>> {
    match request[0].as_slice() {
        b"ping" => vec![b"ok".to_vec()],
        b"set" | b"hset" | b"zset" | b"del" => vec![b"ok".to_vec(), b"1".to_vec()],
        b"get" => {
            if request[1] == b"missing" {
                vec![b"not_found".to_vec()]
            } else {
                vec![b"ok".to_vec(), b"bar".to_vec()]
            }
        }
        b"incr" => vec![b"ok".to_vec(), b"11".to_vec()],
        b"hgetall" => vec![
            b"ok".to_vec(),
            b"a".to_vec(),
            b"1".to_vec(),
            b"b".to_vec(),
            b"2".to_vec(),
        ],
        b"zrange" => vec![
            b"ok".to_vec(),
            b"a".to_vec(),
            b"1".to_vec(),
            b"b".to_vec(),
            b"2".to_vec(),
        ],
        b"scan" => vec![b"ok".to_vec()],
        b"dbsize" => vec![b"ok".to_vec(), b"42".to_vec()],
        _ => vec![b"error: unknown".to_vec()],
    }
}

#[tokio::test]
async fn test_ping_round_trip() {
    let (config, _) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_set_is_interpreted_as_integer() {
    let (config, _) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    let reply = client
        .execute("set", vec!["foo".into(), "bar".into()])
        .await
        .unwrap();
    assert_eq!(reply, Some(Reply::Int(1)));
}

#[tokio::test]
async fn test_get_present_and_missing() {
    let (config, _) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    assert_eq!(
        client.get(b"foo").await.unwrap(),
        Some(Bytes::from_static(b"bar"))
    );
    assert_eq!(client.get(b"missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_hgetall_keeps_server_order() {
    let (config, _) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    let entries = client.hgetall(b"h").await.unwrap();
    assert_eq!(
        entries,
        vec![
            (Bytes::from_static(b"a"), Bytes::from_static(b"1")),
            (Bytes::from_static(b"b"), Bytes::from_static(b"2")),
        ]
    );
}

#[tokio::test]
async fn test_zrange_parses_scores() {
    let (config, _) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    let entries = client.zrange(b"z", 0, 10).await.unwrap();
    assert_eq!(
        entries,
        vec![
            (Bytes::from_static(b"a"), 1),
            (Bytes::from_static(b"b"), 2),
        ]
    );
}

#[tokio::test]
async fn test_empty_scan_page() {
    let (config, _) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    let page = client.scan(b"", b"", 10).await.unwrap();
    assert_eq!(page.next, None);
    assert!(page.is_empty());
}

#[tokio::test]
async fn test_remote_error_carries_status_text() {
    let (config, _) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    let err = client
        .execute("unknown_cmd", vec![])
        .await
        .unwrap_err();
    match err {
        SsdbError::Remote(text) => assert_eq!(text, "error: unknown"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_crlf_responses_are_tolerated() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        let _ = stream.read(&mut buf).await.unwrap();
        stream.write_all(b"2\r\nok\r\n3\r\nbar\r\n\r\n").await.unwrap();
    });
    let client = Client::with_config(ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ClientConfig::default()
    });
    assert_eq!(
        client.get(b"foo").await.unwrap(),
        Some(Bytes::from_static(b"bar"))
    );
}

#[tokio::test]
async fn test_pool_reuses_one_connection_for_sequential_commands() {
    let (config, accepted) = spawn_server(ok_script).await;
    let client = Client::with_config(config);
    for _ in 0..5 {
        client.ping().await.unwrap();
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(client.pool().connection_count(), 1);
}

#[tokio::test]
async fn test_server_close_mid_command_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        let _ = stream.read(&mut buf).await.unwrap();
        // Close without answering.
        drop(stream);
    });
    let client = Client::with_config(ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ClientConfig::default()
    });
    let err = client.get(b"foo").await.unwrap_err();
    assert!(matches!(err, SsdbError::ConnectionClosed));
    // The broken connection is discarded, not pooled.
    assert_eq!(client.pool().connection_count(), 0);
    assert_eq!(client.pool().idle_count(), 0);
}

#[tokio::test]
async fn test_single_connection_mode_pins_one_socket() {
    let (mut config, accepted) = spawn_server(ok_script).await;
    config.single_connection = true;
    let client = Client::with_config(config);
    client.set(b"k", b"v").await.unwrap();
    client.ping().await.unwrap();
    assert_eq!(client.get(b"missing").await.unwrap(), None);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_auth_handshake_runs_before_first_command() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let auth = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(auth[0], b"auth");
        assert_eq!(auth[1], b"sesame");
        write_half
            .write_all(&frame_bytes(&[b"ok", b"1"]))
            .await
            .unwrap();

        let request = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(request[0], b"dbsize");
        write_half
            .write_all(&frame_bytes(&[b"ok", b"7"]))
            .await
            .unwrap();
    });
    let client = Client::with_config(ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        password: Some("sesame".into()),
        ..ClientConfig::default()
    });
    assert_eq!(client.dbsize().await.unwrap(), 7);
}

#[tokio::test]
async fn test_rejected_auth_fails_the_lease() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Both the initial attempt and the pool's single retry are
        // rejected.
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let auth = read_request(&mut reader).await.unwrap().unwrap();
            assert_eq!(auth[0], b"auth");
            write_half
                .write_all(&frame_bytes(&[b"error: wrong password"]))
                .await
                .unwrap();
        }
    });
    let client = Client::with_config(ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        password: Some("wrong".into()),
        ..ClientConfig::default()
    });
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, SsdbError::Auth(_)));
}

mod blocking {
    use super::*;
    use std::io::{BufRead, Read, Write};
    use std::net::TcpListener as StdTcpListener;
    use std::thread;

    use ssdb::blocking::BlockingClient;

    /// Synchronous scripted server for the blocking client, which runs
    /// its own runtime and must not share ours.
    fn spawn_std_server(expected_commands: usize) -> String {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = std::io::BufReader::new(stream.try_clone().expect("clone"));
            let mut stream = stream;
            for _ in 0..expected_commands {
                let request = read_std_request(&mut reader).expect("request");
                let response: Vec<&[u8]> = match request[0].as_slice() {
                    b"ping" => vec![b"ok"],
                    b"set" => vec![b"ok", b"1"],
                    b"get" => vec![b"ok", b"value"],
                    _ => vec![b"error: unknown"],
                };
                stream.write_all(&frame_bytes(&response)).expect("write");
                stream.flush().expect("flush");
            }
        });
        addr.to_string()
    }

    fn read_std_request(
        reader: &mut std::io::BufReader<std::net::TcpStream>,
    ) -> std::io::Result<Vec<Vec<u8>>> {
        let mut tokens = Vec::new();
        loop {
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line)?;
            if line == b"\n" {
                return Ok(tokens);
            }
            let digits = std::str::from_utf8(&line[..line.len() - 1]).expect("ascii");
            let len: usize = digits.parse().expect("decimal");
            let mut token = vec![0u8; len];
            reader.read_exact(&mut token)?;
            let mut terminator = [0u8; 1];
            reader.read_exact(&mut terminator)?;
            tokens.push(token);
        }
    }

    #[test]
    fn test_blocking_client_round_trip() {
        let addr = spawn_std_server(3);
        let (host, port) = addr.rsplit_once(':').expect("host:port");
        let client = BlockingClient::with_config(ClientConfig {
            host: host.to_string(),
            port: port.parse().expect("port"),
            ..ClientConfig::default()
        })
        .expect("client");

        client.ping().expect("ping");
        client.set(b"k", b"v").expect("set");
        assert_eq!(
            client.get(b"k").expect("get"),
            Some(Bytes::from_static(b"value"))
        );
        client.close().expect("close");
    }
}
