//! 통합 테스트 공용 도구 -- 포트 예약과 가짜 파이프라인 서버

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use stashtest_harness::{HarnessConfig, HarnessConfigBuilder};

/// 연속된 포트 블록 (`base + 1`부터)
pub struct PortBlock {
    pub base: u16,
    listeners: Vec<std::net::TcpListener>,
}

impl PortBlock {
    /// 다음 포트의 리스너를 꺼냅니다 (발급 순서).
    pub fn take(&mut self) -> std::net::TcpListener {
        self.listeners.remove(0)
    }

    /// 다음 포트의 tokio 리스너를 꺼냅니다.
    pub fn take_tokio(&mut self) -> TcpListener {
        let listener = self.take();
        listener.set_nonblocking(true).unwrap();
        TcpListener::from_std(listener).unwrap()
    }

    /// 다음 포트를 비워 둡니다 (아무도 듣지 않는 포트).
    pub fn release(&mut self) -> u16 {
        let listener = self.take();
        listener.local_addr().unwrap().port()
    }
}

/// 레지스트리가 발급할 포트를 미리 바인드합니다.
pub fn reserve_ports(count: u16) -> PortBlock {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let base: u16 = rng.gen_range(20_000..60_000);
        let bound: Result<Vec<_>, _> = (1..=count)
            .map(|offset| std::net::TcpListener::bind(("127.0.0.1", base + offset)))
            .collect();
        if let Ok(listeners) = bound {
            return PortBlock { base, listeners };
        }
    }
    panic!("could not reserve {count} consecutive ports");
}

/// 빠른 테스트용 하네스 설정
pub fn fast_config(artifact_dir: &Path) -> HarnessConfig {
    HarnessConfigBuilder::new()
        .host("127.0.0.1")
        .submit_attempts(10)
        .submit_retry_interval(Duration::from_millis(100))
        .connect_timeout(Duration::from_secs(2))
        .output_deadline(Duration::from_secs(5))
        .silence_window(Duration::from_millis(500))
        .artifact_dir(artifact_dir)
        .build()
        .unwrap()
}

/// HTTP 요청 하나를 읽고 본문을 반환합니다. 연결이 닫혔으면 `None`.
pub async fn read_request(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<Vec<u8>>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let mut content_length = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// 빈 본문의 HTTP 응답을 씁니다.
pub async fn respond(stream: &mut TcpStream, status: u16, reason: &str) -> std::io::Result<()> {
    let response = format!("HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\n\r\n");
    stream.write_all(response.as_bytes()).await
}

/// 입력 문서 하나를 0개 이상의 출력 문서로 바꾸는 함수
pub type Transform = Arc<dyn Fn(Value) -> Vec<Value> + Send + Sync>;

/// HTTP 입력과 TCP 출력 서버로 파이프라인을 흉내냅니다.
///
/// 입력으로 받은 문서를 `transform`에 통과시켜 출력 연결에 한 줄씩 씁니다.
pub fn spawn_pipeline(input: TcpListener, output: TcpListener, transform: Transform) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        let (mut sock, _) = output.accept().await.unwrap();
        while let Some(line) = rx.recv().await {
            if sock.write_all(&line).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = input.accept().await else {
                return;
            };
            let tx = tx.clone();
            let transform = transform.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                while let Ok(Some(body)) = read_request(&mut reader).await {
                    let doc: Value = serde_json::from_slice(&body).unwrap();
                    if respond(reader.get_mut(), 200, "OK").await.is_err() {
                        return;
                    }
                    for out in transform(doc) {
                        let mut line = serde_json::to_vec(&out).unwrap();
                        line.push(b'\n');
                        let _ = tx.send(line);
                    }
                }
            });
        }
    })
}

/// 입력 문서 하나를 (출력 번호, 문서) 목록으로 바꾸는 함수
pub type Route = Arc<dyn Fn(Value) -> Vec<(usize, Value)> + Send + Sync>;

/// 출력이 여러 개인 파이프라인을 흉내냅니다.
///
/// `route`가 돌려준 순서대로 해당 출력 연결에 쓰며, 문서 사이에 잠시 쉬어
/// 러너가 보는 도착 순서를 고정합니다.
pub fn spawn_routing_pipeline(
    input: TcpListener,
    outputs: Vec<TcpListener>,
    route: Route,
) -> JoinHandle<()> {
    let mut senders = Vec::new();
    for output in outputs {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        senders.push(tx);
        tokio::spawn(async move {
            let (mut sock, _) = output.accept().await.unwrap();
            while let Some(line) = rx.recv().await {
                if sock.write_all(&line).await.is_err() {
                    break;
                }
            }
        });
    }

    tokio::spawn(async move {
        let (stream, _) = input.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        while let Ok(Some(body)) = read_request(&mut reader).await {
            let doc: Value = serde_json::from_slice(&body).unwrap();
            if respond(reader.get_mut(), 200, "OK").await.is_err() {
                return;
            }
            for (index, out) in route(doc) {
                let mut line = serde_json::to_vec(&out).unwrap();
                line.push(b'\n');
                let _ = senders[index].send(line);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    })
}

/// Logstash가 붙이는 메타데이터를 흉내냅니다.
pub fn with_transport_fields(mut doc: Value) -> Value {
    if let Some(map) = doc.as_object_mut() {
        map.insert("@timestamp".to_owned(), Value::from("2024-01-15T12:00:00.000Z"));
        map.insert("@version".to_owned(), Value::from("1"));
        map.insert("ignore_and_delete_host".to_owned(), Value::from("172.17.0.1"));
    }
    doc
}
