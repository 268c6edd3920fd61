//! 포트 레지스트리와 출력 멀티플렉서
//!
//! [`PortRegistry`]는 입력/출력 id마다 고유 포트를 할당하고, 런타임이 준비되면
//! 모든 엔드포인트에 연결합니다. 출력 연결마다 리더 태스크가 개행 단위로
//! 스트림을 잘라 하나의 채널로 보내며, 이 채널의 수신측이 [`OutputMux`]입니다.
//!
//! # 포트 할당
//! 카운터는 `3200 + [0, 3200)` 범위의 무작위 베이스에서 시작하며, 첫 포트는
//! `베이스 + 1`입니다. 한 레지스트리 안에서 포트는 재사용되지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! let mut registry = PortRegistry::new();
//! let in_port = registry.new_input("in")?;
//! let out_port = registry.new_output("out")?;
//! // ... 런타임 기동 후
//! let mut mux = registry.connect(&config).await?;
//! while let Some(event) = mux.recv().await {
//!     let id = registry.reverse_lookup(event.handle);
//! }
//! registry.disconnect_outputs();
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stashtest_core::metrics as m;

use crate::config::HarnessConfig;
use crate::error::HarnessError;

/// 포트 베이스 하한
const PORT_BASE: u16 = 3200;

/// 포트 베이스 무작위 범위 폭
const PORT_SPREAD: u16 = 3200;

/// 출력 이벤트 채널 용량
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// 엔드포인트 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Input,
    Output,
}

impl EndpointRole {
    /// 역할 이름 (`input` / `output`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 라이브 출력 연결 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 등록된 엔드포인트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// 파이프라인 안에서의 id
    pub id: String,
    /// 호스트/컨테이너 양쪽에서 같은 번호로 사용하는 포트
    pub port: u16,
    /// 역할
    pub role: EndpointRole,
}

/// 리더 태스크가 보내는 출력 페이로드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPayload {
    /// 개행 제거된 한 줄
    Line(Bytes),
    /// 상대방이 연결을 닫음
    Closed,
    /// 읽기 실패 (크기 초과 포함)
    Failed(String),
}

/// 출력 연결에서 발생한 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    /// 이벤트를 만든 연결
    pub handle: ConnectionHandle,
    /// 페이로드
    pub payload: OutputPayload,
}

/// 모든 출력 연결의 이벤트를 한 곳에서 수신하는 멀티플렉서
///
/// 모든 리더 태스크가 종료되면 [`recv`](Self::recv)는 `None`을 반환합니다.
pub struct OutputMux {
    rx: mpsc::Receiver<OutputEvent>,
}

impl OutputMux {
    /// 수신 채널에서 멀티플렉서를 생성합니다.
    pub fn new(rx: mpsc::Receiver<OutputEvent>) -> Self {
        Self { rx }
    }

    /// 다음 출력 이벤트를 기다립니다.
    pub async fn recv(&mut self) -> Option<OutputEvent> {
        self.rx.recv().await
    }

    /// 이미 도착해 있는 이벤트를 기다리지 않고 모두 꺼냅니다.
    pub fn drain_stale(&mut self) -> Vec<OutputEvent> {
        let mut stale = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            stale.push(event);
        }
        stale
    }
}

/// 입력 엔드포인트 HTTP 클라이언트
#[derive(Debug, Clone)]
pub struct InputClient {
    client: reqwest::Client,
    url: String,
}

impl InputClient {
    /// 요청 대상 URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// JSON 문서를 `/`로 POST합니다.
    pub async fn post_json(
        &self,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client.post(&self.url).json(payload).send().await
    }
}

/// 라이브 출력 연결
struct OutputLink {
    handle: ConnectionHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Docker `-p` 포트 매핑 목록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortForwardingSpec {
    /// 호스트와 컨테이너에서 같은 번호로 게시할 포트
    pub ports: Vec<u16>,
}

impl fmt::Display for PortForwardingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<String> = self.ports.iter().map(|p| format!("-p {p}:{p}")).collect();
        f.write_str(&flags.join(" "))
    }
}

/// 입력/출력 id별 포트 레지스트리
pub struct PortRegistry {
    /// 마지막으로 발급한 포트
    last_port: u16,
    inputs: BTreeMap<String, Endpoint>,
    outputs: BTreeMap<String, Endpoint>,
    input_clients: HashMap<String, InputClient>,
    output_links: HashMap<String, OutputLink>,
    /// 연결 핸들 -> 출력 id
    reverse: HashMap<ConnectionHandle, String>,
    next_handle: u64,
}

impl PortRegistry {
    /// 무작위 베이스로 레지스트리를 생성합니다.
    pub fn new() -> Self {
        let base = PORT_BASE + rand::thread_rng().gen_range(0..PORT_SPREAD);
        Self::with_base(base)
    }

    /// 주어진 베이스로 레지스트리를 생성합니다. 첫 포트는 `base + 1`입니다.
    pub fn with_base(base: u16) -> Self {
        Self {
            last_port: base,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            input_clients: HashMap::new(),
            output_links: HashMap::new(),
            reverse: HashMap::new(),
            next_handle: 0,
        }
    }

    /// 입력 엔드포인트를 등록하고 포트를 반환합니다.
    pub fn new_input(&mut self, id: &str) -> Result<u16, HarnessError> {
        self.register(EndpointRole::Input, id)
    }

    /// 출력 엔드포인트를 등록하고 포트를 반환합니다.
    pub fn new_output(&mut self, id: &str) -> Result<u16, HarnessError> {
        self.register(EndpointRole::Output, id)
    }

    fn register(&mut self, role: EndpointRole, id: &str) -> Result<u16, HarnessError> {
        let exists = match role {
            EndpointRole::Input => self.inputs.contains_key(id),
            EndpointRole::Output => self.outputs.contains_key(id),
        };
        if exists {
            return Err(HarnessError::DuplicateEndpoint {
                role,
                id: id.to_owned(),
            });
        }

        let port = self
            .last_port
            .checked_add(1)
            .ok_or(HarnessError::PortExhausted {
                last: self.last_port,
            })?;
        self.last_port = port;

        let endpoint = Endpoint {
            id: id.to_owned(),
            port,
            role,
        };
        match role {
            EndpointRole::Input => self.inputs.insert(id.to_owned(), endpoint),
            EndpointRole::Output => self.outputs.insert(id.to_owned(), endpoint),
        };

        metrics::counter!(m::HARNESS_ENDPOINTS_REGISTERED_TOTAL, m::LABEL_ROLE => role.as_str())
            .increment(1);
        debug!(role = %role, id, port, "endpoint registered");
        Ok(port)
    }

    /// 입력 엔드포인트 (id 순)
    pub fn inputs(&self) -> impl Iterator<Item = &Endpoint> {
        self.inputs.values()
    }

    /// 출력 엔드포인트 (id 순)
    pub fn outputs(&self) -> impl Iterator<Item = &Endpoint> {
        self.outputs.values()
    }

    /// 입력 id가 등록되어 있는지 확인합니다.
    pub fn has_input(&self, id: &str) -> bool {
        self.inputs.contains_key(id)
    }

    /// 출력 id가 등록되어 있는지 확인합니다.
    pub fn has_output(&self, id: &str) -> bool {
        self.outputs.contains_key(id)
    }

    /// 등록된 엔드포인트가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// 연결된 입력 클라이언트를 반환합니다.
    pub fn input_client(&self, id: &str) -> Result<&InputClient, HarnessError> {
        self.input_clients
            .get(id)
            .ok_or_else(|| HarnessError::NotConnected {
                role: EndpointRole::Input,
                id: id.to_owned(),
            })
    }

    /// 런타임이 게시해야 할 전체 포트 매핑 (발급 순서)
    pub fn port_forwarding_spec(&self) -> PortForwardingSpec {
        let mut ports: Vec<u16> = self
            .inputs
            .values()
            .chain(self.outputs.values())
            .map(|e| e.port)
            .collect();
        ports.sort_unstable();
        PortForwardingSpec { ports }
    }

    /// 라이브 연결을 소유한 출력 id를 반환합니다.
    pub fn reverse_lookup(&self, handle: ConnectionHandle) -> Option<&str> {
        self.reverse.get(&handle).map(String::as_str)
    }

    /// 모든 엔드포인트에 연결하고 출력 멀티플렉서를 반환합니다.
    ///
    /// 입력은 포트별 HTTP 클라이언트(요청 타임아웃 포함)를, 출력은 같은 타임아웃으로
    /// 제한된 TCP 연결과 리더 태스크를 만듭니다. 실패 시 해당 역할과 id를 포함한
    /// 에러를 반환하며, 그때까지 만든 출력 연결은 정리합니다.
    pub async fn connect(&mut self, config: &HarnessConfig) -> Result<OutputMux, HarnessError> {
        for endpoint in self.inputs.values() {
            let client = reqwest::Client::builder()
                .timeout(config.connect_timeout)
                .connect_timeout(config.connect_timeout)
                .build()
                .map_err(|e| HarnessError::Connect {
                    role: EndpointRole::Input,
                    id: endpoint.id.clone(),
                    reason: e.to_string(),
                })?;
            let url = format!("http://{}:{}/", config.host, endpoint.port);
            self.input_clients
                .insert(endpoint.id.clone(), InputClient { client, url });
        }

        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let endpoints: Vec<Endpoint> = self.outputs.values().cloned().collect();
        for endpoint in endpoints {
            let stream = match open_output(&config.host, endpoint.port, config.connect_timeout).await
            {
                Ok(stream) => stream,
                Err(reason) => {
                    self.disconnect_outputs();
                    return Err(HarnessError::Connect {
                        role: EndpointRole::Output,
                        id: endpoint.id,
                        reason,
                    });
                }
            };

            let handle = ConnectionHandle(self.next_handle);
            self.next_handle += 1;
            let cancel = CancellationToken::new();
            let task = tokio::spawn(read_output(
                handle,
                stream,
                tx.clone(),
                cancel.clone(),
                config.max_message_size,
            ));

            debug!(id = %endpoint.id, port = endpoint.port, handle = %handle, "output connected");
            self.reverse.insert(handle, endpoint.id.clone());
            self.output_links.insert(
                endpoint.id,
                OutputLink {
                    handle,
                    cancel,
                    task,
                },
            );
        }

        info!(
            inputs = self.input_clients.len(),
            outputs = self.output_links.len(),
            "all endpoints connected"
        );
        Ok(OutputMux::new(rx))
    }

    /// 모든 출력 연결을 닫습니다. 여러 번 호출해도 안전합니다.
    pub fn disconnect_outputs(&mut self) {
        for (id, link) in self.output_links.drain() {
            link.cancel.cancel();
            link.task.abort();
            self.reverse.remove(&link.handle);
            debug!(id = %id, handle = %link.handle, "output disconnected");
        }
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PortRegistry {
    fn drop(&mut self) {
        self.disconnect_outputs();
    }
}

async fn open_output(host: &str, port: u16, limit: Duration) -> Result<TcpStream, String> {
    match tokio::time::timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", limit.as_secs_f64())),
    }
}

/// 출력 연결 하나를 개행 단위로 읽어 채널로 보냅니다.
///
/// 최대 크기를 넘는 라인은 `Failed`로 보고하고 다음 개행까지 버린 뒤 계속 읽습니다.
async fn read_output(
    handle: ConnectionHandle,
    stream: TcpStream,
    tx: mpsc::Sender<OutputEvent>,
    cancel: CancellationToken,
    max_message_size: usize,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    // 개행 1바이트 여유
    let limit = max_message_size as u64 + 1;

    loop {
        buf.clear();
        let read = {
            let mut limited = (&mut reader).take(limit);
            tokio::select! {
                result = limited.read_until(b'\n', &mut buf) => result,
                _ = cancel.cancelled() => {
                    debug!(handle = %handle, "output reader cancelled");
                    return;
                }
            }
        };

        let (payload, terminal) = match read {
            Ok(0) => (OutputPayload::Closed, true),
            Ok(_) if !buf.ends_with(b"\n") && buf.len() > max_message_size => {
                let failed = OutputPayload::Failed(format!(
                    "line exceeds max message size ({max_message_size} bytes)"
                ));
                let skipped = tokio::select! {
                    result = skip_rest_of_line(&mut reader, limit) => result,
                    _ = cancel.cancelled() => {
                        debug!(handle = %handle, "output reader cancelled");
                        return;
                    }
                };
                match skipped {
                    Ok(true) => (failed, false),
                    Ok(false) => (failed, true),
                    Err(e) => (OutputPayload::Failed(format!("read error: {e}")), true),
                }
            }
            Ok(_) => {
                while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                    buf.pop();
                }
                if buf.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                (OutputPayload::Line(Bytes::copy_from_slice(&buf)), false)
            }
            Err(e) => (OutputPayload::Failed(format!("read error: {e}")), true),
        };

        if tx.send(OutputEvent { handle, payload }).await.is_err() {
            warn!(handle = %handle, "output multiplexer dropped, stopping reader");
            return;
        }
        if terminal {
            return;
        }
    }
}

/// 다음 개행까지 남은 바이트를 버립니다. 그 전에 연결이 끝나면 `false`입니다.
async fn skip_rest_of_line(
    reader: &mut BufReader<TcpStream>,
    limit: u64,
) -> std::io::Result<bool> {
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', &mut scratch).await?;
        if read == 0 {
            return Ok(false);
        }
        if scratch.ends_with(b"\n") {
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn random_base_is_in_range() {
        for _ in 0..64 {
            let mut registry = PortRegistry::new();
            let port = registry.new_input("in").unwrap();
            assert!(port > PORT_BASE && port <= PORT_BASE + PORT_SPREAD);
        }
    }

    #[test]
    fn first_port_is_base_plus_one() {
        let mut registry = PortRegistry::with_base(4000);
        assert_eq!(registry.new_input("in").unwrap(), 4001);
        assert_eq!(registry.new_output("out").unwrap(), 4002);
        assert_eq!(registry.new_input("in2").unwrap(), 4003);
    }

    #[test]
    fn same_id_allowed_once_per_role() {
        let mut registry = PortRegistry::with_base(4000);
        registry.new_input("main").unwrap();
        registry.new_output("main").unwrap();
        let err = registry.new_output("main").unwrap_err();
        assert!(matches!(
            err,
            HarnessError::DuplicateEndpoint {
                role: EndpointRole::Output,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_does_not_consume_port() {
        let mut registry = PortRegistry::with_base(4000);
        registry.new_input("a").unwrap();
        assert!(registry.new_input("a").is_err());
        assert_eq!(registry.new_input("b").unwrap(), 4002);
    }

    #[test]
    fn port_exhaustion_is_an_error() {
        let mut registry = PortRegistry::with_base(u16::MAX - 1);
        assert_eq!(registry.new_input("a").unwrap(), u16::MAX);
        assert!(matches!(
            registry.new_input("b"),
            Err(HarnessError::PortExhausted { last: u16::MAX })
        ));
    }

    #[test]
    fn port_forwarding_spec_renders_docker_flags() {
        let mut registry = PortRegistry::with_base(3200);
        registry.new_output("z-out").unwrap();
        registry.new_input("a-in").unwrap();
        let spec = registry.port_forwarding_spec();
        assert_eq!(spec.ports, vec![3201, 3202]);
        assert_eq!(spec.to_string(), "-p 3201:3201 -p 3202:3202");
    }

    #[test]
    fn empty_registry_has_empty_spec() {
        let registry = PortRegistry::with_base(3200);
        assert!(registry.is_empty());
        assert_eq!(registry.port_forwarding_spec().to_string(), "");
    }

    #[test]
    fn input_client_requires_connect() {
        let mut registry = PortRegistry::with_base(3200);
        registry.new_input("in").unwrap();
        assert!(matches!(
            registry.input_client("in"),
            Err(HarnessError::NotConnected { .. })
        ));
    }

    #[test]
    fn role_display() {
        assert_eq!(EndpointRole::Input.to_string(), "input");
        assert_eq!(EndpointRole::Output.to_string(), "output");
    }

    #[tokio::test]
    async fn drain_stale_returns_buffered_events() {
        let (tx, rx) = mpsc::channel(8);
        let mut mux = OutputMux::new(rx);
        for i in 0..3 {
            tx.send(OutputEvent {
                handle: ConnectionHandle(i),
                payload: OutputPayload::Closed,
            })
            .await
            .unwrap();
        }
        assert_eq!(mux.drain_stale().len(), 3);
        assert!(mux.drain_stale().is_empty());
    }

    #[tokio::test]
    async fn reader_frames_lines_and_reports_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"{\"a\":1}\r\n\n{\"b\"").await.unwrap();
            sock.write_all(b":2}\n").await.unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ConnectionHandle(7);
        tokio::spawn(read_output(handle, stream, tx, CancellationToken::new(), 1024));
        server.await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.handle, handle);
        assert_eq!(first.payload, OutputPayload::Line(Bytes::from_static(b"{\"a\":1}")));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.payload, OutputPayload::Line(Bytes::from_static(b"{\"b\":2}")));
        assert_eq!(rx.recv().await.unwrap().payload, OutputPayload::Closed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn reader_rejects_oversized_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[b'x'; 64]).await.unwrap();
            sock.write_all(b"\n").await.unwrap();
            sock
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(read_output(
            ConnectionHandle(0),
            stream,
            tx,
            CancellationToken::new(),
            16,
        ));
        let _sock = server.await.unwrap();

        match rx.recv().await.unwrap().payload {
            OutputPayload::Failed(reason) => assert!(reason.contains("max message size")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reader_recovers_after_oversized_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[b'x'; 100]).await.unwrap();
            sock.write_all(b"\n{\"ok\":true}\n").await.unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(read_output(
            ConnectionHandle(1),
            stream,
            tx,
            CancellationToken::new(),
            16,
        ));
        server.await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap().payload,
            OutputPayload::Failed(_)
        ));
        assert_eq!(
            rx.recv().await.unwrap().payload,
            OutputPayload::Line(Bytes::from_static(b"{\"ok\":true}"))
        );
        assert_eq!(rx.recv().await.unwrap().payload, OutputPayload::Closed);
    }

    #[tokio::test]
    async fn connect_failure_names_output() {
        // 바인드 후 즉시 닫아 사용되지 않는 포트를 확보
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut registry = PortRegistry::with_base(port - 1);
        registry.new_output("dead").unwrap();
        let config = HarnessConfig {
            host: "127.0.0.1".to_owned(),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let err = registry.connect(&config).await.err().unwrap();
        match err {
            HarnessError::Connect { role, id, .. } => {
                assert_eq!(role, EndpointRole::Output);
                assert_eq!(id, "dead");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn connect_and_disconnect_outputs() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let mut registry = PortRegistry::with_base(port - 1);
        registry.new_output("out").unwrap();
        let config = HarnessConfig {
            host: "127.0.0.1".to_owned(),
            ..Default::default()
        };
        let mut mux = registry.connect(&config).await.unwrap();
        let mut sock = accept.await.unwrap();
        sock.write_all(b"{\"k\":\"v\"}\n").await.unwrap();

        let event = mux.recv().await.unwrap();
        assert_eq!(registry.reverse_lookup(event.handle), Some("out"));

        registry.disconnect_outputs();
        registry.disconnect_outputs();
        assert_eq!(registry.reverse_lookup(event.handle), None);
        assert!(mux.recv().await.is_none());
    }
}
