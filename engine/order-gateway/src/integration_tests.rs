//! Submission over real HTTP against an in-process backend

use crate::{HttpOrderBackend, OrderGateway, OrderGatewayConfig, PositionBook, SubmissionState};
use portfolio_types::{
    Credentials, EngineError, InstrumentCatalog, InstrumentId, OrderIntent, Side, TicketId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

const X: InstrumentId = InstrumentId(26);
const WAIT: Duration = Duration::from_secs(5);

/// Reads each request and never answers until told to hang up
struct StallingBackend {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    hang_up: Option<oneshot::Sender<()>>,
}

impl StallingBackend {
    async fn spawn() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let (hang_up, hung_up) = oneshot::channel::<()>();

        let counter = requests.clone();
        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 8192];
            let mut received = Vec::new();
            while !contains_body(&received) {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = hung_up.await;
            drop(stream);
        });

        Self { addr, requests, hang_up: Some(hang_up) }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn hang_up(&mut self) {
        if let Some(tx) = self.hang_up.take() {
            let _ = tx.send(());
        }
    }
}

/// Headers done and at least the start of the JSON body arrived
fn contains_body(received: &[u8]) -> bool {
    let text = String::from_utf8_lossy(received);
    text.split_once("\r\n\r\n").map(|(_, body)| body.contains('}')).unwrap_or(false)
}

struct PricedBook;

impl PositionBook for PricedBook {
    fn held_shares(&self, _id: InstrumentId) -> Decimal {
        Decimal::ZERO
    }

    fn last_price(&self, _id: InstrumentId) -> Option<Decimal> {
        Some(dec!(2900))
    }
}

#[tokio::test]
async fn test_slow_backend_is_neither_cancelled_nor_resubmitted() {
    let mut server = StallingBackend::spawn().await;
    let backend = HttpOrderBackend::new(
        &server.base_url(),
        Duration::from_millis(200),
        Credentials::new("42", "token"),
    )
    .unwrap();
    let config = OrderGatewayConfig { submission_timeout_ms: 300, ..Default::default() };
    let gateway = OrderGateway::new(
        config,
        Arc::new(backend),
        Arc::new(PricedBook),
        Arc::new(InstrumentCatalog::permissive()),
    );
    let mut outcomes = gateway.outcomes();
    let intent = OrderIntent::instant(TicketId::new(), X, Side::Buy, 1);

    let err = gateway.submit(intent.clone()).await.unwrap_err();
    assert_eq!(err, EngineError::Timeout(Duration::from_millis(300)));

    // Well past the connect bound, the request is still outstanding
    sleep(Duration::from_millis(500)).await;
    assert_eq!(gateway.state_of(&intent.key()), Some(SubmissionState::Submitting));
    assert!(outcomes.try_recv().is_err());
    assert!(matches!(
        gateway.submit(intent.clone()).await,
        Err(EngineError::DuplicateSubmission(_))
    ));
    assert_eq!(server.requests(), 1);

    // The connection dies without an answer: unknown, not rejected
    server.hang_up();
    let outcome = timeout(WAIT, outcomes.recv()).await.unwrap().unwrap();
    assert_eq!(outcome.key, intent.key());
    assert_eq!(outcome.state, SubmissionState::Unconfirmed);
    assert_eq!(gateway.state_of(&intent.key()), Some(SubmissionState::Unconfirmed));
    assert!(matches!(
        gateway.submit(intent).await,
        Err(EngineError::DuplicateSubmission(_))
    ));
    assert_eq!(server.requests(), 1);
}
