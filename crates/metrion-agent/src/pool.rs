//! Bounded send pool.
//!
//! `send` enqueues a batch on a channel whose capacity equals the worker
//! count, so callers backpressure naturally, and blocks on a per-request
//! reply channel until a worker finishes the pipeline:
//! serialize → gzip (manual-compression transports) → MAC over the
//! pre-compression bytes → RSA-OAEP blocks → post. Closing the pool drains
//! queued requests, then waits for every worker.

use crate::transport::{Reply, Transport, TransportError};
use metrion_common::compress::GzipPool;
use metrion_common::crypto::BodyEncryptor;
use metrion_common::metric::Metric;
use metrion_common::{sign, ENCRYPTED_HEADER, GZIP_ENCODING, HASH_HEADER};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("send pool requires at least one worker")]
    WorkerSizeInvalid,
    #[error("hash key must not be empty when signing is enabled")]
    EmptyHashKey,
    #[error("send pool requires a transport")]
    EmptyClient,
    #[error("server URL must not be empty")]
    ServerUrlEmpty,
    #[error("send pool is closed")]
    PoolClosed,
    #[error("worker abandoned the request")]
    WorkerFailed,
    #[error("cannot marshal batch: {0}")]
    Marshal(#[from] serde_json::Error),
    #[error("cannot compress payload: {0}")]
    Compress(#[from] std::io::Error),
    #[error("cannot encrypt payload: {0}")]
    Encrypt(#[from] metrion_common::crypto::CryptoError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Construction parameters for [`SendPool`].
pub struct PoolConfig {
    pub workers: usize,
    pub server_url: String,
    /// Shared secret for the body MAC. `Some("")` is a configuration error.
    pub hash_key: Option<String>,
    pub encryptor: Option<Arc<BodyEncryptor>>,
    pub transport: Option<Arc<dyn Transport>>,
}

struct Job {
    batch: Vec<Metric>,
    reply: oneshot::Sender<Result<Reply, PoolError>>,
}

struct WorkerCtx {
    server_url: String,
    hash_key: Option<String>,
    encryptor: Option<Arc<BodyEncryptor>>,
    transport: Arc<dyn Transport>,
    gzip: GzipPool,
}

#[derive(Debug)]
pub struct SendPool {
    tx: mpsc::Sender<Job>,
    closed: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SendPool {
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::WorkerSizeInvalid);
        }
        if matches!(config.hash_key.as_deref(), Some("")) {
            return Err(PoolError::EmptyHashKey);
        }
        let Some(transport) = config.transport else {
            return Err(PoolError::EmptyClient);
        };
        if config.server_url.is_empty() {
            return Err(PoolError::ServerUrlEmpty);
        }

        let (tx, rx) = mpsc::channel::<Job>(config.workers);
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(WorkerCtx {
            server_url: config.server_url,
            hash_key: config.hash_key,
            encryptor: config.encryptor,
            transport,
            gzip: GzipPool::new(),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            workers.push(tokio::spawn(worker_loop(
                id,
                ctx.clone(),
                rx.clone(),
                shutdown_rx.clone(),
            )));
        }

        Ok(Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            workers: Mutex::new(workers),
        })
    }

    /// Submits a batch and blocks until a worker delivers it or the pool
    /// closes.
    pub async fn send(&self, batch: Vec<Metric>) -> Result<Reply, PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::PoolClosed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            batch,
            reply: reply_tx,
        };
        if self.tx.send(job).await.is_err() {
            return Err(PoolError::PoolClosed);
        }
        // a worker that panics or is shut down mid-request drops the sender
        match reply_rx.await {
            Ok(result) => result,
            Err(_) if self.closed.load(Ordering::SeqCst) => Err(PoolError::PoolClosed),
            Err(_) => Err(PoolError::WorkerFailed),
        }
    }

    /// Rejects new submissions, drains queued requests and waits for every
    /// worker to exit. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("send pool closed");
    }

    /// Closes the pool when `shutdown` fires.
    pub fn watch_shutdown(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let pool = self.clone();
        tokio::spawn(async move {
            if shutdown.changed().await.is_ok() {
                pool.close().await;
            }
        });
    }
}

async fn worker_loop(
    id: usize,
    ctx: Arc<WorkerCtx>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker = id, transport = ctx.transport.name(), "worker started");
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(job) => job,
                    None => break,
                },
                _ = shutdown.changed() => {
                    // drain whatever is already queued before exiting
                    while let Ok(job) = rx.try_recv() {
                        process(&ctx, job).await;
                    }
                    break;
                }
            }
        };
        process(&ctx, job).await;
    }
    tracing::debug!(worker = id, "worker stopped");
}

async fn process(ctx: &WorkerCtx, job: Job) {
    let result = execute(ctx, &job.batch).await;
    if let Err(e) = &result {
        tracing::warn!(error = %e, "batch delivery failed");
    }
    // the caller may have given up; nothing to do then
    let _ = job.reply.send(result);
}

async fn execute(ctx: &WorkerCtx, batch: &[Metric]) -> Result<Reply, PoolError> {
    let payload = serde_json::to_vec(batch)?;
    let mut headers: Vec<(String, String)> = Vec::new();

    let compressed = if ctx.transport.needs_manual_compression() {
        headers.push(("Content-Encoding".to_string(), GZIP_ENCODING.to_string()));
        Some(ctx.gzip.compress(&payload)?)
    } else {
        None
    };

    // the MAC covers the pre-compression bytes on both transports
    if let Some(key) = &ctx.hash_key {
        headers.push((HASH_HEADER.to_string(), sign::compute(key, &payload)));
    }

    let pre_encrypt: &[u8] = compressed.as_deref().unwrap_or(&payload);
    let encrypted = match &ctx.encryptor {
        Some(encryptor) => {
            headers.push((ENCRYPTED_HEADER.to_string(), "1".to_string()));
            Some(encryptor.encrypt(pre_encrypt)?)
        }
        None => None,
    };
    let body: &[u8] = encrypted.as_deref().unwrap_or(pre_encrypt);

    let reply = ctx
        .transport
        .post(&ctx.server_url, body, &headers)
        .await?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct Recorded {
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    }

    struct MockTransport {
        manual_compression: bool,
        delay: Duration,
        requests: StdMutex<Vec<Recorded>>,
    }

    impl MockTransport {
        fn new(manual_compression: bool) -> Arc<Self> {
            Arc::new(Self {
                manual_compression,
                delay: Duration::ZERO,
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                manual_compression: true,
                delay,
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn header<'a>(recorded: &'a Recorded, name: &str) -> Option<&'a str> {
            recorded
                .headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn needs_manual_compression(&self) -> bool {
            self.manual_compression
        }

        async fn post(
            &self,
            _url: &str,
            body: &[u8],
            headers: &[(String, String)],
        ) -> Result<Reply, TransportError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.requests.lock().unwrap().push(Recorded {
                body: body.to_vec(),
                headers: headers.to_vec(),
            });
            Ok(Reply {
                status: 200,
                message: "ok".to_string(),
            })
        }
    }

    fn config(transport: Arc<dyn Transport>) -> PoolConfig {
        PoolConfig {
            workers: 2,
            server_url: "http://127.0.0.1:8080".to_string(),
            hash_key: None,
            encryptor: None,
            transport: Some(transport),
        }
    }

    fn batch() -> Vec<Metric> {
        vec![Metric::counter("PollCount", 3), Metric::gauge("Alloc", 1.5)]
    }

    #[test]
    fn construction_validates_its_inputs() {
        let transport: Arc<dyn Transport> = MockTransport::new(true);

        let mut bad = config(transport.clone());
        bad.workers = 0;
        assert!(matches!(
            SendPool::new(bad).unwrap_err(),
            PoolError::WorkerSizeInvalid
        ));

        let mut bad = config(transport.clone());
        bad.hash_key = Some(String::new());
        assert!(matches!(
            SendPool::new(bad).unwrap_err(),
            PoolError::EmptyHashKey
        ));

        let mut bad = config(transport.clone());
        bad.transport = None;
        assert!(matches!(
            SendPool::new(bad).unwrap_err(),
            PoolError::EmptyClient
        ));

        let mut bad = config(transport);
        bad.server_url = String::new();
        assert!(matches!(
            SendPool::new(bad).unwrap_err(),
            PoolError::ServerUrlEmpty
        ));
    }

    #[tokio::test]
    async fn send_delivers_serialized_batch() {
        let transport = MockTransport::new(false);
        let pool = SendPool::new(config(transport.clone())).unwrap();

        let reply = pool.send(batch()).await.unwrap();
        assert!(reply.is_success());

        let requests = transport.requests.lock().unwrap();
        let sent: Vec<Metric> = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent, batch());
    }

    #[tokio::test]
    async fn manual_compression_gzips_and_flags_the_body() {
        let transport = MockTransport::new(true);
        let pool = SendPool::new(config(transport.clone())).unwrap();
        pool.send(batch()).await.unwrap();

        let requests = transport.requests.lock().unwrap();
        let recorded = &requests[0];
        assert_eq!(
            MockTransport::header(recorded, "Content-Encoding"),
            Some("gzip")
        );
        let decompressed = metrion_common::compress::decode(&recorded.body).unwrap();
        let sent: Vec<Metric> = serde_json::from_slice(&decompressed).unwrap();
        assert_eq!(sent, batch());
    }

    #[tokio::test]
    async fn mac_covers_the_pre_compression_bytes() {
        let transport = MockTransport::new(true);
        let mut cfg = config(transport.clone());
        cfg.hash_key = Some("s3cret".to_string());
        let pool = SendPool::new(cfg).unwrap();
        pool.send(batch()).await.unwrap();

        let requests = transport.requests.lock().unwrap();
        let recorded = &requests[0];
        let mac = MockTransport::header(recorded, HASH_HEADER).unwrap();
        let decompressed = metrion_common::compress::decode(&recorded.body).unwrap();
        assert!(sign::verify("s3cret", &decompressed, mac));
    }

    #[tokio::test]
    async fn send_after_close_returns_pool_closed() {
        let transport = MockTransport::new(true);
        let pool = SendPool::new(config(transport)).unwrap();
        pool.close().await;

        assert!(matches!(
            pool.send(batch()).await.unwrap_err(),
            PoolError::PoolClosed
        ));
    }

    #[tokio::test]
    async fn close_waits_for_in_flight_requests() {
        let transport = MockTransport::slow(Duration::from_millis(50));
        let pool = Arc::new(SendPool::new(config(transport.clone())).unwrap());

        let sender = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.send(batch()).await })
        };
        // let the worker pick the job up before closing
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.close().await;

        let result = sender.await.unwrap();
        assert!(result.is_ok(), "in-flight request should complete: {result:?}");
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_watcher_closes_the_pool() {
        let transport = MockTransport::new(true);
        let pool = Arc::new(SendPool::new(config(transport)).unwrap());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        pool.watch_shutdown(shutdown_rx);

        shutdown_tx.send(true).unwrap();
        // the watcher runs on the runtime; give it a moment
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            pool.send(batch()).await.unwrap_err(),
            PoolError::PoolClosed
        ));
    }

    #[tokio::test]
    async fn concurrent_sends_all_get_their_own_reply() {
        let transport = MockTransport::new(false);
        let pool = Arc::new(SendPool::new(config(transport.clone())).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.send(vec![Metric::counter(format!("c{i}"), i)]).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(transport.requests.lock().unwrap().len(), 8);
    }
}
