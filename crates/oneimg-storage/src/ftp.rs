//! FTP storage over a single pooled control connection.
//!
//! suppaftp's `FtpStream` is blocking, so every protocol exchange runs on
//! `spawn_blocking` while holding the connection mutex.

use crate::error::{StorageError, StorageResult};
use crate::keys;
use bytes::Bytes;
use oneimg_core::FtpConfig;
use std::io::Cursor;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

pub const DEFAULT_PORT: u16 = 21;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Read and write bound on the control socket.
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, PartialEq, Eq)]
enum MkdirOutcome {
    Created,
    AlreadyExists,
    Forbidden(String),
    Failed(String),
}

fn classify_mkdir(result: Result<(), String>) -> MkdirOutcome {
    match result {
        Ok(()) => MkdirOutcome::Created,
        Err(msg) if msg.contains("553") => MkdirOutcome::Forbidden(msg),
        Err(msg) if msg.contains("550") || msg.to_lowercase().contains("already exists") => {
            MkdirOutcome::AlreadyExists
        }
        Err(msg) => MkdirOutcome::Failed(msg),
    }
}

fn is_not_found(msg: &str) -> bool {
    msg.contains("550") || msg.contains("No such file")
}

#[derive(Clone)]
pub struct FtpStorage {
    host: String,
    port: u16,
    user: String,
    password: String,
    io_timeout: Duration,
    conn: Arc<Mutex<Option<FtpStream>>>,
}

impl std::fmt::Debug for FtpStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpStorage")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl FtpStorage {
    pub fn new(config: &FtpConfig) -> Self {
        let port = if config.port == 0 {
            DEFAULT_PORT
        } else {
            config.port
        };
        FtpStorage {
            host: config.host.clone(),
            port,
            user: config.user.clone(),
            password: config.password.clone(),
            io_timeout: IO_TIMEOUT,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn resolve(&self) -> StorageResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| StorageError::ConfigError(format!("Invalid FTP host {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| StorageError::ConfigError(format!("FTP host {} did not resolve", self.host)))
    }

    fn connect(&self) -> StorageResult<FtpStream> {
        let addr = self.resolve()?;
        let connect_err = |e: String| StorageError::BackendError(format!("FTP connect to {} failed: {}", addr, e));
        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|e| connect_err(e.to_string()))?;
        // Set before the greeting is read so a silent server cannot block the thread.
        tcp.set_read_timeout(Some(self.io_timeout))
            .and_then(|_| tcp.set_write_timeout(Some(self.io_timeout)))
            .map_err(|e| connect_err(e.to_string()))?;
        let mut stream = FtpStream::connect_with_stream(tcp).map_err(|e| connect_err(e.to_string()))?;
        stream
            .login(&self.user, &self.password)
            .map_err(|e| StorageError::AuthFailed(format!("FTP login failed: {}", e)))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| StorageError::BackendError(format!("FTP binary mode failed: {}", e)))?;

        tracing::debug!(host = %self.host, port = self.port, "FTP connection established");
        Ok(stream)
    }

    /// Run `op` on a live connection, reconnecting when the pooled one fails NOOP.
    async fn with_connection<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> StorageResult<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = this
                .conn
                .lock()
                .map_err(|_| StorageError::BackendError("FTP connection lock poisoned".to_string()))?;

            let alive = match guard.as_mut() {
                Some(stream) => stream.noop().is_ok(),
                None => false,
            };
            if !alive {
                if guard.is_some() {
                    tracing::debug!(host = %this.host, "FTP connection stale, reconnecting");
                }
                *guard = Some(this.connect()?);
            }

            let stream = guard
                .as_mut()
                .ok_or_else(|| StorageError::BackendError("FTP connection unavailable".to_string()))?;
            let result = op(stream);
            if matches!(result, Err(StorageError::BackendError(_))) {
                // Drop a connection that may be mid-transfer.
                *guard = None;
            }
            result
        })
        .await
        .map_err(|e| StorageError::BackendError(format!("FTP task failed: {}", e)))?
    }

    fn make_dirs(stream: &mut FtpStream, dir: &str) -> StorageResult<()> {
        let mut current = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);

            let result = stream.mkdir(&current).map_err(|e: FtpError| e.to_string());
            match classify_mkdir(result) {
                MkdirOutcome::Created | MkdirOutcome::AlreadyExists => {}
                MkdirOutcome::Forbidden(msg) => {
                    return Err(StorageError::InvalidKey(format!(
                        "FTP refused directory name {}: {}",
                        current, msg
                    )));
                }
                MkdirOutcome::Failed(msg) => {
                    return Err(StorageError::UploadFailed(format!(
                        "FTP mkdir {} failed: {}",
                        current, msg
                    )));
                }
            }
        }
        Ok(())
    }

    pub async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let key = key.trim_start_matches('/').to_string();
        let size = data.len();
        let start = std::time::Instant::now();

        let op_key = key.clone();
        self.with_connection(move |stream| {
            if let Some(dir) = keys::parent_dir(&op_key) {
                Self::make_dirs(stream, dir)?;
            }
            let mut reader = Cursor::new(data);
            stream
                .put_file(&op_key, &mut reader)
                .map_err(|e| StorageError::UploadFailed(format!("FTP STOR {} failed: {}", op_key, e)))?;
            Ok(())
        })
        .await?;

        tracing::info!(
            host = %self.host,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "FTP upload successful"
        );
        Ok(())
    }

    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let key = key.trim_start_matches('/').to_string();
        self.with_connection(move |stream| match stream.retr_as_buffer(&key) {
            Ok(cursor) => Ok(Bytes::from(cursor.into_inner())),
            Err(e) => {
                let msg = e.to_string();
                if is_not_found(&msg) {
                    Err(StorageError::NotFound(key))
                } else {
                    Err(StorageError::DownloadFailed(msg))
                }
            }
        })
        .await
    }

    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        let key = key.trim_start_matches('/').to_string();
        self.with_connection(move |stream| {
            stream.rm(&key).map_err(|e| {
                let msg = e.to_string();
                if is_not_found(&msg) {
                    StorageError::NotFound(key.clone())
                } else {
                    StorageError::DeleteFailed(msg)
                }
            })
        })
        .await
    }

    /// Delete primary then thumbnail; any error, including not-found, gives false.
    pub async fn delete_object(&self, primary_key: &str, thumbnail_key: Option<&str>) -> bool {
        if let Err(e) = self.remove(primary_key).await {
            tracing::warn!(host = %self.host, key = %primary_key, error = %e, "FTP delete failed");
            return false;
        }
        if let Some(thumb) = thumbnail_key {
            if let Err(e) = self.remove(thumb).await {
                tracing::warn!(host = %self.host, key = %thumb, error = %e, "FTP thumbnail delete failed");
                return false;
            }
        }
        tracing::info!(host = %self.host, key = %primary_key, "FTP delete successful");
        true
    }
}
