// src/transport/ipc.rs

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::error::{NngError, NngResult};
use crate::transport::{Connection, SockAddr};

pub(crate) struct IpcAcceptor {
  listener: UnixListener,
  path: PathBuf,
}

/// Binds a unix socket path. A leftover socket file nobody listens on is removed first.
pub(crate) fn bind(path: &Path, url: &str) -> NngResult<IpcAcceptor> {
  let listener = match UnixListener::bind(path) {
    Ok(l) => l,
    Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
      if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(NngError::AddrInUse(url.to_string()));
      }
      tracing::debug!(path = ?path, "Removing stale IPC socket file");
      let _ = std::fs::remove_file(path);
      UnixListener::bind(path).map_err(|e| NngError::from_io_endpoint(e, url))?
    }
    Err(e) => return Err(NngError::from_io_endpoint(e, url)),
  };
  tracing::info!(path = ?path, "IPC listener bound");
  Ok(IpcAcceptor {
    listener,
    path: path.to_path_buf(),
  })
}

impl IpcAcceptor {
  pub fn local_addr(&self) -> SockAddr {
    SockAddr::Ipc(self.path.clone())
  }

  pub async fn accept(&mut self) -> NngResult<Connection> {
    let (stream, _) = self.listener.accept().await?;
    Ok(Connection {
      stream: Box::new(stream),
      local: SockAddr::Ipc(self.path.clone()),
      remote: SockAddr::Ipc(self.path.clone()),
    })
  }
}

impl Drop for IpcAcceptor {
  fn drop(&mut self) {
    if let Err(e) = std::fs::remove_file(&self.path) {
      if e.kind() != io::ErrorKind::NotFound {
        tracing::warn!(path = ?self.path, error = %e, "Failed to remove IPC socket file");
      }
    }
  }
}

pub(crate) async fn connect(path: &Path, url: &str) -> NngResult<Connection> {
  let stream = UnixStream::connect(path)
    .await
    .map_err(|e| NngError::from_io_endpoint(e, url))?;
  Ok(Connection {
    stream: Box::new(stream),
    local: SockAddr::Ipc(path.to_path_buf()),
    remote: SockAddr::Ipc(path.to_path_buf()),
  })
}
