// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every helper

use rnng::{DialMode, NngResult, Protocol, SockAddr, Socket, SocketConfig};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::{Duration, Instant};

static IPC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);
static INPROC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(250);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(2);

/// Installs a test-captured tracing subscriber once. `RUST_LOG` overrides the default filter.
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rnng=debug"));
    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();
    // Another harness may have installed one already.
    let _ = tracing::subscriber::set_global_default(subscriber);
    println!("Tracing subscriber initialized.");
  });
}

pub fn unique_ipc_endpoint() -> String {
  let pid = std::process::id();
  let count = IPC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("ipc:///tmp/rnng_test_{}_{}.sock", pid, count)
}

pub fn unique_inproc_endpoint() -> String {
  let pid = std::process::id();
  let count = INPROC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("inproc://rnng_test_{}_{}", pid, count)
}

/// Opens a socket with a receive timeout so a broken test fails instead of hanging.
pub fn socket(protocol: Protocol) -> Socket {
  setup_tracing();
  Socket::open(protocol, SocketConfig::new().with_recv_timeout(LONG_TIMEOUT)).expect("open socket")
}

/// A listening socket and a socket dialed to it, connected on a fresh inproc address.
pub fn connected_pair(server: Protocol, client: Protocol) -> NngResult<(Socket, Socket)> {
  let url = unique_inproc_endpoint();
  let s = socket(server);
  s.listen(&url)?;
  let c = socket(client);
  c.dial(&url, DialMode::Blocking)?;
  Ok((s, c))
}

/// The address a TCP listener actually bound, in dialable form.
pub fn dialable(addr: &SockAddr) -> String {
  match addr {
    SockAddr::Tcp(a) => format!("tcp://{}", a),
    other => other.to_string(),
  }
}

/// Polls `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if check() {
      return true;
    }
    std::thread::sleep(Duration::from_millis(10));
  }
  check()
}
