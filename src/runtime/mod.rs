// src/runtime/mod.rs

//! Engine runtime: the process-wide I/O threads, the aio completion primitive and id tables.

pub(crate) mod aio;
pub(crate) mod id_map;

pub(crate) use aio::{Aio, AioRef};
pub(crate) use id_map::IdMap;

use std::future::Future;

use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::{NngError, NngResult};

/// Environment variable consulted for the default number of engine I/O threads.
pub const IO_THREADS_ENV: &str = "RNNG_IO_THREADS";

const DEFAULT_IO_THREADS: usize = 2;

static ENGINE_RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Settings for the engine's I/O threads.
///
/// Pipe notifications and all transport I/O run on these threads. They are started when the
/// first socket opens, or explicitly through [`init`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub io_threads: usize,
  pub thread_name: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    let io_threads = std::env::var(IO_THREADS_ENV)
      .ok()
      .and_then(|v| v.parse::<usize>().ok())
      .filter(|n| *n > 0)
      .unwrap_or(DEFAULT_IO_THREADS);
    Self {
      io_threads,
      thread_name: "rnng-io".to_string(),
    }
  }
}

impl EngineConfig {
  pub fn with_io_threads(mut self, io_threads: usize) -> Self {
    self.io_threads = io_threads.max(1);
    self
  }

  pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
    self.thread_name = name.into();
    self
  }
}

fn build(config: &EngineConfig) -> NngResult<Runtime> {
  tracing::debug!(io_threads = config.io_threads, thread_name = %config.thread_name, "Starting engine runtime");
  Builder::new_multi_thread()
    .worker_threads(config.io_threads)
    .thread_name(config.thread_name.clone())
    .enable_all()
    .build()
    .map_err(NngError::from)
}

/// Starts the engine with explicit settings.
///
/// Must run before the first socket opens; afterwards the engine is already running and this
/// returns `InvalidState`.
pub fn init(config: EngineConfig) -> NngResult<()> {
  let mut started = false;
  ENGINE_RUNTIME.get_or_try_init(|| {
    started = true;
    build(&config)
  })?;
  if started {
    Ok(())
  } else {
    Err(NngError::InvalidState("engine already initialized"))
  }
}

/// Handle to the engine runtime, starting it with defaults if needed.
pub(crate) fn handle() -> NngResult<Handle> {
  let rt = ENGINE_RUNTIME.get_or_try_init(|| build(&EngineConfig::default()))?;
  Ok(rt.handle().clone())
}

/// Spawns a task on the engine runtime.
pub(crate) fn spawn<F>(future: F) -> NngResult<JoinHandle<F::Output>>
where
  F: Future + Send + 'static,
  F::Output: Send + 'static,
{
  Ok(handle()?.spawn(future))
}
