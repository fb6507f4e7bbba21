// benches/throughput.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rnng::{DialMode, NngResult, Protocol, Socket, SocketConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

// --- Benchmarking Constants ---
const NUM_MESSAGES: usize = 1000;
const BENCH_BUFFER: i32 = 1024;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

static ENDPOINT_SEQ: AtomicUsize = AtomicUsize::new(0);

fn setup_push_pull(scheme: &str) -> NngResult<(Socket, Socket)> {
  let seq = ENDPOINT_SEQ.fetch_add(1, Ordering::Relaxed);
  let url = match scheme {
    "tcp" => "tcp://127.0.0.1:0".to_string(),
    _ => format!("inproc://bench-throughput-{}", seq),
  };
  let pull = Socket::open(
    Protocol::Pull0,
    SocketConfig::new()
      .with_recv_buffer_size(BENCH_BUFFER)
      .with_recv_timeout(RECV_TIMEOUT),
  )?;
  let listener = pull.listen(&url)?;
  // Ephemeral tcp ports are only known after binding.
  let dial_url = listener.local_address()?.to_string();
  let push = Socket::open(Protocol::Push0, SocketConfig::new().with_send_buffer_size(BENCH_BUFFER))?;
  push.dial(&dial_url, DialMode::Blocking)?;
  Ok((push, pull))
}

fn push_pull_throughput(c: &mut Criterion) {
  let rt = Runtime::new().expect("tokio runtime");
  let mut group = c.benchmark_group("push_pull");
  group.measurement_time(Duration::from_secs(10));

  for scheme in ["inproc", "tcp"] {
    for size in [16usize, 1024, 16 * 1024] {
      let (push, pull) = setup_push_pull(scheme).expect("bench sockets");
      let payload = vec![0xA5u8; size];
      group.throughput(Throughput::Bytes((NUM_MESSAGES * size) as u64));
      let bench_id = BenchmarkId::new(scheme, size);
      group.bench_with_input(bench_id, &payload, |b, payload| {
        b.to_async(&rt).iter_custom(|iters| {
          let push = push.clone();
          let pull = pull.clone();
          let payload = payload.clone();
          async move {
            let start = Instant::now();
            for _ in 0..iters {
              let sender = {
                let push = push.clone();
                let payload = payload.clone();
                tokio::spawn(async move {
                  for _ in 0..NUM_MESSAGES {
                    push.async_send(&payload).await.expect("send");
                  }
                })
              };
              for _ in 0..NUM_MESSAGES {
                black_box(pull.async_recv().await.expect("recv"));
              }
              sender.await.expect("sender task");
            }
            start.elapsed()
          }
        })
      });
    }
  }
  group.finish();
}

fn req_rep_latency(c: &mut Criterion) {
  let url = format!("inproc://bench-latency-{}", ENDPOINT_SEQ.fetch_add(1, Ordering::Relaxed));
  let rep = Socket::open(Protocol::Rep0, SocketConfig::new().with_listen(url.clone())).expect("rep");
  let req = Socket::open(Protocol::Req0, SocketConfig::new().with_recv_timeout(RECV_TIMEOUT)).expect("req");
  req.dial(&url, DialMode::Blocking).expect("dial");

  let echo = std::thread::spawn(move || {
    while let Ok(request) = rep.recv(true) {
      if rep.send(&request).is_err() {
        break;
      }
    }
  });

  c.bench_function("req_rep_round_trip", |b| {
    b.iter(|| {
      req.send(black_box(b"ping")).expect("send");
      black_box(req.recv(true).expect("recv"));
    })
  });

  req.close().expect("close");
  drop(echo);
}

criterion_group!(benches, push_pull_throughput, req_rep_latency);
criterion_main!(benches);
