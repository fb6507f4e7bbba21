// src/engine/options.rs

//! Named option tables.
//!
//! Each entity kind has one table mapping an option name to its value kind, a getter and (for
//! writable options) a setter. The tables are built once; registering a name twice is a
//! programming error that is logged and ignored.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::core::{validate_depth, SocketCore};
use super::endpoint::EndpointCore;
use super::pipe::PipeCore;
use crate::error::{NngError, NngResult};
use crate::socket::options::*;
use crate::socket::Protocol;
use crate::transport::SockAddr;

type Getter<T> = fn(&T) -> NngResult<OptionValue>;
type Setter<T> = fn(&T, OptionValue) -> NngResult<()>;

struct OptionEntry<T> {
  kind: OptionKind,
  get: Option<Getter<T>>,
  set: Option<Setter<T>>,
}

pub(crate) struct OptionTable<T> {
  entity: &'static str,
  entries: HashMap<&'static str, OptionEntry<T>>,
}

impl<T> OptionTable<T> {
  fn new(entity: &'static str) -> Self {
    Self {
      entity,
      entries: HashMap::new(),
    }
  }

  fn register(mut self, name: &'static str, entry: OptionEntry<T>) -> Self {
    if self.entries.contains_key(name) {
      tracing::error!(entity = self.entity, option = name, "Duplicate option registration ignored");
      return self;
    }
    self.entries.insert(name, entry);
    self
  }

  fn ro(self, name: &'static str, kind: OptionKind, get: Getter<T>) -> Self {
    self.register(name, OptionEntry { kind, get: Some(get), set: None })
  }

  fn rw(self, name: &'static str, kind: OptionKind, get: Getter<T>, set: Setter<T>) -> Self {
    self.register(
      name,
      OptionEntry {
        kind,
        get: Some(get),
        set: Some(set),
      },
    )
  }

  fn wo(self, name: &'static str, kind: OptionKind, set: Setter<T>) -> Self {
    self.register(name, OptionEntry { kind, get: None, set: Some(set) })
  }

  fn entry(&self, name: &str) -> NngResult<&OptionEntry<T>> {
    self
      .entries
      .get(name)
      .ok_or_else(|| NngError::InvalidOption(format!("{} has no option '{}'", self.entity, name)))
  }

  pub fn kind(&self, name: &str) -> NngResult<OptionKind> {
    self.entry(name).map(|e| e.kind)
  }

  pub fn get(&self, target: &T, name: &str) -> NngResult<OptionValue> {
    let entry = self.entry(name)?;
    let get = entry.get.ok_or_else(|| NngError::WriteOnly(name.to_string()))?;
    get(target)
  }

  pub fn set(&self, target: &T, name: &str, value: OptionValue) -> NngResult<()> {
    let entry = self.entry(name)?;
    let set = entry.set.ok_or_else(|| NngError::ReadOnly(name.to_string()))?;
    if value.kind() != entry.kind {
      return Err(NngError::BadType(format!(
        "{} expects {:?}, got {:?}",
        name,
        entry.kind,
        value.kind()
      )));
    }
    set(target, value)
  }
}

fn require(socket: &SocketCore, protocol: Protocol, option: &'static str) -> NngResult<()> {
  if socket.protocol == protocol {
    Ok(())
  } else {
    Err(NngError::NotSupported(option))
  }
}

fn finite(name: &str, value: Option<std::time::Duration>) -> NngResult<std::time::Duration> {
  value.ok_or_else(|| NngError::InvalidArgument(format!("{} cannot be infinite", name)))
}

pub(crate) static SOCKET_OPTIONS: Lazy<OptionTable<SocketCore>> = Lazy::new(|| {
  OptionTable::<SocketCore>::new("socket")
    .rw(
      SOCKET_NAME,
      OptionKind::Str,
      |s| Ok(OptionValue::Str(s.options.read().name.clone())),
      |s, v| {
        s.options.write().name = v.into_string()?;
        Ok(())
      },
    )
    .ro(RAW, OptionKind::Bool, |_| Ok(OptionValue::Bool(false)))
    .ro(PROTOCOL, OptionKind::Int, |s| Ok(OptionValue::Int(i32::from(s.protocol.id()))))
    .ro(PROTOCOL_NAME, OptionKind::Str, |s| Ok(OptionValue::Str(s.protocol.name().into())))
    .ro(PEER, OptionKind::Int, |s| Ok(OptionValue::Int(i32::from(s.protocol.peer().id()))))
    .ro(PEER_NAME, OptionKind::Str, |s| Ok(OptionValue::Str(s.protocol.peer_name().into())))
    .rw(
      RECV_BUFFER,
      OptionKind::Int,
      |s| Ok(OptionValue::Int(s.options.read().recv_buffer)),
      |s, v| {
        s.options.write().recv_buffer = validate_depth(RECV_BUFFER, v.into_int()?)?;
        Ok(())
      },
    )
    .rw(
      SEND_BUFFER,
      OptionKind::Int,
      |s| Ok(OptionValue::Int(s.options.read().send_buffer)),
      |s, v| {
        s.options.write().send_buffer = validate_depth(SEND_BUFFER, v.into_int()?)?;
        Ok(())
      },
    )
    .rw(
      RECV_TIMEOUT,
      OptionKind::Ms,
      |s| Ok(OptionValue::Ms(s.options.read().recv_timeout)),
      |s, v| {
        s.options.write().recv_timeout = v.into_ms()?;
        Ok(())
      },
    )
    .rw(
      SEND_TIMEOUT,
      OptionKind::Ms,
      |s| Ok(OptionValue::Ms(s.options.read().send_timeout)),
      |s, v| {
        s.options.write().send_timeout = v.into_ms()?;
        Ok(())
      },
    )
    .rw(
      TTL_MAX,
      OptionKind::Int,
      |s| Ok(OptionValue::Int(s.options.read().ttl_max)),
      |s, v| {
        let ttl = v.into_int()?;
        if !(1..=255).contains(&ttl) {
          return Err(NngError::InvalidArgument(format!("{} must be within 1..=255", TTL_MAX)));
        }
        s.options.write().ttl_max = ttl;
        Ok(())
      },
    )
    .rw(
      RECV_SIZE_MAX,
      OptionKind::Size,
      |s| Ok(OptionValue::Size(s.options.read().recv_max_size)),
      |s, v| {
        s.options.write().recv_max_size = v.into_size()?;
        Ok(())
      },
    )
    .rw(
      RECONNECT_TIME_MIN,
      OptionKind::Ms,
      |s| Ok(OptionValue::from(s.options.read().reconnect_min)),
      |s, v| {
        s.options.write().reconnect_min = finite(RECONNECT_TIME_MIN, v.into_ms()?)?;
        Ok(())
      },
    )
    .rw(
      RECONNECT_TIME_MAX,
      OptionKind::Ms,
      |s| Ok(OptionValue::from(s.options.read().reconnect_max)),
      |s, v| {
        s.options.write().reconnect_max = finite(RECONNECT_TIME_MAX, v.into_ms()?)?;
        Ok(())
      },
    )
    .rw(
      TCP_NODELAY,
      OptionKind::Bool,
      |s| Ok(OptionValue::Bool(s.options.read().tcp_nodelay)),
      |s, v| {
        s.options.write().tcp_nodelay = v.into_bool()?;
        Ok(())
      },
    )
    .rw(
      TCP_KEEPALIVE,
      OptionKind::Bool,
      |s| Ok(OptionValue::Bool(s.options.read().tcp_keepalive)),
      |s, v| {
        s.options.write().tcp_keepalive = v.into_bool()?;
        Ok(())
      },
    )
    .rw(
      PAIR1_POLYAMOROUS,
      OptionKind::Bool,
      |s| {
        require(s, Protocol::Pair1, PAIR1_POLYAMOROUS)?;
        Ok(OptionValue::Bool(s.options.read().polyamorous))
      },
      |s, v| {
        require(s, Protocol::Pair1, PAIR1_POLYAMOROUS)?;
        s.options.write().polyamorous = v.into_bool()?;
        Ok(())
      },
    )
    .wo(SUB_SUBSCRIBE, OptionKind::Str, |s, v| {
      require(s, Protocol::Sub0, SUB_SUBSCRIBE)?;
      s.subscribe(v.into_string()?.as_bytes(), true)
    })
    .wo(SUB_UNSUBSCRIBE, OptionKind::Str, |s, v| {
      require(s, Protocol::Sub0, SUB_UNSUBSCRIBE)?;
      s.subscribe(v.into_string()?.as_bytes(), false)
    })
    .rw(
      SURVEYOR_SURVEY_TIME,
      OptionKind::Ms,
      |s| {
        require(s, Protocol::Surveyor0, SURVEYOR_SURVEY_TIME)?;
        Ok(OptionValue::from(s.options.read().survey_time))
      },
      |s, v| {
        require(s, Protocol::Surveyor0, SURVEYOR_SURVEY_TIME)?;
        s.options.write().survey_time = finite(SURVEYOR_SURVEY_TIME, v.into_ms()?)?;
        Ok(())
      },
    )
});

/// Options shared by dialers and listeners.
fn endpoint_table(entity: &'static str) -> OptionTable<EndpointCore> {
  OptionTable::<EndpointCore>::new(entity)
    .ro(URL, OptionKind::Str, |e| Ok(OptionValue::Str(e.url.clone())))
    .rw(
      RECV_SIZE_MAX,
      OptionKind::Size,
      |e| Ok(OptionValue::Size(e.options.read().recv_max_size)),
      |e, v| {
        e.options.write().recv_max_size = v.into_size()?;
        Ok(())
      },
    )
    .rw(
      TCP_NODELAY,
      OptionKind::Bool,
      |e| Ok(OptionValue::Bool(e.options.read().tcp_nodelay)),
      |e, v| {
        e.options.write().tcp_nodelay = v.into_bool()?;
        Ok(())
      },
    )
    .rw(
      TCP_KEEPALIVE,
      OptionKind::Bool,
      |e| Ok(OptionValue::Bool(e.options.read().tcp_keepalive)),
      |e, v| {
        e.options.write().tcp_keepalive = v.into_bool()?;
        Ok(())
      },
    )
}

pub(crate) static DIALER_OPTIONS: Lazy<OptionTable<EndpointCore>> = Lazy::new(|| {
  endpoint_table("dialer")
    .rw(
      RECONNECT_TIME_MIN,
      OptionKind::Ms,
      |e| Ok(OptionValue::from(e.options.read().reconnect_min)),
      |e, v| {
        e.options.write().reconnect_min = finite(RECONNECT_TIME_MIN, v.into_ms()?)?;
        Ok(())
      },
    )
    .rw(
      RECONNECT_TIME_MAX,
      OptionKind::Ms,
      |e| Ok(OptionValue::from(e.options.read().reconnect_max)),
      |e, v| {
        e.options.write().reconnect_max = finite(RECONNECT_TIME_MAX, v.into_ms()?)?;
        Ok(())
      },
    )
});

pub(crate) static LISTENER_OPTIONS: Lazy<OptionTable<EndpointCore>> = Lazy::new(|| {
  endpoint_table("listener").ro(LOCAL_ADDRESS, OptionKind::Addr, |e| {
    Ok(OptionValue::Addr(e.local.lock().clone().unwrap_or(SockAddr::Unspecified)))
  })
});

pub(crate) static PIPE_OPTIONS: Lazy<OptionTable<PipeCore>> = Lazy::new(|| {
  OptionTable::<PipeCore>::new("pipe")
    .ro(URL, OptionKind::Str, |p| Ok(OptionValue::Str(p.url.clone())))
    .ro(LOCAL_ADDRESS, OptionKind::Addr, |p| Ok(OptionValue::Addr(p.local.clone())))
    .ro(REMOTE_ADDRESS, OptionKind::Addr, |p| Ok(OptionValue::Addr(p.remote.clone())))
    .ro(PROTOCOL, OptionKind::Int, |p| Ok(OptionValue::Int(i32::from(p.protocol.id()))))
    .ro(PROTOCOL_NAME, OptionKind::Str, |p| Ok(OptionValue::Str(p.protocol.name().into())))
    .ro(PEER, OptionKind::Int, |p| Ok(OptionValue::Int(i32::from(p.peer.id()))))
    .ro(PEER_NAME, OptionKind::Str, |p| Ok(OptionValue::Str(p.peer.name().into())))
    .ro(RECV_SIZE_MAX, OptionKind::Size, |p| Ok(OptionValue::Size(p.recv_max_size)))
    .ro(TCP_NODELAY, OptionKind::Bool, |p| Ok(OptionValue::Bool(p.tcp_nodelay)))
    .ro(TCP_KEEPALIVE, OptionKind::Bool, |p| Ok(OptionValue::Bool(p.tcp_keepalive)))
});
