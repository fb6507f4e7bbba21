// src/socket/types.rs

use std::fmt;

/// The scalability protocol a socket speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
  /// Many-to-many broadcast (Bus pattern).
  Bus0,
  /// One-to-one bidirectional (Pair pattern, v0).
  Pair0,
  /// One-to-one bidirectional, optionally polyamorous (Pair pattern, v1).
  Pair1,
  /// Publish messages to subscribers (Pub-Sub pattern).
  Pub0,
  /// Subscribe to messages from publishers (Pub-Sub pattern).
  Sub0,
  /// Send requests and receive replies (Req-Rep pattern).
  Req0,
  /// Receive requests and send replies (Req-Rep pattern).
  Rep0,
  /// Distribute messages to a pool of workers (Pipeline pattern).
  Push0,
  /// Collect messages from a pool of distributors (Pipeline pattern).
  Pull0,
  /// Broadcast a survey and collect responses within a deadline (Survey pattern).
  Surveyor0,
  /// Answer surveys (Survey pattern).
  Respondent0,
}

impl Protocol {
  pub const ALL: [Protocol; 11] = [
    Protocol::Bus0,
    Protocol::Pair0,
    Protocol::Pair1,
    Protocol::Pub0,
    Protocol::Sub0,
    Protocol::Req0,
    Protocol::Rep0,
    Protocol::Push0,
    Protocol::Pull0,
    Protocol::Surveyor0,
    Protocol::Respondent0,
  ];

  /// 16-bit protocol number exchanged during connection setup.
  pub fn id(self) -> u16 {
    match self {
      Protocol::Pair0 => 0x10,
      Protocol::Pair1 => 0x11,
      Protocol::Pub0 => 0x20,
      Protocol::Sub0 => 0x21,
      Protocol::Req0 => 0x30,
      Protocol::Rep0 => 0x31,
      Protocol::Push0 => 0x50,
      Protocol::Pull0 => 0x51,
      Protocol::Surveyor0 => 0x62,
      Protocol::Respondent0 => 0x63,
      Protocol::Bus0 => 0x70,
    }
  }

  pub fn from_id(id: u16) -> Option<Self> {
    Protocol::ALL.into_iter().find(|p| p.id() == id)
  }

  pub fn name(self) -> &'static str {
    match self {
      Protocol::Bus0 => "bus",
      Protocol::Pair0 | Protocol::Pair1 => "pair",
      Protocol::Pub0 => "pub",
      Protocol::Sub0 => "sub",
      Protocol::Req0 => "req",
      Protocol::Rep0 => "rep",
      Protocol::Push0 => "push",
      Protocol::Pull0 => "pull",
      Protocol::Surveyor0 => "surveyor",
      Protocol::Respondent0 => "respondent",
    }
  }

  /// The protocol a peer must speak to connect to this one.
  pub fn peer(self) -> Protocol {
    match self {
      Protocol::Bus0 => Protocol::Bus0,
      Protocol::Pair0 => Protocol::Pair0,
      Protocol::Pair1 => Protocol::Pair1,
      Protocol::Pub0 => Protocol::Sub0,
      Protocol::Sub0 => Protocol::Pub0,
      Protocol::Req0 => Protocol::Rep0,
      Protocol::Rep0 => Protocol::Req0,
      Protocol::Push0 => Protocol::Pull0,
      Protocol::Pull0 => Protocol::Push0,
      Protocol::Surveyor0 => Protocol::Respondent0,
      Protocol::Respondent0 => Protocol::Surveyor0,
    }
  }

  pub fn peer_name(self) -> &'static str {
    self.peer().name()
  }

  pub fn can_send(self) -> bool {
    !matches!(self, Protocol::Sub0 | Protocol::Pull0)
  }

  pub fn can_recv(self) -> bool {
    !matches!(self, Protocol::Pub0 | Protocol::Push0)
  }

  /// Protocols whose per-request state can be split across contexts.
  pub fn supports_contexts(self) -> bool {
    matches!(
      self,
      Protocol::Req0 | Protocol::Rep0 | Protocol::Surveyor0 | Protocol::Respondent0
    )
  }

  /// Length of the request-id header carried by every message of this protocol.
  pub(crate) fn header_len(self) -> usize {
    if self.supports_contexts() {
      4
    } else {
      0
    }
  }
}

impl fmt::Display for Protocol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Protocol::Pair1 => write!(f, "pair1"),
      other => write!(f, "{}0", other.name()),
    }
  }
}

/// How [`Socket::dial`](crate::Socket::dial) treats the first connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialMode {
  /// Connect synchronously; any failure is returned to the caller.
  Blocking,
  /// Start the background reconnect loop and return immediately.
  NonBlocking,
  /// Try a synchronous connect; if the peer refuses, fall back to `NonBlocking`.
  #[default]
  Auto,
}
