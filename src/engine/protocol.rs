// src/engine/protocol.rs

//! Per-protocol routing: where an outgoing message goes and which receiver an incoming message
//! belongs to.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::error::{NngError, NngResult};
use crate::message::Msg;
use crate::socket::Protocol;

use super::core::SOCKET_CTX;

/// Request ids carry the high bit to mark the end of the backtrace.
const REQUEST_ID_FLAG: u32 = 0x8000_0000;

/// Where a prepared outgoing message is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
  /// Every pipe except the optional origin; full pipes drop their copy.
  Broadcast { except: Option<u32> },
  /// The next pipe in round-robin order that has room.
  Any,
  /// One specific pipe. Dropped if that pipe is gone.
  Direct(u32),
}

/// Which receiver an incoming message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
  Shared,
  Ctx(u32),
}

pub(crate) enum Ready {
  Msg(Msg),
  /// Nothing yet; wait, optionally no longer than the given duration.
  Wait(Option<Duration>),
  Fail(NngError),
}

/// Per-context request state.
#[derive(Debug, Default)]
pub(crate) struct ProtoCtx {
  outstanding: Option<u32>,
  deadline: Option<Instant>,
  replies: VecDeque<Msg>,
  // Pipe and header of the request this context must answer.
  backtrace: Option<(u32, Vec<u8>)>,
}

#[derive(Debug)]
pub(crate) struct ProtoState {
  protocol: Protocol,
  contexts: BTreeMap<u32, ProtoCtx>,
  subscriptions: Vec<Vec<u8>>,
  next_id: u32,
}

/// Send-side settings read from the socket options.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SendParams {
  pub survey_time: Duration,
  pub polyamorous: bool,
}

fn header_id(msg: &Msg) -> Option<u32> {
  let header: [u8; 4] = msg.header().try_into().ok()?;
  Some(u32::from_be_bytes(header))
}

impl ProtoState {
  pub fn new(protocol: Protocol) -> Self {
    let mut contexts = BTreeMap::new();
    contexts.insert(SOCKET_CTX, ProtoCtx::default());
    Self {
      protocol,
      contexts,
      subscriptions: Vec::new(),
      next_id: rand::random::<u32>(),
    }
  }

  pub fn add_context(&mut self, ctx: u32) {
    self.contexts.insert(ctx, ProtoCtx::default());
  }

  pub fn remove_context(&mut self, ctx: u32) -> bool {
    self.contexts.remove(&ctx).is_some()
  }

  /// Open context ids, excluding the socket's own.
  pub fn context_ids(&self) -> Vec<u32> {
    self.contexts.keys().copied().filter(|id| *id != SOCKET_CTX).collect()
  }

  pub fn subscribe(&mut self, topic: &[u8], add: bool) -> NngResult<()> {
    let existing = self.subscriptions.iter().position(|t| t.as_slice() == topic);
    match (add, existing) {
      (true, Some(_)) => Ok(()),
      (true, None) => {
        self.subscriptions.push(topic.to_vec());
        Ok(())
      }
      (false, Some(i)) => {
        self.subscriptions.swap_remove(i);
        Ok(())
      }
      (false, None) => Err(NngError::NotFound("subscription".into())),
    }
  }

  fn fresh_id(&mut self) -> u32 {
    self.next_id = self.next_id.wrapping_add(1);
    self.next_id | REQUEST_ID_FLAG
  }

  fn ctx_mut(&mut self, ctx: u32) -> NngResult<&mut ProtoCtx> {
    self.contexts.get_mut(&ctx).ok_or(NngError::Closed)
  }

  /// Stamps protocol headers and picks the route for an outgoing message. On failure the
  /// message is left untouched.
  pub fn prepare_send(&mut self, ctx: u32, msg: &mut Msg, params: SendParams) -> NngResult<Route> {
    let route = match self.protocol {
      Protocol::Pub0 => Route::Broadcast { except: None },
      Protocol::Bus0 => Route::Broadcast { except: msg.pipe().map(|p| p.id()) },
      Protocol::Push0 | Protocol::Pair0 => Route::Any,
      Protocol::Pair1 => match msg.pipe() {
        Some(pipe) if params.polyamorous => Route::Direct(pipe.id()),
        _ => Route::Any,
      },
      Protocol::Req0 => {
        let id = self.fresh_id();
        let state = self.ctx_mut(ctx)?;
        state.outstanding = Some(id);
        state.replies.clear();
        msg.set_header(&id.to_be_bytes());
        Route::Any
      }
      Protocol::Surveyor0 => {
        let id = self.fresh_id();
        let state = self.ctx_mut(ctx)?;
        state.outstanding = Some(id);
        state.deadline = Some(Instant::now() + params.survey_time);
        state.replies.clear();
        msg.set_header(&id.to_be_bytes());
        Route::Broadcast { except: None }
      }
      Protocol::Rep0 | Protocol::Respondent0 => {
        let (pipe, header) = self
          .ctx_mut(ctx)?
          .backtrace
          .take()
          .ok_or(NngError::InvalidState("no request to reply to"))?;
        msg.set_header(&header);
        Route::Direct(pipe)
      }
      Protocol::Sub0 | Protocol::Pull0 => return Err(NngError::NotSupported("send")),
    };
    Ok(route)
  }

  /// Decides who receives an incoming message. `None` drops it.
  pub fn classify(&mut self, msg: &Msg) -> Option<Target> {
    match self.protocol {
      Protocol::Pub0 | Protocol::Push0 => None,
      Protocol::Sub0 => self
        .subscriptions
        .iter()
        .any(|topic| msg.body().starts_with(topic))
        .then_some(Target::Shared),
      Protocol::Req0 => {
        let id = header_id(msg)?;
        let (&ctx, state) = self
          .contexts
          .iter_mut()
          .find(|(_, c)| c.outstanding == Some(id))?;
        state.outstanding = None;
        Some(Target::Ctx(ctx))
      }
      Protocol::Surveyor0 => {
        let id = header_id(msg)?;
        let now = Instant::now();
        self
          .contexts
          .iter()
          .find(|(_, c)| c.outstanding == Some(id) && c.deadline.map_or(false, |d| now < d))
          .map(|(&ctx, _)| Target::Ctx(ctx))
      }
      Protocol::Rep0 | Protocol::Respondent0 => header_id(msg)
        .filter(|id| id & REQUEST_ID_FLAG != 0)
        .map(|_| Target::Shared),
      Protocol::Bus0 | Protocol::Pair0 | Protocol::Pair1 | Protocol::Pull0 => Some(Target::Shared),
    }
  }

  /// Stores a message for a context that has no receive waiting. Returns false if it was dropped.
  pub fn stash(&mut self, ctx: u32, msg: Msg, cap: usize) -> bool {
    match self.contexts.get_mut(&ctx) {
      Some(state) if state.replies.len() < cap.max(1) => {
        state.replies.push_back(msg);
        true
      }
      _ => false,
    }
  }

  /// Records the request a context is now answering.
  pub fn claim(&mut self, ctx: u32, msg: &Msg) {
    if !matches!(self.protocol, Protocol::Rep0 | Protocol::Respondent0) {
      return;
    }
    if let (Some(state), Some(pipe)) = (self.contexts.get_mut(&ctx), msg.pipe()) {
      state.backtrace = Some((pipe.id(), msg.header().to_vec()));
    }
  }

  /// Whether a message for `target` may be handed to a receive waiting on `ctx`.
  pub fn accepts(&self, target: Target, ctx: u32) -> bool {
    match target {
      Target::Shared => true,
      Target::Ctx(want) => want == ctx,
    }
  }

  /// What a receive on `ctx` gets right now.
  pub fn take_ready(&mut self, ctx: u32, queue: &mut VecDeque<Msg>) -> Ready {
    let protocol = self.protocol;
    let state = match self.ctx_mut(ctx) {
      Ok(state) => state,
      Err(e) => return Ready::Fail(e),
    };
    match protocol {
      Protocol::Req0 => match state.replies.pop_front() {
        Some(msg) => Ready::Msg(msg),
        None if state.outstanding.is_none() => Ready::Fail(NngError::InvalidState("no request outstanding")),
        None => Ready::Wait(None),
      },
      Protocol::Surveyor0 => {
        if let Some(msg) = state.replies.pop_front() {
          return Ready::Msg(msg);
        }
        let (Some(_), Some(deadline)) = (state.outstanding, state.deadline) else {
          return Ready::Fail(NngError::InvalidState("no survey outstanding"));
        };
        let now = Instant::now();
        if now >= deadline {
          state.outstanding = None;
          state.deadline = None;
          return Ready::Fail(NngError::Timeout);
        }
        Ready::Wait(Some(deadline - now))
      }
      _ => match queue.pop_front() {
        Some(msg) => {
          self.claim(ctx, &msg);
          Ready::Msg(msg)
        }
        None => Ready::Wait(None),
      },
    }
  }

  /// Ends an expired survey on `ctx` so later receives report the missing survey.
  pub fn expire_survey(&mut self, ctx: u32) {
    if self.protocol != Protocol::Surveyor0 {
      return;
    }
    if let Some(state) = self.contexts.get_mut(&ctx) {
      if state.deadline.map_or(false, |d| Instant::now() >= d) {
        state.outstanding = None;
        state.deadline = None;
      }
    }
  }
}
