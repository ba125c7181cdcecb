//! Shift every item in time.
//!
//! Upstream is asked for one item at a time, and only while downstream has
//! outstanding demand. Each item is held back for the configured delay on the
//! scheduler and delivered from its worker; the next item is requested once
//! the previous one was delivered. Completion waits for the last delayed
//! item, an error is delivered right away.

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use crate::{
  error::{FlowError, ProtocolViolation},
  hooks,
  publisher::Publisher,
  rc::lock,
  scheduler::{SchedulerRef, TaskHandle},
  subscriber::{BoxedSubscriber, Downstream, Subscriber},
  subscription::{Demand, Subscription, SubscriptionRef, WorkInProgress},
};

pub struct DelayElements<S> {
  pub(crate) source: S,
  pub(crate) delay: Duration,
  pub(crate) scheduler: SchedulerRef,
}

impl<S: Publisher> Publisher for DelayElements<S> {
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let shared = Arc::new(DelayShared {
      delay: self.delay,
      scheduler: self.scheduler.clone(),
      demand: Demand::new(),
      wip: WorkInProgress::new(),
      cancelled: AtomicBool::new(false),
      state: Mutex::new(DelayState {
        ready: None,
        requested: false,
        delaying: false,
        timer: None,
        terminal: None,
      }),
      upstream: Mutex::new(None),
      downstream: Mutex::new(None),
    });
    self.source.actual_subscribe(Box::new(DelaySubscriber { shared, pending: Some(subscriber) }));
  }
}

struct DelayState<T> {
  /// An item whose delay elapsed.
  ready: Option<T>,
  /// One item was asked from upstream and not delivered yet.
  requested: bool,
  delaying: bool,
  timer: Option<TaskHandle>,
  terminal: Option<Result<(), FlowError>>,
}

struct DelayShared<T> {
  delay: Duration,
  scheduler: SchedulerRef,
  demand: Demand,
  wip: WorkInProgress,
  cancelled: AtomicBool,
  state: Mutex<DelayState<T>>,
  upstream: Mutex<Option<SubscriptionRef>>,
  downstream: Mutex<Option<Downstream<T>>>,
}

enum Action<T> {
  Next(T),
  Request,
  Error(FlowError, Option<TaskHandle>),
  Complete,
  Idle,
}

impl<T: Send + 'static> DelayShared<T> {
  fn drain(&self) { self.wip.run(|| self.pass()) }

  fn pass(&self) {
    let mut guard = lock(&self.downstream);
    let Some(downstream) = guard.as_mut() else { return };
    loop {
      if self.cancelled.load(Ordering::Acquire) {
        lock(&self.state).ready = None;
        *guard = None;
        return;
      }
      let action = {
        let mut state = lock(&self.state);
        if matches!(state.terminal, Some(Err(_))) {
          state.ready = None;
          let timer = state.timer.take();
          match state.terminal.take() {
            Some(Err(err)) => Action::Error(err, timer),
            _ => Action::Idle,
          }
        } else if state.ready.is_some() && self.demand.get() > 0 {
          state.requested = false;
          state.ready.take().map_or(Action::Idle, Action::Next)
        } else if state.ready.is_none() && !state.delaying && state.terminal.is_some() {
          Action::Complete
        } else if !state.requested && state.terminal.is_none() && self.demand.get() > 0 {
          state.requested = true;
          Action::Request
        } else {
          Action::Idle
        }
      };
      match action {
        Action::Next(v) => {
          self.demand.produced(1);
          downstream.on_next(v);
        }
        Action::Request => {
          let upstream = lock(&self.upstream).clone();
          if let Some(upstream) = upstream {
            upstream.request(1);
          }
        }
        Action::Error(err, timer) => {
          if let Some(timer) = timer {
            timer.cancel();
          }
          downstream.on_error(err);
          *guard = None;
          return;
        }
        Action::Complete => {
          downstream.on_complete();
          *guard = None;
          return;
        }
        Action::Idle => return,
      }
    }
  }

  /// Hold `value` back for the delay.
  fn delay(self: &Arc<Self>, value: T) {
    lock(&self.state).delaying = true;
    let shared = self.clone();
    let scheduled = self.scheduler.schedule_after(
      self.delay,
      Box::new(move || {
        {
          let mut state = lock(&shared.state);
          state.delaying = false;
          state.timer = None;
          state.ready = Some(value);
        }
        shared.drain();
      }),
    );
    match scheduled {
      Ok(timer) => {
        let mut state = lock(&self.state);
        if state.delaying {
          state.timer = Some(timer);
        }
      }
      Err(err) => {
        log::warn!("delay_elements could not reach `{}`: {err}", self.scheduler.name());
        lock(&self.state).delaying = false;
        self.cancel_upstream();
        self.fail(err.into());
      }
    }
  }

  fn cancel_upstream(&self) {
    let upstream = lock(&self.upstream).take();
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }

  fn fail(&self, err: FlowError) {
    {
      let mut state = lock(&self.state);
      if state.terminal.is_some() || self.cancelled.load(Ordering::Acquire) {
        drop(state);
        hooks::error_dropped(&err);
        return;
      }
      state.terminal = Some(Err(err));
    }
    self.drain();
  }
}

impl<T: Send + 'static> Subscription for DelayShared<T> {
  fn request(&self, n: u64) {
    if n == 0 {
      self.cancel_upstream();
      self.fail(ProtocolViolation::NonPositiveRequest(0).into());
      return;
    }
    self.demand.add(n);
    self.drain();
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    let timer = lock(&self.state).timer.take();
    if let Some(timer) = timer {
      timer.cancel();
    }
    self.cancel_upstream();
    self.drain();
  }
}

struct DelaySubscriber<T> {
  shared: Arc<DelayShared<T>>,
  pending: Option<BoxedSubscriber<T>>,
}

impl<T: Send + 'static> Subscriber<T> for DelaySubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let shared = &self.shared;
    *lock(&shared.upstream) = Some(subscription);
    let Some(mut subscriber) = self.pending.take() else { return };
    let owner = shared.wip.enter();
    subscriber.on_subscribe(shared.clone());
    *lock(&shared.downstream) = Some(Downstream::new(subscriber, "delay_elements"));
    if owner {
      shared.wip.drain(|| shared.pass());
    }
  }

  fn on_next(&mut self, value: T) {
    if !self.shared.cancelled.load(Ordering::Acquire) {
      self.shared.delay(value);
    }
  }

  fn on_error(&mut self, err: FlowError) {
    lock(&self.shared.upstream).take();
    self.shared.fail(err)
  }

  fn on_complete(&mut self) {
    lock(&self.shared.upstream).take();
    {
      let mut state = lock(&self.shared.state);
      if state.terminal.is_none() {
        state.terminal = Some(Ok(()));
      }
    }
    self.shared.drain();
  }
}
