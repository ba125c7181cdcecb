use std::time::Duration;

use super::{create, FluxSink, Publisher};
use crate::{error::FlowError, scheduler::SchedulerRef, subscriber::BoxedSubscriber};

/// Creates a publisher emitting `0, 1, 2, ...`, one tick every `period`, the
/// first one `period` after subscribing.
///
/// Ticks are timed by `scheduler`, not by demand: a tick that fires while
/// downstream has no outstanding demand fails the sequence with
/// [`FlowError::LackOfDemand`].
pub fn interval(period: Duration, scheduler: SchedulerRef) -> Interval {
  Interval { period, scheduler }
}

#[derive(Clone)]
pub struct Interval {
  period: Duration,
  scheduler: SchedulerRef,
}

impl Publisher for Interval {
  type Item = u64;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<u64>) {
    let Interval { period, scheduler } = self.clone();
    create(move |sink: FluxSink<u64>| {
      let mut tick = 0;
      let ticker = sink.clone();
      let scheduled = scheduler.schedule_periodic(
        period,
        period,
        Box::new(move || {
          if ticker.requested() == 0 {
            ticker.error(FlowError::LackOfDemand { tick });
          } else {
            ticker.next(tick);
          }
          tick += 1;
        }),
      );
      match scheduled {
        Ok(handle) => sink.on_dispose(move || handle.cancel()),
        Err(err) => sink.error(err.into()),
      }
    })
    .actual_subscribe(subscriber);
  }
}

#[cfg(test)]
mod tests {
  use std::time::{Duration, Instant};

  use crate::{error::FlowError, prelude::*, scheduler, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn ticks_on_demand() {
    let timer = scheduler::new_single("interval-ticks");
    let stamp = Instant::now();
    let observer = TestSubscriber::unbounded();
    publisher::interval(Duration::from_millis(2), timer.clone())
      .take(5)
      .subscribe_with(observer.clone());
    assert!(observer.await_terminal(Duration::from_secs(5)));
    assert_eq!(observer.items(), vec![0, 1, 2, 3, 4]);
    assert!(stamp.elapsed() >= Duration::from_millis(10));
    timer.dispose();
  }

  #[rxflow_macro::test]
  fn fails_without_demand() {
    let timer = scheduler::new_single("interval-lack");
    let observer = TestSubscriber::with_request(1);
    publisher::interval(Duration::from_millis(2), timer.clone()).subscribe_with(observer.clone());
    assert!(observer.await_terminal(Duration::from_secs(5)));
    assert_eq!(observer.items(), vec![0]);
    assert!(matches!(observer.error(), Some(FlowError::LackOfDemand { tick: 1 })));
    timer.dispose();
  }

  #[rxflow_macro::test]
  fn immediate_scheduler_cannot_time() {
    let observer = TestSubscriber::<u64>::unbounded();
    publisher::interval(Duration::from_millis(1), scheduler::immediate())
      .subscribe_with(observer.clone());
    assert!(matches!(observer.error(), Some(FlowError::Scheduler(_))));
  }
}
