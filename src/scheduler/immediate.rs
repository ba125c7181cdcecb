use std::time::Duration;

use super::{PeriodicTask, Scheduler, Task, TaskHandle};
use crate::error::SchedulerError;

/// Runs work inline on the calling thread. Timed work is unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Immediate {
  fn unsupported(&self, operation: &'static str) -> SchedulerError {
    SchedulerError::Unsupported { name: self.name().to_owned(), operation }
  }
}

impl Scheduler for Immediate {
  fn name(&self) -> &str { "immediate" }

  fn schedule(&self, task: Task) -> Result<TaskHandle, SchedulerError> {
    task();
    Ok(TaskHandle::new())
  }

  fn schedule_after(&self, _delay: Duration, _task: Task) -> Result<TaskHandle, SchedulerError> {
    Err(self.unsupported("delayed work"))
  }

  fn schedule_periodic(
    &self,
    _initial: Duration,
    _period: Duration,
    _task: PeriodicTask,
  ) -> Result<TaskHandle, SchedulerError> {
    Err(self.unsupported("periodic work"))
  }

  fn dispose(&self) {}

  fn is_disposed(&self) -> bool { false }
}
