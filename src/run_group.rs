use std::error::Error;
use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

/// Error type actors report. The group returns the first one observed.
pub type ActorError = Box<dyn Error + Send + Sync>;

type Interrupt = Box<dyn FnOnce() + Send>;

struct Actor {
  execute: BoxFuture<'static, Result<(), ActorError>>,
  interrupt: Interrupt,
}

/// Drives a set of long-running actors until the first one finishes, then
/// interrupts and drains the rest.
///
/// Each actor is a future paired with an interrupt. When any actor
/// finishes, for whatever reason, every interrupt is invoked and `run`
/// waits for the remaining actors before returning the first actor's
/// result. An empty group completes immediately.
#[derive(Default)]
pub struct RunGroup {
  actors: Vec<Actor>,
}

impl RunGroup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers an actor. `interrupt` must cause `execute` to return; an
  /// actor that ignores its interrupt stalls the whole group.
  pub fn add<E, I>(&mut self, execute: E, interrupt: I)
  where
    E: Future<Output = Result<(), ActorError>> + Send + 'static,
    I: FnOnce() + Send + 'static,
  {
    self.actors.push(Actor {
      execute: Box::pin(execute),
      interrupt: Box::new(interrupt),
    });
  }

  /// Runs every actor to completion and returns the first result observed.
  pub async fn run(self) -> Result<(), ActorError> {
    if self.actors.is_empty() {
      return Ok(());
    }

    let mut executing = FuturesUnordered::new();
    let mut interrupts = Vec::with_capacity(self.actors.len());
    for actor in self.actors {
      executing.push(actor.execute);
      interrupts.push(actor.interrupt);
    }

    let first = match executing.next().await {
      Some(result) => result,
      None => return Ok(()),
    };
    debug!(ok = first.is_ok(), "First actor finished. Interrupting the rest.");

    for interrupt in interrupts {
      interrupt();
    }

    while let Some(result) = executing.next().await {
      if let Err(error) = result {
        debug!("Actor finished with an error after interrupt: {}", error);
      }
    }
    info!("All actors finished.");

    first
  }
}
