//! Stoppable repeating background tasks shared by the cache, limiter, and token layers.

// crates.io
use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
// self
use crate::_prelude::*;

/// Handle owning a repeating background loop.
///
/// The loop fires once immediately, then on every interval. A cycle in flight always runs to
/// completion before the loop observes a stop signal, so [`BackgroundTask::stop`] guarantees no
/// cycle races with process teardown. Dropping the handle also signals the loop to wind down,
/// but without awaiting it.
#[derive(Debug)]
pub struct BackgroundTask {
	name: &'static str,
	shutdown: watch::Sender<bool>,
	handle: JoinHandle<()>,
}
impl BackgroundTask {
	/// Spawns a repeating loop that awaits `tick` on every interval.
	///
	/// `tick` must contain its own failure handling; a failing cycle is the cycle's problem,
	/// never the loop's.
	pub fn spawn<F, Fut>(name: &'static str, every: StdDuration, mut tick: F) -> Self
	where
		F: FnMut() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let (shutdown, mut signal) = watch::channel(false);
		let handle = tokio::spawn(async move {
			let mut ticker = time::interval(every);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

			loop {
				tokio::select! {
					changed = signal.changed() => {
						// A closed channel means the handle was dropped; wind down either way.
						let _ = changed;

						break;
					},
					_ = ticker.tick() => tick().await,
				}
			}
		});

		Self { name, shutdown, handle }
	}

	/// Name the task was registered under.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Signals the loop to stop and awaits its termination.
	pub async fn stop(self) {
		let _ = self.shutdown.send(true);

		if self.handle.await.is_err() {
			#[cfg(feature = "tracing")]
			tracing::warn!(task = self.name, "background task terminated abnormally");
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn loop_ticks_and_stops_cleanly() {
		let count = Arc::new(AtomicU32::new(0));
		let observed = count.clone();
		let task = BackgroundTask::spawn("test-loop", StdDuration::from_millis(10), move || {
			let count = count.clone();

			async move {
				count.fetch_add(1, Ordering::Relaxed);
			}
		});

		assert_eq!(task.name(), "test-loop");

		tokio::time::sleep(StdDuration::from_millis(50)).await;
		task.stop().await;

		let ticks = observed.load(Ordering::Relaxed);

		assert!(ticks >= 1, "loop should have ticked at least once, saw {ticks}");

		tokio::time::sleep(StdDuration::from_millis(30)).await;

		assert_eq!(observed.load(Ordering::Relaxed), ticks, "no ticks may land after stop");
	}
}
