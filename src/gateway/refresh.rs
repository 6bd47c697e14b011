//! Single-flight coordination for token refreshes.
//!
//! The coordinator is a two-state machine, `Idle → Refreshing → Idle`, guarded by one mutex
//! together with the FIFO queue of parked callers. [`RefreshCoordinator::join`] checks and
//! flips the state under a single lock acquisition: the first caller becomes the leader and
//! receives a [`RefreshLease`]; everyone arriving while the lease is alive is parked as a
//! [`RefreshWaiter`]. Settling the lease (or dropping it) returns the machine to `Idle` and
//! delivers one outcome to every parked caller in the order they arrived.

// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, auth::AccessToken, error::RefreshError};

/// Result delivered to every caller parked behind a refresh.
pub type RefreshOutcome = Result<AccessToken, RefreshError>;

type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Debug, Default)]
struct RefreshState {
	refreshing: bool,
	waiters: VecDeque<Waiter>,
}

/// Shared refresh flag plus the ordered queue of parked callers.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
	state: Mutex<RefreshState>,
}
impl RefreshCoordinator {
	/// Joins the refresh: returns a lease when the caller must run the refresh itself, or a
	/// waiter when a refresh is already in flight.
	pub fn join(&self) -> RefreshTicket<'_> {
		let mut state = self.state.lock();

		if state.refreshing {
			let (tx, rx) = oneshot::channel();

			// Drop slots of callers that already gave up.
			state.waiters.retain(|waiter| !waiter.is_closed());
			state.waiters.push_back(tx);

			RefreshTicket::Follower(RefreshWaiter(rx))
		} else {
			state.refreshing = true;

			RefreshTicket::Leader(RefreshLease { coordinator: self, settled: false })
		}
	}

	/// Returns `true` while a refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().refreshing
	}

	/// Number of callers still waiting on the in-flight refresh.
	///
	/// Callers that gave up (timeout, cancellation) are not counted.
	pub fn queued(&self) -> usize {
		self.state.lock().waiters.iter().filter(|waiter| !waiter.is_closed()).count()
	}

	fn drain(&self, outcome: RefreshOutcome) -> usize {
		let waiters = {
			let mut state = self.state.lock();

			state.refreshing = false;

			std::mem::take(&mut state.waiters)
		};

		let mut delivered = 0;

		for waiter in waiters {
			if waiter.send(outcome.clone()).is_ok() {
				delivered += 1;
			}
		}

		delivered
	}
}

/// Role assigned by [`RefreshCoordinator::join`].
#[derive(Debug)]
pub enum RefreshTicket<'a> {
	/// The caller must perform the refresh and settle the lease.
	Leader(RefreshLease<'a>),
	/// A refresh is already in flight; await its outcome.
	Follower(RefreshWaiter),
}

/// Proof of leadership over the in-flight refresh.
///
/// Dropping an unsettled lease rejects every parked caller with
/// [`RefreshError::Abandoned`] and returns the coordinator to idle.
#[derive(Debug)]
pub struct RefreshLease<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl RefreshLease<'_> {
	/// Ends the refresh, handing `outcome` to every parked caller in arrival order.
	///
	/// Returns how many callers were still waiting to receive it.
	pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
		self.settled = true;

		self.coordinator.drain(outcome)
	}
}
impl Drop for RefreshLease<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.coordinator.drain(Err(RefreshError::Abandoned));
		}
	}
}

/// Parked caller awaiting the in-flight refresh.
#[derive(Debug)]
pub struct RefreshWaiter(oneshot::Receiver<RefreshOutcome>);
impl RefreshWaiter {
	/// Resolves once the refresh settles.
	pub async fn wait(self) -> RefreshOutcome {
		self.0.await.unwrap_or(Err(RefreshError::Abandoned))
	}
}
