// self
use crate::{_prelude::*, obs::OpKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by gateway operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("storefront_gateway.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// A refresh call against `path` is starting.
pub(crate) fn refresh_started(path: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(path, "starting token refresh");
	#[cfg(not(feature = "tracing"))]
	let _ = path;
}

/// A request joined the queue behind the in-flight refresh.
pub(crate) fn request_queued(path: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(path, "queued behind in-flight token refresh");
	#[cfg(not(feature = "tracing"))]
	let _ = path;
}

/// The refresh settled and `delivered` waiters were resumed.
pub(crate) fn refresh_settled(succeeded: bool, delivered: usize) {
	#[cfg(feature = "tracing")]
	{
		if succeeded {
			tracing::debug!(delivered, "token refresh succeeded; replaying queued requests");
		} else {
			tracing::warn!(delivered, "token refresh failed; rejecting queued requests");
		}
	}
	#[cfg(not(feature = "tracing"))]
	let _ = (succeeded, delivered);
}

/// A request is being re-issued with a refreshed token.
pub(crate) fn replay_issued(path: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(path, "replaying request with refreshed token");
	#[cfg(not(feature = "tracing"))]
	let _ = path;
}

/// The session was dropped.
pub(crate) fn session_cleared(reason: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::info!(reason, "session cleared");
	#[cfg(not(feature = "tracing"))]
	let _ = reason;
}

/// A best-effort step failed and was ignored.
pub(crate) fn ignored_failure(step: &'static str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(step, %error, "ignoring failure");
	#[cfg(not(feature = "tracing"))]
	let _ = (step, error);
}
