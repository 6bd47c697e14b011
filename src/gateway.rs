//! Authenticated request gateway: bearer attachment, single-flight refresh, transparent replay.
//!
//! Every call made through [`Gateway::send`] reads the current access token from the shared
//! [`SessionState`] and attaches it as the bearer credential. When a protected request comes
//! back 401/403 the gateway joins the [`RefreshCoordinator`]: the first caller performs one
//! `POST` against the refresh endpoint while later callers park in FIFO order. Once the
//! refresh settles, parked callers are resumed in arrival order and each re-issues its
//! original request exactly once with the new token. A failed refresh ends the session.

pub mod endpoint;
pub mod refresh;
pub mod request;

mod account;
mod metrics;

pub use account::*;
pub use endpoint::*;
pub use metrics::RefreshMetrics;
pub use refresh::*;
pub use request::*;

// crates.io
use http::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Session, SessionState},
	config::GatewayConfig,
	error::{RefreshError, StatusError},
	http::{ApiResponse, GatewayHttpClient, HttpRequest},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::SessionStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestHttpClient>;

/// Authenticated client for the storefront API.
///
/// Clones share the transport, session, and refresh coordinator, so a refresh triggered
/// through one clone is joined by requests issued through any other.
pub struct Gateway<C>
where
	C: ?Sized + GatewayHttpClient,
{
	/// HTTP transport used for every outbound request.
	pub http_client: Arc<C>,
	/// Validated configuration.
	pub config: Arc<GatewayConfig>,
	/// Shared session state read by every request.
	pub session: Arc<SessionState>,
	/// Counters for refresh activity.
	pub refresh_metrics: Arc<RefreshMetrics>,
	coordinator: Arc<RefreshCoordinator>,
}
impl<C> Gateway<C>
where
	C: ?Sized + GatewayHttpClient,
{
	/// Creates a gateway from its parts.
	pub fn with_http_client(
		config: GatewayConfig,
		session: Arc<SessionState>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			config: Arc::new(config),
			session,
			refresh_metrics: Default::default(),
			coordinator: Default::default(),
		}
	}

	/// Rehydrates the session persisted in `store` and builds a gateway around it.
	pub async fn restore(
		config: GatewayConfig,
		store: Arc<dyn SessionStore>,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self> {
		let session = SessionState::rehydrate(store, config.namespace.clone()).await?;

		Ok(Self::with_http_client(config, Arc::new(session), http_client))
	}

	/// Returns a copy of the current session.
	pub fn session(&self) -> Session {
		self.session.snapshot()
	}

	/// Returns the current access token, if any.
	pub fn access_token(&self) -> Option<AccessToken> {
		self.session.access_token()
	}

	/// Returns `true` when an access token is held.
	pub fn is_authenticated(&self) -> bool {
		self.session.is_authenticated()
	}

	/// Returns `true` while a token refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.coordinator.is_refreshing()
	}

	/// Number of requests currently parked behind the in-flight refresh.
	pub fn queued_requests(&self) -> usize {
		self.coordinator.queued()
	}

	/// Sends `request`, refreshing the token and replaying once on 401/403.
	///
	/// Non-2xx responses are returned as [`Error::Status`].
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.send_inner(request, None).await
	}

	/// Like [`Gateway::send`], but gives up with [`Error::Cancelled`] if `cancel` fires while
	/// the request is parked behind a refresh.
	pub async fn send_with_cancel(
		&self,
		request: ApiRequest,
		cancel: &CancellationToken,
	) -> Result<ApiResponse> {
		self.send_inner(request, Some(cancel)).await
	}

	/// `GET`s `path` and unwraps the `{ data }` envelope.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(ApiRequest::get(path)).await?.data()
	}

	/// `POST`s `body` as JSON to `path` and unwraps the `{ data }` envelope.
	pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.send(ApiRequest::post(path).json(body)?).await?.data()
	}

	/// `PUT`s `body` as JSON to `path` and unwraps the `{ data }` envelope.
	pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.send(ApiRequest::put(path).json(body)?).await?.data()
	}

	/// `PATCH`es `body` as JSON to `path` and unwraps the `{ data }` envelope.
	pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.send(ApiRequest::patch(path).json(body)?).await?.data()
	}

	/// `DELETE`s `path` and unwraps the `{ data }` envelope.
	pub async fn delete_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(ApiRequest::delete(path)).await?.data()
	}

	/// Refreshes the access token now, or joins the refresh already in flight.
	pub async fn refresh_now(&self) -> Result<AccessToken> {
		match self.coordinate_refresh(&self.config.endpoints.refresh, None).await {
			Joined::Refreshed(token) => Ok(token),
			Joined::LeaderFailed(err) => Err(err.into()),
			Joined::FollowerFailed(err) => Err(err),
		}
	}

	async fn send_inner(
		&self,
		mut request: ApiRequest,
		cancel: Option<&CancellationToken>,
	) -> Result<ApiResponse> {
		const KIND: OpKind = OpKind::Request;

		let span = OpSpan::new(KIND, "send");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let sent_with = self.session.access_token();
				let fault = match self.dispatch(&request, sent_with.as_ref()).await {
					Ok(response) => return Ok(response),
					Err(fault) => fault,
				};

				if !self.should_refresh(&request, sent_with.is_some(), &fault) {
					return Err(fault);
				}

				request = request.mark_retried();

				match self.session.access_token() {
					// The session ended while this request was in flight; a failed refresh is final.
					None => return Err(fault),
					// A refresh that settled meanwhile already rotated the token.
					Some(current) if Some(&current) != sent_with.as_ref() =>
						return self.replay(&request, &current).await,
					Some(_) => {},
				}

				match self.coordinate_refresh(&request.path, cancel).await {
					Joined::Refreshed(token) => self.replay(&request, &token).await,
					// The leader's own caller sees its original failure.
					Joined::LeaderFailed(_) => Err(fault),
					Joined::FollowerFailed(err) => Err(err),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	fn should_refresh(&self, request: &ApiRequest, had_token: bool, fault: &Error) -> bool {
		fault.is_auth_failure()
			&& had_token
			&& !request.is_retried()
			&& !self.config.policy.is_public(&request.path)
	}

	async fn coordinate_refresh(&self, path: &str, cancel: Option<&CancellationToken>) -> Joined {
		match self.coordinator.join() {
			RefreshTicket::Leader(lease) => {
				let generation = self.session.generation();
				let outcome = self.run_refresh(generation).await;

				if outcome.is_err() {
					// Clear before rejecting so rejected callers already observe the logout.
					self.end_session(generation, "refresh_failed").await;
				}

				let delivered = lease.settle(outcome.clone());

				obs::refresh_settled(outcome.is_ok(), delivered);

				match outcome {
					Ok(token) => Joined::Refreshed(token),
					Err(err) => Joined::LeaderFailed(err),
				}
			},
			RefreshTicket::Follower(waiter) => {
				obs::request_queued(path);
				self.refresh_metrics.record_queued();
				obs::record_op_outcome(OpKind::Request, OpOutcome::Queued);

				match self.await_waiter(waiter, cancel).await {
					Ok(token) => Joined::Refreshed(token),
					Err(err) => Joined::FollowerFailed(err),
				}
			},
		}
	}

	async fn await_waiter(
		&self,
		waiter: RefreshWaiter,
		cancel: Option<&CancellationToken>,
	) -> Result<AccessToken> {
		let limit = self.config.queue_timeout;
		let bounded = tokio::time::timeout(limit, waiter.wait());
		let outcome = match cancel {
			Some(cancel) => tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				outcome = bounded => outcome,
			},
			None => bounded.await,
		};

		match outcome {
			Ok(Ok(token)) => Ok(token),
			Ok(Err(err)) => Err(err.into()),
			Err(_) => Err(Error::QueueTimeout { waited: limit }),
		}
	}

	/// Performs the refresh call and stores the new token, unless a login or logout moved the
	/// session past `generation` while the call was in flight.
	async fn run_refresh(&self, generation: u64) -> Result<AccessToken, RefreshError> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "run_refresh");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(async {
				let path = self.config.endpoints.refresh.as_str();

				obs::refresh_started(path);

				let url = self
					.config
					.url_for(path, &[])
					.map_err(|err| RefreshError::Transport { message: err.to_string() })?;
				let call = self.http_client.execute(HttpRequest::new(http::Method::POST, url));
				let response = tokio::time::timeout(self.config.refresh_timeout, call)
					.await
					.map_err(|_| RefreshError::TimedOut { after: self.config.refresh_timeout })?
					.map_err(|err| RefreshError::Transport { message: err.to_string() })?;

				if !response.status.is_success() {
					let status = StatusError::new(response.status, path, &response.body);

					return Err(RefreshError::Rejected {
						status: status.status.as_u16(),
						message: status.body_preview,
					});
				}

				let payload: RefreshPayload = response
					.data()
					.map_err(|err| RefreshError::MalformedResponse { message: err.to_string() })?;

				match self.session.set_access_token(payload.access_token.clone(), generation).await {
					Ok(true) => {},
					Ok(false) => return Err(RefreshError::Superseded),
					Err(err) => obs::ignored_failure("persist_refreshed_session", &err),
				}

				Ok(payload.access_token)
			})
			.await;

		match &result {
			Ok(_) => {
				self.refresh_metrics.record_success();
				obs::record_op_outcome(KIND, OpOutcome::Success);
			},
			Err(_) => {
				self.refresh_metrics.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);
			},
		}

		result
	}

	async fn replay(&self, request: &ApiRequest, token: &AccessToken) -> Result<ApiResponse> {
		obs::replay_issued(&request.path);
		obs::record_op_outcome(OpKind::Replay, OpOutcome::Attempt);
		self.refresh_metrics.record_replay();

		let result = self.dispatch(request, Some(token)).await;

		match &result {
			Ok(_) => obs::record_op_outcome(OpKind::Replay, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(OpKind::Replay, OpOutcome::Failure),
		}

		result
	}

	/// Resolves `request`, attaches `token`, and maps non-2xx responses to [`Error::Status`].
	async fn dispatch(&self, request: &ApiRequest, token: Option<&AccessToken>) -> Result<ApiResponse> {
		let url = self.config.url_for(&request.path, &request.query)?;
		let mut headers = request.headers.clone();

		headers.remove(AUTHORIZATION);

		if let Some(token) = token {
			headers.insert(AUTHORIZATION, token.bearer_header()?);
		}

		let outbound =
			HttpRequest { method: request.method.clone(), url, headers, body: request.body.clone() };
		let response = self.http_client.execute(outbound).await?;

		if response.status.is_success() {
			Ok(response)
		} else {
			Err(StatusError::new(response.status, request.path.as_str(), &response.body).into())
		}
	}

	async fn end_session(&self, generation: u64, reason: &'static str) {
		match self.session.clear_if(generation).await {
			Ok(true) => obs::session_cleared(reason),
			Ok(false) => {},
			Err(err) => obs::ignored_failure("clear_persisted_session", &err),
		}
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient> {
	/// Builds a reqwest-backed gateway, rehydrating the session persisted in `store`.
	pub async fn connect(config: GatewayConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
		let http_client = ReqwestHttpClient::new()?;

		Self::restore(config, store, http_client).await
	}

	/// Like [`Gateway::connect`], reading configuration from the environment.
	pub async fn from_env(store: Arc<dyn SessionStore>) -> Result<Self> {
		Self::connect(GatewayConfig::from_env()?, store).await
	}
}
impl<C> Clone for Gateway<C>
where
	C: ?Sized + GatewayHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			config: self.config.clone(),
			session: self.session.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<C> Debug for Gateway<C>
where
	C: ?Sized + GatewayHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("base_url", &self.config.base_url.as_str())
			.field("session", &self.session)
			.field("refreshing", &self.is_refreshing())
			.finish()
	}
}

/// How a caller came out of the single-flight refresh.
enum Joined {
	Refreshed(AccessToken),
	LeaderFailed(RefreshError),
	FollowerFailed(Error),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
	access_token: AccessToken,
}
