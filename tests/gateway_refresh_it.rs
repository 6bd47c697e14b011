// std
use std::{sync::Arc, time::Duration};
// crates.io
use http::{StatusCode, header::AUTHORIZATION};
use parking_lot::Mutex;
use serde_json::json;
use tokio::{sync::Semaphore, task::JoinHandle};
// self
use storefront_gateway::{
	CancellationToken,
	auth::{AccessToken, Session, SessionState, StorageNamespace},
	config::GatewayConfig,
	error::{Error, RefreshError},
	gateway::{ApiRequest, Gateway, LoginRequest},
	http::{ApiResponse, GatewayHttpClient, HttpRequest, TransportFuture},
	store::{MemoryStore, SessionStore},
	url::Url,
};

const BASE_URL: &str = "http://storefront.test";
const REFRESH: &str = "/api/v1/auth/refresh";
const LOGIN: &str = "/api/v1/auth/login";
const LOGOUT: &str = "/api/v1/auth/logout";

#[derive(Clone, Copy, Debug)]
enum RefreshScript {
	Issue,
	Reject(u16),
}

#[derive(Debug)]
struct FakeState {
	valid_token: String,
	next_token: String,
	refresh: RefreshScript,
	refresh_calls: usize,
	reject_login: bool,
	forbidden: Vec<&'static str>,
	held: Option<&'static str>,
	log: Vec<(String, Option<String>)>,
}

/// Scripted storefront API: protected routes accept only the current valid token, the refresh
/// route rotates it, and refresh calls can be held open until the test releases them.
#[derive(Debug)]
struct FakeApi {
	state: Mutex<FakeState>,
	refresh_gate: Semaphore,
	held_gate: Semaphore,
}
impl FakeApi {
	fn new(valid_token: &str, gated: bool) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(FakeState {
				valid_token: valid_token.into(),
				next_token: "fresh-1".into(),
				refresh: RefreshScript::Issue,
				refresh_calls: 0,
				reject_login: false,
				forbidden: Vec::new(),
				held: None,
				log: Vec::new(),
			}),
			refresh_gate: Semaphore::new(if gated { 0 } else { 1_000 }),
			held_gate: Semaphore::new(0),
		})
	}

	fn script_refresh(&self, script: RefreshScript) {
		self.state.lock().refresh = script;
	}

	fn release_refresh(&self) {
		self.refresh_gate.add_permits(1);
	}

	/// Holds responses for `path` until [`FakeApi::release_held`] is called.
	fn hold(&self, path: &'static str) {
		self.state.lock().held = Some(path);
	}

	fn release_held(&self) {
		self.held_gate.add_permits(1);
	}

	fn refresh_calls(&self) -> usize {
		self.state.lock().refresh_calls
	}

	/// Bearer headers sent to `path`, in the order the requests arrived.
	fn bearers_for(&self, path: &str) -> Vec<Option<String>> {
		self.state
			.lock()
			.log
			.iter()
			.filter(|(logged, _)| logged == path)
			.map(|(_, bearer)| bearer.clone())
			.collect()
	}

	/// Paths hit with `bearer`, in arrival order.
	fn paths_with(&self, bearer: &str) -> Vec<String> {
		self.state
			.lock()
			.log
			.iter()
			.filter(|(_, sent)| sent.as_deref() == Some(bearer))
			.map(|(path, _)| path.clone())
			.collect()
	}

	async fn refresh(&self) -> ApiResponse {
		self.state.lock().refresh_calls += 1;

		let _permit = self.refresh_gate.acquire().await.expect("Refresh gate should stay open.");
		let mut state = self.state.lock();

		match state.refresh {
			RefreshScript::Issue => {
				state.valid_token = state.next_token.clone();

				respond(StatusCode::OK, json!({ "data": { "accessToken": state.next_token } }))
			},
			RefreshScript::Reject(status) => respond(
				StatusCode::from_u16(status).expect("Scripted status should be valid."),
				json!({ "message": "refresh cookie expired" }),
			),
		}
	}

	fn login(&self) -> ApiResponse {
		let mut state = self.state.lock();

		if state.reject_login {
			return respond(StatusCode::UNAUTHORIZED, json!({ "message": "bad credentials" }));
		}

		state.valid_token = "login-token".into();

		respond(
			StatusCode::OK,
			json!({
				"data": {
					"accessToken": "login-token",
					"user": { "id": "usr_1", "email": "buyer@example.com", "role": "buyer" }
				}
			}),
		)
	}

	fn protected(&self, path: &str, bearer: Option<&str>) -> ApiResponse {
		let state = self.state.lock();

		if state.forbidden.iter().any(|forbidden| *forbidden == path) {
			return respond(StatusCode::FORBIDDEN, json!({ "message": "forbidden" }));
		}

		match bearer.and_then(|value| value.strip_prefix("Bearer ")) {
			Some(token) if token == state.valid_token =>
				respond(StatusCode::OK, json!({ "data": { "path": path, "token": token } })),
			_ => respond(StatusCode::UNAUTHORIZED, json!({ "message": "token expired" })),
		}
	}
}
impl GatewayHttpClient for FakeApi {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let path = request.url.path().to_owned();
			let bearer = request
				.headers
				.get(AUTHORIZATION)
				.and_then(|value| value.to_str().ok())
				.map(str::to_owned);

			let held = {
				let mut state = self.state.lock();

				state.log.push((path.clone(), bearer.clone()));

				state.held == Some(path.as_str())
			};

			if held {
				let _permit = self.held_gate.acquire().await.expect("Held gate should stay open.");
			}

			Ok(match path.as_str() {
				REFRESH => self.refresh().await,
				LOGIN => self.login(),
				LOGOUT => respond(StatusCode::INTERNAL_SERVER_ERROR, json!({})),
				_ => self.protected(&path, bearer.as_deref()),
			})
		})
	}
}

fn respond(status: StatusCode, body: serde_json::Value) -> ApiResponse {
	ApiResponse::new(status, body.to_string().into_bytes())
}

fn config(queue_timeout: Duration) -> GatewayConfig {
	GatewayConfig::builder(Url::parse(BASE_URL).expect("Base URL fixture should parse."))
		.refresh_timeout(Duration::from_secs(5))
		.queue_timeout(queue_timeout)
		.build()
		.expect("Gateway config fixture should validate.")
}

async fn gateway_with_token(
	api: &Arc<FakeApi>,
	token: Option<&str>,
	queue_timeout: Duration,
) -> (Gateway<FakeApi>, Arc<MemoryStore>) {
	let config = config(queue_timeout);
	let store_backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn SessionStore> = store_backend.clone();
	let session = Arc::new(SessionState::new(store, config.namespace.clone()));

	if let Some(token) = token {
		session
			.replace(Session::new(AccessToken::new(token), None))
			.await
			.expect("Seeding the session should succeed.");
	}

	(Gateway::with_http_client(config, session, api.clone()), store_backend)
}

fn spawn_get(gateway: &Gateway<FakeApi>, path: &'static str) -> JoinHandle<Result<String, Error>> {
	let gateway = gateway.clone();

	tokio::spawn(async move {
		let data: serde_json::Value = gateway.get_json(path).await?;

		Ok(data["token"].as_str().unwrap_or_default().to_owned())
	})
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !condition() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("Condition should be reached before the test deadline.");
}

async fn join(handle: JoinHandle<Result<String, Error>>) -> Result<String, Error> {
	handle.await.expect("Request task should not panic.")
}

#[tokio::test]
async fn concurrent_faults_share_one_refresh_and_replay_in_order() {
	let api = FakeApi::new("valid-0", true);
	let (gateway, store) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let first = spawn_get(&gateway, "/api/v1/orders/a");

	wait_until(|| gateway.is_refreshing()).await;

	let second = spawn_get(&gateway, "/api/v1/orders/b");

	wait_until(|| gateway.queued_requests() == 1).await;

	let third = spawn_get(&gateway, "/api/v1/orders/c");

	wait_until(|| gateway.queued_requests() == 2).await;
	api.release_refresh();

	for handle in [first, second, third] {
		assert_eq!(join(handle).await.expect("Replay should succeed."), "fresh-1");
	}

	assert_eq!(api.refresh_calls(), 1);
	assert_eq!(api.bearers_for(REFRESH), vec![None]);

	assert_eq!(
		api.paths_with("Bearer fresh-1"),
		vec!["/api/v1/orders/a", "/api/v1/orders/b", "/api/v1/orders/c"]
	);
	assert_eq!(gateway.refresh_metrics.attempts(), 1);
	assert_eq!(gateway.refresh_metrics.queued(), 2);
	assert_eq!(gateway.refresh_metrics.replays(), 3);
	assert_eq!(gateway.access_token().map(|token| token.expose().to_owned()).as_deref(), Some("fresh-1"));

	let persisted = store
		.load(&StorageNamespace::new("auth-storage").expect("Namespace fixture should be valid."))
		.await
		.expect("Store load should succeed.")
		.expect("Refreshed session should be persisted.");

	assert_eq!(
		persisted.session.access_token.as_ref().map(AccessToken::expose),
		Some("fresh-1")
	);
}

#[tokio::test]
async fn refresh_failure_rejects_queue_and_ends_session() {
	let api = FakeApi::new("valid-0", true);

	api.script_refresh(RefreshScript::Reject(401));

	let (gateway, store) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let leader = spawn_get(&gateway, "/api/v1/orders/a");

	wait_until(|| gateway.is_refreshing()).await;

	let followers = [spawn_get(&gateway, "/api/v1/orders/b"), spawn_get(&gateway, "/api/v1/cart")];

	wait_until(|| gateway.queued_requests() == 2).await;
	api.release_refresh();

	match join(leader).await {
		Err(Error::Status(err)) => assert_eq!(err.status, StatusCode::UNAUTHORIZED),
		other => panic!("Leader should see its original failure, got {other:?}."),
	}

	for handle in followers {
		match join(handle).await {
			Err(Error::Refresh(RefreshError::Rejected { status, .. })) => assert_eq!(status, 401),
			other => panic!("Queued request should see the refresh failure, got {other:?}."),
		}
	}

	assert_eq!(api.refresh_calls(), 1);
	assert!(!gateway.is_authenticated());
	assert!(!gateway.is_refreshing());
	assert!(store.is_empty());
	assert_eq!(gateway.refresh_metrics.failures(), 1);
}

#[tokio::test]
async fn login_failure_never_refreshes() {
	let api = FakeApi::new("valid-0", false);

	api.state.lock().reject_login = true;

	let (gateway, _) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let err = gateway
		.login(&LoginRequest::new("buyer@example.com", "wrong"))
		.await
		.expect_err("Rejected credentials should fail.");

	assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
	assert_eq!(api.refresh_calls(), 0);
	assert!(gateway.is_authenticated());
}

#[tokio::test]
async fn anonymous_fault_is_returned_without_refresh() {
	let api = FakeApi::new("valid-0", false);
	let (gateway, _) = gateway_with_token(&api, None, Duration::from_secs(5)).await;
	let err = gateway
		.send(ApiRequest::get("/api/v1/orders"))
		.await
		.expect_err("Anonymous request should be rejected.");

	assert!(err.is_auth_failure());
	assert_eq!(api.refresh_calls(), 0);
	assert_eq!(api.bearers_for("/api/v1/orders"), vec![None]);
}

#[tokio::test]
async fn replayed_request_is_never_refreshed_twice() {
	let api = FakeApi::new("valid-0", false);

	api.state.lock().forbidden.push("/api/v1/admin/reports");

	let (gateway, _) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let err = gateway
		.send(ApiRequest::get("/api/v1/admin/reports"))
		.await
		.expect_err("Forbidden route should stay forbidden after refresh.");

	assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
	assert_eq!(api.refresh_calls(), 1);
	assert_eq!(api.bearers_for("/api/v1/admin/reports").len(), 2);
}

#[tokio::test]
async fn request_marked_retried_surfaces_the_fault() {
	let api = FakeApi::new("valid-0", false);
	let (gateway, _) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let err = gateway
		.send(ApiRequest::get("/api/v1/orders").mark_retried())
		.await
		.expect_err("Retried request should not refresh.");

	assert!(err.is_auth_failure());
	assert_eq!(api.refresh_calls(), 0);
}

#[tokio::test]
async fn queued_request_times_out_without_blocking_the_leader() {
	let api = FakeApi::new("valid-0", true);
	let (gateway, _) = gateway_with_token(&api, Some("stale"), Duration::from_millis(50)).await;
	let leader = spawn_get(&gateway, "/api/v1/orders/a");

	wait_until(|| gateway.is_refreshing()).await;

	let follower = spawn_get(&gateway, "/api/v1/orders/b");

	match join(follower).await {
		Err(Error::QueueTimeout { waited }) => assert_eq!(waited, Duration::from_millis(50)),
		other => panic!("Queued request should time out, got {other:?}."),
	}

	assert_eq!(gateway.queued_requests(), 0);
	api.release_refresh();
	assert_eq!(join(leader).await.expect("Leader should replay."), "fresh-1");
}

#[tokio::test]
async fn cancelled_request_leaves_the_queue() {
	let api = FakeApi::new("valid-0", true);
	let (gateway, _) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let leader = spawn_get(&gateway, "/api/v1/orders/a");

	wait_until(|| gateway.is_refreshing()).await;

	let cancel = CancellationToken::new();
	let follower = {
		let gateway = gateway.clone();
		let cancel = cancel.clone();

		tokio::spawn(async move {
			gateway.send_with_cancel(ApiRequest::get("/api/v1/orders/b"), &cancel).await
		})
	};

	wait_until(|| gateway.queued_requests() == 1).await;
	cancel.cancel();

	let outcome = follower.await.expect("Cancelled task should not panic.");

	assert!(matches!(outcome, Err(Error::Cancelled)));
	assert_eq!(gateway.queued_requests(), 0);
	api.release_refresh();
	assert_eq!(join(leader).await.expect("Leader should replay."), "fresh-1");
	assert_eq!(api.bearers_for("/api/v1/orders/b").len(), 1);
}

#[tokio::test]
async fn aborted_leader_abandons_the_queue() {
	let api = FakeApi::new("valid-0", true);
	let (gateway, _) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let leader = spawn_get(&gateway, "/api/v1/orders/a");

	wait_until(|| gateway.is_refreshing()).await;

	let follower = spawn_get(&gateway, "/api/v1/orders/b");

	wait_until(|| gateway.queued_requests() == 1).await;
	leader.abort();

	match join(follower).await {
		Err(Error::Refresh(RefreshError::Abandoned)) => {},
		other => panic!("Queued request should be abandoned, got {other:?}."),
	}

	assert!(!gateway.is_refreshing());
}

#[tokio::test]
async fn login_then_restore_rehydrates_the_session() {
	let api = FakeApi::new("valid-0", false);
	let (gateway, store) = gateway_with_token(&api, None, Duration::from_secs(5)).await;
	let session = gateway
		.login(&LoginRequest::new("buyer@example.com", "hunter2"))
		.await
		.expect("Login should succeed.");

	assert_eq!(session.user.as_ref().map(|user| user.email.as_str()), Some("buyer@example.com"));

	let store: Arc<dyn SessionStore> = store;
	let restored = Gateway::<FakeApi>::restore(config(Duration::from_secs(5)), store, api.clone())
		.await
		.expect("Restore should succeed.");

	assert_eq!(restored.session(), session);

	let data: serde_json::Value =
		restored.get_json("/api/v1/orders").await.expect("Restored token should be accepted.");

	assert_eq!(data["token"], "login-token");
}

#[tokio::test]
async fn logout_clears_session_even_when_endpoint_fails() {
	let api = FakeApi::new("valid-0", false);
	let (gateway, store) = gateway_with_token(&api, Some("valid-0"), Duration::from_secs(5)).await;

	gateway.logout().await.expect("Logout should succeed locally.");

	assert!(!gateway.is_authenticated());
	assert!(store.is_empty());
	assert_eq!(api.bearers_for(LOGOUT), vec![Some("Bearer valid-0".to_owned())]);
	assert_eq!(api.refresh_calls(), 0);
}

#[tokio::test]
async fn explicit_refresh_rotates_the_token() {
	let api = FakeApi::new("valid-0", false);
	let (gateway, _) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let token = gateway.refresh_now().await.expect("Refresh should succeed.");

	assert_eq!(token.expose(), "fresh-1");
	assert_eq!(gateway.access_token(), Some(token));
	assert!(!gateway.is_refreshing());
}

#[tokio::test]
async fn late_fault_after_failed_refresh_does_not_refresh_again() {
	let api = FakeApi::new("valid-0", false);

	api.script_refresh(RefreshScript::Reject(401));
	api.hold("/api/v1/reports");

	let (gateway, store) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let straggler = spawn_get(&gateway, "/api/v1/reports");

	wait_until(|| api.bearers_for("/api/v1/reports").len() == 1).await;

	let err = gateway
		.send(ApiRequest::get("/api/v1/orders"))
		.await
		.expect_err("Request should fail once the refresh is rejected.");

	assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
	assert!(!gateway.is_authenticated());
	api.release_held();

	match join(straggler).await {
		Err(Error::Status(err)) => assert_eq!(err.status, StatusCode::UNAUTHORIZED),
		other => panic!("Late request should see its own failure, got {other:?}."),
	}

	assert_eq!(api.refresh_calls(), 1);
	assert!(!gateway.is_authenticated());
	assert!(store.is_empty());
}

#[tokio::test]
async fn logout_during_refresh_keeps_the_user_signed_out() {
	let api = FakeApi::new("valid-0", true);
	let (gateway, store) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let leader = spawn_get(&gateway, "/api/v1/orders/a");

	wait_until(|| gateway.is_refreshing()).await;

	let follower = spawn_get(&gateway, "/api/v1/orders/b");

	wait_until(|| gateway.queued_requests() == 1).await;
	gateway.logout().await.expect("Logout should succeed locally.");
	api.release_refresh();

	match join(leader).await {
		Err(Error::Status(err)) => assert_eq!(err.status, StatusCode::UNAUTHORIZED),
		other => panic!("Leader should see its original failure, got {other:?}."),
	}
	match join(follower).await {
		Err(Error::Refresh(RefreshError::Superseded)) => {},
		other => panic!("Queued request should not outlive the logout, got {other:?}."),
	}

	assert_eq!(api.refresh_calls(), 1);
	assert!(!gateway.is_authenticated());
	assert!(store.is_empty());
	assert!(api.paths_with("Bearer fresh-1").is_empty());
}

#[tokio::test]
async fn login_during_refresh_survives_the_refresh_outcome() {
	let api = FakeApi::new("valid-0", true);

	api.script_refresh(RefreshScript::Reject(401));

	let (gateway, store) = gateway_with_token(&api, Some("stale"), Duration::from_secs(5)).await;
	let leader = spawn_get(&gateway, "/api/v1/orders/a");

	wait_until(|| gateway.is_refreshing()).await;
	gateway
		.login(&LoginRequest::new("buyer@example.com", "hunter2"))
		.await
		.expect("Login should succeed while a refresh is pending.");
	api.release_refresh();

	assert!(join(leader).await.is_err());
	assert_eq!(
		gateway.access_token().map(|token| token.expose().to_owned()).as_deref(),
		Some("login-token")
	);
	assert_eq!(store.len(), 1);
}
