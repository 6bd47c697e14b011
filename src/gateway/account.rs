//! Account endpoints that start or end a session.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Session, UserProfile},
	gateway::{ApiRequest, Gateway},
	http::GatewayHttpClient,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Password credentials for the login endpoint.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: String,
}
impl LoginRequest {
	/// Creates login credentials.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest").field("email", &self.email).finish_non_exhaustive()
	}
}

/// One-time passcode submitted to the OTP verification endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct OtpRequest {
	/// Account email the code was sent to.
	pub email: String,
	/// Passcode.
	pub otp: String,
}
impl OtpRequest {
	/// Creates an OTP verification request.
	pub fn new(email: impl Into<String>, otp: impl Into<String>) -> Self {
		Self { email: email.into(), otp: otp.into() }
	}
}

/// Registration payload for the signup endpoint.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
	/// Account email.
	pub email: String,
	/// Chosen password.
	pub password: String,
	/// Display name.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Additional registration fields forwarded verbatim.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl SignupRequest {
	/// Creates a signup request without optional fields.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into(), name: None, extra: Default::default() }
	}
}
impl Debug for SignupRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignupRequest")
			.field("email", &self.email)
			.field("name", &self.name)
			.finish_non_exhaustive()
	}
}

/// `data` payload returned by login and OTP verification.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
	/// Newly issued bearer credential.
	pub access_token: AccessToken,
	/// Signed-in account.
	pub user: Option<UserProfile>,
}

impl<C> Gateway<C>
where
	C: ?Sized + GatewayHttpClient,
{
	/// Signs in with email and password, storing the returned session.
	pub async fn login(&self, credentials: &LoginRequest) -> Result<Session> {
		let path = self.config.endpoints.login.clone();

		self.establish(&path, credentials, "login").await
	}

	/// Completes an OTP challenge, storing the returned session.
	pub async fn verify_otp(&self, request: &OtpRequest) -> Result<Session> {
		let path = self.config.endpoints.verify_otp.clone();

		self.establish(&path, request, "verify_otp").await
	}

	/// Registers an account and returns the endpoint's `data` payload.
	///
	/// The current session is left untouched.
	pub async fn signup<T>(&self, request: &SignupRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.post_json(&self.config.endpoints.signup, request).await
	}

	/// Ends the session.
	///
	/// The logout call is best-effort; the local session and its persisted entry are cleared
	/// whatever the endpoint answers. Only a failure to delete the persisted entry is returned.
	pub async fn logout(&self) -> Result<()> {
		const KIND: OpKind = OpKind::Logout;

		let span = OpSpan::new(KIND, "logout");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				if let Err(err) = self.send(ApiRequest::post(self.config.endpoints.logout.as_str())).await
				{
					obs::ignored_failure("logout_call", &err);
				}

				self.session.clear().await?;
				obs::session_cleared("logout");

				Ok(())
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn establish<B>(&self, path: &str, body: &B, stage: &'static str) -> Result<Session>
	where
		B: Serialize,
	{
		const KIND: OpKind = OpKind::Login;

		let span = OpSpan::new(KIND, stage);

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let payload: AuthPayload = self.post_json(path, body).await?;
				let session = Session::new(payload.access_token, payload.user);

				self.session.replace(session.clone()).await?;

				Ok(session)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}
}
