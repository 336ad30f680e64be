use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use stt_queue::TaskId;
use tracing::debug;

/// Header carrying the app token on host API requests.
const APP_API_HEADER: &str = "AUTHORIZATION-APP-API";

/// Side channel the worker reports outcomes through.
///
/// Best-effort from the worker's perspective: a failed report is logged and
/// counted but never retried and never stalls the queue.
#[async_trait]
pub trait ResultReporter: Send + Sync {
	/// # Errors
	///
	/// Transport or host-side rejection of the report.
	async fn report_success(&self, task_id: TaskId, transcript: &str) -> Result<()>;

	/// # Errors
	///
	/// Transport or host-side rejection of the report.
	async fn report_failure(&self, task_id: TaskId, reason: &str) -> Result<()>;
}

#[derive(Serialize)]
struct ReportPayload<'a> {
	task_id: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<&'a str>,
}

#[derive(Serialize)]
struct RegisterPayload<'a> {
	id: &'a str,
	name: &'a str,
	action_handler: &'a str,
}

#[derive(Serialize)]
struct UnregisterPayload<'a> {
	id: &'a str,
}

/// JSON client for the host application's speech-to-text provider API.
#[derive(Clone)]
pub struct HostClient {
	http: reqwest::Client,
	base_url: String,
	app_token: Option<String>,
}

impl HostClient {
	#[must_use]
	pub fn new(base_url: &str, app_token: Option<String>) -> Self {
		Self {
			http: reqwest::Client::new(),
			base_url: base_url.trim_end_matches('/').to_string(),
			app_token,
		}
	}

	fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
		let mut request = self.http.request(method, format!("{}/{path}", self.base_url));
		if let Some(token) = &self.app_token {
			request = request.header(APP_API_HEADER, token);
		}
		request
	}

	async fn put_report(&self, payload: ReportPayload<'_>) -> Result<()> {
		self
			.request(Method::PUT, "providers/speech_to_text/report")
			.json(&payload)
			.send()
			.await
			.context("report request failed")?
			.error_for_status()
			.context("host rejected report")?;
		Ok(())
	}

	/// Register one provider id with the host. Side effect only; the core
	/// consumes no return value.
	///
	/// # Errors
	///
	/// Transport failure or a non-success status from the host.
	pub async fn register_provider(&self, id: &str, display_name: &str, action_path: &str) -> Result<()> {
		self
			.request(Method::POST, "providers/speech_to_text")
			.json(&RegisterPayload {
				id,
				name: display_name,
				action_handler: action_path,
			})
			.send()
			.await
			.context("register request failed")?
			.error_for_status()
			.context("host rejected provider registration")?;

		debug!(provider = id, "provider registered");
		Ok(())
	}

	/// Remove a previously registered provider id.
	///
	/// # Errors
	///
	/// Transport failure or a non-success status from the host.
	pub async fn unregister_provider(&self, id: &str) -> Result<()> {
		self
			.request(Method::DELETE, "providers/speech_to_text")
			.json(&UnregisterPayload { id })
			.send()
			.await
			.context("unregister request failed")?
			.error_for_status()
			.context("host rejected provider removal")?;

		debug!(provider = id, "provider unregistered");
		Ok(())
	}
}

#[async_trait]
impl ResultReporter for HostClient {
	async fn report_success(&self, task_id: TaskId, transcript: &str) -> Result<()> {
		self
			.put_report(ReportPayload {
				task_id: task_id.value(),
				result: Some(transcript),
				error: None,
			})
			.await
	}

	async fn report_failure(&self, task_id: TaskId, reason: &str) -> Result<()> {
		self
			.put_report(ReportPayload {
				task_id: task_id.value(),
				result: None,
				error: Some(reason),
			})
			.await
	}
}
