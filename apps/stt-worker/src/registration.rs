use anyhow::Result;
use tracing::info;

use crate::host::HostClient;
use crate::models::ModelCatalog;

/// Identifier registered with the host for one model.
#[must_use]
pub fn provider_id(prefix: &str, model_name: &str) -> String {
	format!("{prefix}:{model_name}")
}

/// Human-readable label shown by the host.
#[must_use]
pub fn display_name(model_name: &str) -> String {
	format!("Local Whisper Speech To Text: {model_name}")
}

/// Submission path convention the front end routes uploads through.
#[must_use]
pub fn action_path(model_name: &str) -> String {
	format!("model/{model_name}")
}

/// Enable/disable handler: register every known model with the host on
/// enable, unregister the same identifiers on disable.
///
/// # Errors
///
/// The first failed host call; identifiers processed before it stay as the
/// host recorded them.
pub async fn set_enabled(client: &HostClient, catalog: &ModelCatalog, prefix: &str, enabled: bool) -> Result<()> {
	info!(enabled, models = catalog.len(), "🔧 Updating provider registration");

	for name in catalog.names() {
		let id = provider_id(prefix, &name);
		if enabled {
			client.register_provider(&id, &display_name(&name), &action_path(&name)).await?;
		} else {
			client.unregister_provider(&id).await?;
		}
	}

	Ok(())
}
