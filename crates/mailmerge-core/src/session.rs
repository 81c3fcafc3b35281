//! SMTP session setup for a batch.

use mailmerge_smtp::{Client, Endpoint, Transport, auth};

use crate::config::SessionSettings;
use crate::error::Result;

/// Brings a freshly greeted session to the point where mail can be sent.
///
/// A failed EHLO/HELO is logged and ignored. STARTTLS (unless the endpoint
/// already uses implicit TLS) and AUTH (unless no credentials are set) are
/// mandatory: their failure is returned.
///
/// # Errors
///
/// Returns an error if STARTTLS or AUTH fails.
pub async fn establish<S: Transport>(
    client: &mut Client<S>,
    endpoint: &Endpoint,
    settings: &SessionSettings,
) -> Result<()> {
    if let Err(err) = client.hello(&settings.client_name).await {
        tracing::error!(error = %err, "greeting rejected, continuing");
    }

    if !endpoint.implicit_tls {
        client
            .starttls(&endpoint.host, settings.tls, &settings.client_name)
            .await?;
        tracing::info!(host = %endpoint.host, "upgraded connection with STARTTLS");
    }

    match &settings.credentials {
        None => tracing::debug!("No credentials supplied, skipping auth"),
        Some(credentials) => {
            tracing::debug!(
                username = credentials.username(),
                mechanism = %settings.auth_mechanism,
                "authenticating"
            );
            let mut strategy = auth::authenticator(settings.auth_mechanism, credentials.clone());
            client.authenticate(strategy.as_mut()).await?;
            tracing::info!(username = credentials.username(), "authenticated");
        }
    }

    Ok(())
}
