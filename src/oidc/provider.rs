//! Provider presets
//!
//! Fixed provider URI and client registration for well-known identity
//! providers, bypassing dynamic registration.

use super::ClientConfig;

const MICROSOFT_LOGIN_HOST: &str = "https://login.microsoftonline.com";

/// Static configuration bundle for a known provider
#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub provider_uri: String,
    pub client: ClientConfig,
}

impl ProviderPreset {
    /// Microsoft identity platform (v2.0 endpoint)
    ///
    /// `tenant` is a directory ID or domain. The multi-tenant aliases
    /// (`common`, `organizations`, `consumers`) publish an issuer template
    /// containing `{tenantid}`, which never equals the `iss` of a real token,
    /// so ID token validation only succeeds for a concrete tenant.
    pub fn microsoft(
        tenant: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            provider_uri: format!("{}/{}/v2.0", MICROSOFT_LOGIN_HOST, tenant),
            client: ClientConfig::new(client_id, client_secret, redirect_uri),
        }
    }
}
