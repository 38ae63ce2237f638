//! OIDC Relying-Party Library
//!
//! OpenID Connect client: discovery, client registration, authorization
//! requests, code exchange, ID token validation and userinfo retrieval.

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod oidc;
pub mod transport;

pub use cache::{Cache, FileCache, MemoryCache};
pub use error::{OidcError, Result};
pub use oidc::{
    AuthSession, Client, ClientConfig, ClientMeta, ClientOptions, ClientSettings, ClientSource,
    ClaimsRequest, DiscoveryDocument, ProviderPreset, TokenResponse, UserInfoClaims,
    ValidatedIdentity,
};
pub use transport::{ReqwestTransport, Transport, TransportError};
