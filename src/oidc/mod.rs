//! OIDC relying-party flow

pub mod auth_request;
pub mod callback;
pub mod client;
pub mod discovery;
pub mod id_token;
pub mod pkce;
pub mod provider;
pub mod registration;
pub mod token;
pub mod userinfo;

pub use auth_request::{AuthRequest, ClaimRequest, ClaimsRequest};
pub use client::{AuthSession, Client, ClientOptions, ClientSettings};
pub use discovery::{DiscoveryDocument, DiscoveryResolver, ProviderKeys};
pub use id_token::{Audience, IdTokenClaims, SignatureCheck, ValidatedIdentity};
pub use pkce::PkceParams;
pub use provider::ProviderPreset;
pub use registration::{ClientConfig, ClientMeta, ClientSource};
pub use token::TokenResponse;
pub use userinfo::UserInfoClaims;
