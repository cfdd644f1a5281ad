use std::fmt;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use crate::action::Property;

/// Discriminant of an [`Authentication`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticationType {
    None,
    BearerToken,
    Basic,
    ApiKey,
    #[serde(rename = "oAuth2")]
    OAuth2,
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::BearerToken => "bearer token",
            Self::Basic => "basic",
            Self::ApiKey => "api key",
            Self::OAuth2 => "oauth2",
        })
    }
}

/// Where an API key is attached to the outbound request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    QueryParams,
}

/// Token state obtained from an OAuth2 token endpoint.
///
/// This is the internal part of a datasource that authentication may update;
/// the caller persists it after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    #[serde(serialize_with = "expose_secret")]
    pub token: SecretString,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
}

impl AuthenticationResponse {
    /// Whether the token must be refreshed, treating tokens that expire within
    /// `skew` as already expired.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at - skew <= now)
    }
}

/// The credential attached to a datasource. Exactly one variant is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "authenticationType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Authentication {
    None,
    BearerToken {
        #[serde(serialize_with = "expose_secret")]
        bearer_token: SecretString,
    },
    Basic {
        username: String,
        #[serde(serialize_with = "expose_secret")]
        password: SecretString,
    },
    ApiKey {
        key: String,
        #[serde(serialize_with = "expose_secret")]
        value: SecretString,
        #[serde(default)]
        add_to: ApiKeyLocation,
        #[serde(default)]
        header_prefix: Option<String>,
    },
    #[serde(rename = "oAuth2")]
    OAuth2 {
        client_id: String,
        #[serde(serialize_with = "expose_secret")]
        client_secret: SecretString,
        access_token_url: String,
        #[serde(default)]
        scope: Option<String>,
        #[serde(default)]
        authentication_response: Option<AuthenticationResponse>,
    },
}

impl Authentication {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::BearerToken {
            bearer_token: SecretString::new(token.into()),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn api_key(
        key: impl Into<String>,
        value: impl Into<String>,
        add_to: ApiKeyLocation,
    ) -> Self {
        Self::ApiKey {
            key: key.into(),
            value: SecretString::new(value.into()),
            add_to,
            header_prefix: None,
        }
    }

    pub fn oauth2_client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        access_token_url: impl Into<String>,
    ) -> Self {
        Self::OAuth2 {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            access_token_url: access_token_url.into(),
            scope: None,
            authentication_response: None,
        }
    }

    pub fn authentication_type(&self) -> AuthenticationType {
        match self {
            Self::None => AuthenticationType::None,
            Self::BearerToken { .. } => AuthenticationType::BearerToken,
            Self::Basic { .. } => AuthenticationType::Basic,
            Self::ApiKey { .. } => AuthenticationType::ApiKey,
            Self::OAuth2 { .. } => AuthenticationType::OAuth2,
        }
    }
}

/// Connection-level settings of a datasource.
///
/// Read-only input to the framework, except for the OAuth2 token state inside
/// [`Authentication::OAuth2`], which may be refreshed and handed back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasourceConfiguration {
    /// Stable identity used to cache the live connection.
    pub id: Option<String>,
    pub url: Option<String>,
    pub headers: Vec<Property>,
    pub query_parameters: Vec<Property>,
    pub authentication: Option<Authentication>,
    pub properties: Vec<Property>,
}

impl DatasourceConfiguration {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = Some(authentication);
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Property::new(key, value));
        self
    }

    /// Active authentication type; an absent credential reads as `None`.
    pub fn authentication_type(&self) -> AuthenticationType {
        self.authentication
            .as_ref()
            .map_or(AuthenticationType::None, Authentication::authentication_type)
    }
}

fn expose_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_serde_roundtrip() {
        let auth = Authentication::bearer("sk-test");
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json["authenticationType"], "bearerToken");
        assert_eq!(json["bearerToken"], "sk-test");

        let back: Authentication = serde_json::from_value(json).unwrap();
        assert_eq!(back.authentication_type(), AuthenticationType::BearerToken);
    }

    #[test]
    fn api_key_defaults_to_header() {
        let json = r#"{"authenticationType": "apiKey", "key": "X-Api-Key", "value": "k"}"#;
        let auth: Authentication = serde_json::from_str(json).unwrap();
        match auth {
            Authentication::ApiKey { add_to, header_prefix, .. } => {
                assert_eq!(add_to, ApiKeyLocation::Header);
                assert!(header_prefix.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn oauth2_deserializes() {
        let json = r#"{
            "authenticationType": "oAuth2",
            "clientId": "id",
            "clientSecret": "secret",
            "accessTokenUrl": "https://auth.example.com/token",
            "scope": "read"
        }"#;
        let auth: Authentication = serde_json::from_str(json).unwrap();
        assert_eq!(auth.authentication_type(), AuthenticationType::OAuth2);
    }

    #[test]
    fn debug_redacts_secrets() {
        let secret = "very-secret-password-value";
        let auth = Authentication::basic("admin", secret);
        let debug = format!("{auth:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains(secret));
    }

    #[test]
    fn token_expiry_respects_skew() {
        let now = Utc::now();
        let response = AuthenticationResponse {
            token: SecretString::new("t".into()),
            expires_at: Some(now + Duration::seconds(30)),
            issued_at: now,
        };
        assert!(!response.is_expired(now, Duration::seconds(10)));
        assert!(response.is_expired(now, Duration::seconds(60)));

        let no_expiry = AuthenticationResponse {
            expires_at: None,
            ..response
        };
        assert!(!no_expiry.is_expired(now, Duration::seconds(60)));
    }

    #[test]
    fn absent_credential_reads_as_none() {
        let ds = DatasourceConfiguration::new("https://api.example.com");
        assert_eq!(ds.authentication_type(), AuthenticationType::None);
        let ds = ds.with_authentication(Authentication::bearer("x"));
        assert_eq!(ds.authentication_type(), AuthenticationType::BearerToken);
    }
}
