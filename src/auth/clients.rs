use std::{fmt, path::Path};

use anyhow::anyhow;
use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, GetField};

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn path(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Default)]
pub struct Clients {
    pub(crate) firebase_idpurl: Option<String>,
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// Reads the client secrets file; a missing file means nobody can log in,
    /// which is fine for browsing.
    pub async fn load(path: &Path, public_url: &str) -> AppResult<Clients> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Clients::from_json(serde_json::from_str(&text)?, public_url),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("no client secrets at {}, login is disabled", path.display());
                Ok(Clients::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_json(json: Value, public_url: &str) -> AppResult<Clients> {
        let firebase_idpurl = match json.get("firebase") {
            Some(firebase) => Some(format!(
                "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={}",
                firebase.get_str_field("apikey")?
            )),
            None => None,
        };
        let google_client = provider_client(
            &json,
            ClientProvider::Google,
            "https://accounts.google.com/o/oauth2/auth",
            "https://oauth2.googleapis.com/token",
            public_url,
        )?;
        let github_client = provider_client(
            &json,
            ClientProvider::Github,
            "https://github.com/login/oauth/authorize",
            "https://github.com/login/oauth/access_token",
            public_url,
        )?;

        Ok(
            Clients {
                firebase_idpurl,
                google_client,
                github_client,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or_else(|| anyhow!("OAuth provider {provider} keys not supplied").into())
    }
}

fn provider_client(
    json: &Value,
    provider: ClientProvider,
    auth_url: &str,
    token_url: &str,
    public_url: &str,
) -> AppResult<Option<HappyClient>> {
    let Some(json) = json.get(provider.path()) else {
        return Ok(None);
    };
    let client_id = ClientId::new(json.get_str_field("client_id")?);
    let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

    let auth_url = AuthUrl::new(auth_url.to_owned())?;
    let token_url = TokenUrl::new(token_url.to_owned())?;
    let redirect_url = RedirectUrl::new(format!(
        "{}/lockin/{}",
        public_url.trim_end_matches('/'),
        provider.path()
    ))?;

    Ok(Some(
        BasicClient::new(client_id)
            .set_client_secret(client_secret)
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_are_optional() {
        let clients = Clients::from_json(
            serde_json::json!({
                "firebase": { "apikey": "k" },
                "github": { "client_id": "id", "client_secret": "secret" },
            }),
            "http://localhost:8080/",
        )
        .unwrap();

        assert!(clients.get_client(ClientProvider::Github).is_ok());
        assert!(clients.get_client(ClientProvider::Google).is_err());
        assert!(clients.firebase_idpurl.unwrap().ends_with("key=k"));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let result = Clients::from_json(serde_json::json!({ "google": { "client_id": "id" } }), "http://x");
        assert!(result.is_err());
    }
}
