//! HTTP helpers shared by provider variants.

use authgate_core::SessionState;
use http::header::{ACCEPT, AUTHORIZATION};
use reqwest::RequestBuilder;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::data::ProviderData;
use crate::traits::ProviderError;

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// ID token, if issued.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token, if issued.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// New session holding these tokens.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Token`] if `expires_in` is out of range.
    pub fn into_session(self) -> Result<SessionState, ProviderError> {
        let mut session = SessionState::with_tokens(self.access_token, self.id_token.unwrap_or_default());
        session.refresh_token = self.refresh_token.unwrap_or_default();
        apply_lifetime(&mut session, self.expires_in)?;
        Ok(session)
    }

    /// Refreshed copy of `previous`.
    ///
    /// Tokens the response omits are carried over. Identity fields are cleared
    /// so they are re-derived rather than trusted from the old session.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Token`] if `expires_in` is out of range.
    pub fn refresh(self, previous: &SessionState) -> Result<SessionState, ProviderError> {
        let mut session = SessionState::with_tokens(
            self.access_token,
            self.id_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| previous.id_token.clone()),
        );
        session.refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| previous.refresh_token.clone());
        apply_lifetime(&mut session, self.expires_in)?;
        Ok(session)
    }
}

fn apply_lifetime(session: &mut SessionState, expires_in: Option<i64>) -> Result<(), ProviderError> {
    match expires_in {
        Some(secs) if !session.set_expires_in(secs) => {
            Err(ProviderError::Token(format!("expires_in {secs} out of range")))
        }
        _ => Ok(()),
    }
}

// Some providers send `expires_in` as a string.
fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Send a request expecting a JSON body and a 2xx status.
///
/// # Errors
///
/// Returns [`ProviderError::Upstream`] with status and body on non-2xx.
pub async fn send_json(request: RequestBuilder, endpoint: &Url) -> Result<Value, ProviderError> {
    let response = request.header(ACCEPT, "application/json").send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(ProviderError::Upstream {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    debug!(endpoint = %endpoint, status = status.as_u16(), "provider request succeeded");
    Ok(serde_json::from_str(&body)?)
}

/// POST a form to the token endpoint and parse the token response.
///
/// # Errors
///
/// Returns error on transport failure, non-2xx status, or a missing access token.
pub async fn post_token_form(
    data: &ProviderData,
    request: RequestBuilder,
) -> Result<TokenResponse, ProviderError> {
    let json = send_json(request, &data.redeem_url).await?;
    let token: TokenResponse = serde_json::from_value(json)?;
    if token.access_token.is_empty() {
        return Err(ProviderError::Token("empty access_token in token response".to_string()));
    }
    Ok(token)
}

/// GET `url` with a bearer token and parse the JSON body.
///
/// # Errors
///
/// Returns error on transport failure or non-2xx status.
pub async fn get_json_bearer(
    data: &ProviderData,
    url: &Url,
    token: &str,
) -> Result<Value, ProviderError> {
    let request = data
        .client
        .get(url.clone())
        .header(AUTHORIZATION, format!("Bearer {token}"));
    send_json(request, url).await
}

/// Call the validate endpoint with a bearer token. Any 2xx means valid.
pub async fn validate_token(data: &ProviderData, url: &Url, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let result = data
        .client
        .get(url.clone())
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            debug!(endpoint = %url, status = response.status().as_u16(), "token validation rejected");
            false
        }
        Err(e) => {
            debug!(endpoint = %url, "token validation request failed: {e}");
            false
        }
    }
}

/// Look up a dotted path such as `account.email` in a JSON object.
#[must_use]
pub fn claim_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(json, |value, key| value.get(key))
}

/// Read a group list that may be a JSON array or a comma-separated string.
#[must_use]
pub fn parse_groups(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split(',').map(|g| g.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_into_session() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "id_token": "it",
            "expires_in": "3600",
            "token_type": "Bearer",
        }))
        .unwrap();
        let session = token.into_session().unwrap();
        assert_eq!(session.access_token, "at");
        assert_eq!(session.id_token, "it");
        assert!(session.refresh_token.is_empty());
        assert!(session.email.is_empty());
        assert!(!session.is_expired());
        assert!(session.expires_on.is_some());
    }

    #[test]
    fn test_refresh_keeps_omitted_tokens() {
        let mut previous = SessionState::with_tokens("old-at", "old-it");
        previous.refresh_token = "old-rt".to_string();
        previous.email = "user@example.com".to_string();

        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "new-at",
            "expires_in": 60,
        }))
        .unwrap();
        let session = token.refresh(&previous).unwrap();
        assert_eq!(session.access_token, "new-at");
        assert_eq!(session.id_token, "old-it");
        assert_eq!(session.refresh_token, "old-rt");
        assert!(session.email.is_empty());
    }

    #[test]
    fn test_out_of_range_expires_in_rejected() {
        for expires_in in [json!("100000000000000"), json!(i64::MAX), json!(-100_000_000_000_000_i64)] {
            let token: TokenResponse = serde_json::from_value(json!({
                "access_token": "at",
                "expires_in": expires_in,
            }))
            .unwrap();
            let err = token.clone().into_session().unwrap_err();
            assert!(matches!(err, ProviderError::Token(_)), "{err}");
            assert_eq!(err.kind(), authgate_core::ErrorKind::TamperedOrExpired);
            assert!(token.refresh(&SessionState::new()).is_err());
        }

        // a float lifetime is not an integer and is ignored
        let token: TokenResponse =
            serde_json::from_value(json!({"access_token": "at", "expires_in": 9e18})).unwrap();
        assert_eq!(token.into_session().unwrap().expires_on, None);
    }

    #[test]
    fn test_claim_path() {
        let json = json!({"account": {"email": "a@b.c"}, "email": "top@b.c"});
        assert_eq!(claim_path(&json, "account.email"), Some(&json!("a@b.c")));
        assert_eq!(claim_path(&json, "email"), Some(&json!("top@b.c")));
        assert_eq!(claim_path(&json, "account.missing"), None);
    }

    #[test]
    fn test_parse_groups() {
        assert_eq!(parse_groups(&json!("a,b")), vec!["a", "b"]);
        assert_eq!(parse_groups(&json!(["a", "b", 3])), vec!["a", "b"]);
        assert!(parse_groups(&json!(null)).is_empty());
    }
}
