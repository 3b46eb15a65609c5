//! Passport provider.
//!
//! Access tokens are RSA-signed JWTs whose `sub` claim has the form
//! `DOMAIN\user`. Group memberships come from the profile endpoint and are
//! cached per email; requests are authorized by matching `host/path` against
//! a prefix table of allowed groups.

use async_trait::async_trait;
use authgate_core::SessionState;
use authgate_core::config::PassportFiles;
use base64::{Engine, engine::general_purpose::STANDARD};
use http::header::{AUTHORIZATION, HOST};
use http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::acl::{ANY_GROUP, AuthorizationTable};
use crate::data::ProviderData;
use crate::groups::GroupCache;
use crate::request::{get_json_bearer, parse_groups, post_token_form};
use crate::traits::{Provider, ProviderError};

const PROVIDER_NAME: &str = "Passport";
const DEFAULT_SCOPE: &str = "profile email";
const LOCAL_DOMAIN: &str = "local";

/// Files the passport provider loads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassportConfig {
    /// PEM-encoded RSA public key used to verify access tokens.
    pub public_key_file: PathBuf,
    /// YAML authorization table.
    pub auth_file: PathBuf,
}

impl PassportConfig {
    /// Check that both paths are set.
    ///
    /// # Errors
    ///
    /// Returns error naming the first empty path.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.public_key_file.as_os_str().is_empty() {
            return Err(ProviderError::Config("key file not set".to_string()));
        }
        if self.auth_file.as_os_str().is_empty() {
            return Err(ProviderError::Config("auth file not set".to_string()));
        }
        Ok(())
    }
}

impl From<&PassportFiles> for PassportConfig {
    fn from(files: &PassportFiles) -> Self {
        Self {
            public_key_file: files.public_key_file.clone(),
            auth_file: files.auth_file.clone(),
        }
    }
}

/// JWT-based provider with path-prefix group authorization.
pub struct PassportProvider {
    data: ProviderData,
    key: DecodingKey,
    validation: Validation,
    table: AuthorizationTable,
    groups: Arc<GroupCache>,
}

impl PassportProvider {
    /// Create a passport provider, loading its key and authorization table.
    ///
    /// # Errors
    ///
    /// Returns error if the profile URL is missing or either file cannot be
    /// read or parsed.
    pub fn new(mut data: ProviderData, config: &PassportConfig) -> Result<Self, ProviderError> {
        if data.profile_url.is_none() {
            return Err(ProviderError::Config("profile_url not set".to_string()));
        }
        config.validate()?;

        data.set_defaults(PROVIDER_NAME, DEFAULT_SCOPE);
        data.no_validate = true;

        let table = AuthorizationTable::load(&config.auth_file)?;
        let pem = std::fs::read(&config.public_key_file).map_err(|e| {
            ProviderError::Config(format!(
                "key file load error {}: {e}",
                config.public_key_file.display()
            ))
        })?;
        let key = DecodingKey::from_rsa_pem(&pem)
            .map_err(|e| ProviderError::Config(format!("public key decode error: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        debug!(rules = table.len(), "Loaded passport authorization table");
        Ok(Self {
            data,
            key,
            validation,
            table,
            groups: Arc::new(GroupCache::new()),
        })
    }

    /// Share a group cache with other components.
    #[must_use]
    pub fn with_group_cache(mut self, groups: Arc<GroupCache>) -> Self {
        self.groups = groups;
        self
    }

    /// The group cache this provider fills.
    #[must_use]
    pub fn group_cache(&self) -> &Arc<GroupCache> {
        &self.groups
    }

    /// The loaded authorization table.
    #[must_use]
    pub const fn table(&self) -> &AuthorizationTable {
        &self.table
    }

    fn verify(&self, token: &str) -> Result<HashMap<String, Value>, ProviderError> {
        jsonwebtoken::decode::<HashMap<String, Value>>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ProviderError::Token(e.to_string()))
    }

    async fn fetch_groups(&self, token: &str) -> Result<Vec<String>, ProviderError> {
        let url = self
            .data
            .profile_url
            .as_ref()
            .ok_or_else(|| ProviderError::Config("profile_url not set".to_string()))?;
        let json = get_json_bearer(&self.data, url, token).await?;
        Ok(json.get("group").map(parse_groups).unwrap_or_default())
    }
}

/// Split a `DOMAIN\user` subject into `(user, domain)`, lowercased.
///
/// A subject without a domain belongs to the `local` domain.
#[must_use]
pub fn parse_subject(subject: &str) -> (String, Option<String>) {
    let login = subject.to_lowercase();
    let mut parts = login.split('\\');
    let first = parts.next().unwrap_or_default().to_string();
    match parts.next() {
        Some(user) => (user.to_string(), Some(first)),
        None => (first, None),
    }
}

fn request_host(parts: &Parts) -> &str {
    parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .unwrap_or("")
}

impl std::fmt::Debug for PassportProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassportProvider")
            .field("data", &self.data)
            .field("table", &self.table)
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for PassportProvider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    // Nonce and extra parameters are not forwarded to passport.
    fn get_login_url(
        &self,
        redirect_uri: &str,
        state: &str,
        _nonce: &str,
        _extra: &[(String, String)],
    ) -> url::Url {
        self.data.login_url(redirect_uri, state, &[])
    }

    async fn redeem(
        &self,
        redirect_uri: &str,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<SessionState, ProviderError> {
        if code.is_empty() {
            return Err(ProviderError::MissingCode);
        }

        let mut form = vec![
            ("redirect_uri", redirect_uri.to_string()),
            ("client_id", self.data.client_id.clone()),
            ("client_secret", self.data.secret().to_string()),
            ("code", code.to_string()),
            ("grant_type", "authorization_code".to_string()),
        ];
        if let Some(resource) = &self.data.protected_resource {
            form.push(("resource", resource.to_string()));
        }

        let credentials = STANDARD.encode(format!("{}:{}", self.data.client_id, self.data.secret()));
        let request = self
            .data
            .client
            .post(self.data.redeem_url.clone())
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .form(&form);
        let token = post_token_form(&self.data, request).await?;
        token.into_session()
    }

    async fn get_email_address(&self, session: &SessionState) -> Result<String, ProviderError> {
        let claims = self.verify(&session.access_token)?;
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Token("sub claim missing".to_string()))?;

        let (user, domain) = parse_subject(subject);
        match domain {
            Some(domain) => {
                let email = format!("{user}@{domain}");
                let groups = match self.fetch_groups(&session.access_token).await {
                    Ok(groups) => groups,
                    Err(e) => {
                        warn!(email = %email, "Failed to get groups: {e}");
                        Vec::new()
                    }
                };
                self.groups.insert(email.clone(), groups);
                Ok(email)
            }
            None => {
                let email = format!("{user}@{LOCAL_DOMAIN}");
                self.groups.insert(email.clone(), vec![LOCAL_DOMAIN.to_string()]);
                Ok(email)
            }
        }
    }

    async fn enrich_session(&self, session: &mut SessionState) -> Result<(), ProviderError> {
        let email = self.get_email_address(session).await?;
        if let Some((user, _)) = email.split_once('@') {
            session.user = user.to_string();
        }
        session.set_groups(self.groups.get(&email).unwrap_or_default());
        session.email = email;
        Ok(())
    }

    fn validate_request(
        &self,
        request: &Parts,
        session: Option<&SessionState>,
    ) -> Result<bool, ProviderError> {
        let session = session.ok_or(ProviderError::NoSession)?;

        let host = request_host(request);
        let host = host.split(':').next().unwrap_or(host);
        let uri = format!("{host}{}", request.uri.path());

        let allowed = self.table.allowed_groups(&uri);
        if allowed.iter().any(|g| g == ANY_GROUP) {
            return Ok(true);
        }

        let groups = self
            .groups
            .get(&session.email)
            .ok_or_else(|| ProviderError::UnknownUser(session.email.clone()))?;
        let permitted = groups.iter().any(|g| allowed.contains(g));
        if !permitted {
            debug!(email = %session.email, uri = %uri, "no allowed group");
        }
        Ok(permitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate_core::ErrorKind;
    use jsonwebtoken::{EncodingKey, Header};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;
    use url::Url;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn testdata(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("testdata/passport")
            .join(name)
    }

    fn config() -> PassportConfig {
        PassportConfig {
            public_key_file: testdata("passport.pub"),
            auth_file: testdata("auth.yml"),
        }
    }

    fn data(base: &Url) -> ProviderData {
        ProviderData::new(
            "client",
            "secret",
            base.join("/connect/authorize").unwrap(),
            base.join("/connect/token").unwrap(),
        )
        .unwrap()
        .with_profile_url(base.join("/connect/userinfo").unwrap())
    }

    fn sign(key_file: &str, claims: &Value) -> String {
        let pem = std::fs::read(testdata(key_file)).unwrap();
        let key = EncodingKey::from_rsa_pem(&pem).unwrap();
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
    }

    fn request(host: &str, path: &str) -> Parts {
        http::Request::builder()
            .uri(path)
            .header(HOST, host)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_new_defaults() {
        let base = Url::parse("https://passport.test.com").unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();
        let data = p.data();
        assert_eq!(data.name, "Passport");
        assert_eq!(data.scope, "profile email");
        assert_eq!(data.login_url.as_str(), "https://passport.test.com/connect/authorize");
        assert_eq!(data.redeem_url.as_str(), "https://passport.test.com/connect/token");
        assert_eq!(
            data.profile_url.as_ref().unwrap().as_str(),
            "https://passport.test.com/connect/userinfo"
        );
        assert!(data.validate_url.is_none());
        assert!(data.no_validate);
        assert_eq!(p.table().allowed_groups("test.com/anything"), ["*"]);
    }

    #[test]
    fn test_new_incomplete() {
        let base = Url::parse("https://passport.test.com").unwrap();

        let mut no_profile = data(&base);
        no_profile.profile_url = None;
        assert!(PassportProvider::new(no_profile, &config()).is_err());

        let empty = PassportConfig {
            public_key_file: PathBuf::new(),
            auth_file: PathBuf::new(),
        };
        let err = PassportProvider::new(data(&base), &empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let missing = PassportConfig {
            public_key_file: testdata("missing.pub"),
            auth_file: testdata("auth.yml"),
        };
        assert!(PassportProvider::new(data(&base), &missing).is_err());
    }

    #[test]
    fn test_parse_subject() {
        assert_eq!(parse_subject("DOMAIN\\User"), ("user".to_string(), Some("domain".to_string())));
        assert_eq!(parse_subject("user"), ("user".to_string(), None));
    }

    #[test]
    fn test_login_url() {
        let base = Url::parse("https://passport.test.com").unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();
        let url = p.get_login_url("https://app.test.com/cb", "state1", "ignored", &[]);
        let query = url.query().unwrap();
        assert!(query.contains("scope=profile+email"));
        assert!(query.contains("response_type=code"));
        assert!(query.contains("client_id=client"));
        assert!(query.contains("state=state1"));
        assert!(!query.contains("nonce"));
    }

    #[tokio::test]
    async fn test_redeem_uses_basic_auth() {
        let server = MockServer::start().await;
        let basic = format!("Basic {}", STANDARD.encode("client:secret"));
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .and(header("authorization", basic.as_str()))
            .and(header("accept", "application/json"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "id_token": "it",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();
        let session = p.redeem("https://app.test.com/cb", "code", None).await.unwrap();
        assert_eq!(session.access_token, "at");
        assert_eq!(session.id_token, "it");
        assert!(session.email.is_empty());
    }

    #[tokio::test]
    async fn test_redeem_wrong_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();
        let err = p.redeem("https://app.test.com/cb", "code", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(matches!(err, ProviderError::Upstream { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_email_with_domain_fetches_groups() {
        let server = MockServer::start().await;
        let token = sign("passport.key", &json!({"sub": "KONTUR\\JDoe"}));
        Mock::given(method("GET"))
            .and(path("/connect/userinfo"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"group": "devs,ops"})))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();
        let mut session = SessionState::with_tokens(token, "");
        p.enrich_session(&mut session).await.unwrap();

        assert_eq!(session.email, "jdoe@kontur");
        assert_eq!(session.user, "jdoe");
        assert_eq!(session.groups, vec!["devs", "ops"]);
        assert_eq!(
            p.group_cache().get("jdoe@kontur"),
            Some(vec!["devs".to_string(), "ops".to_string()])
        );
    }

    #[tokio::test]
    async fn test_email_without_domain_is_local() {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();

        let token = sign("passport.key", &json!({"sub": "Admin"}));
        let email = p
            .get_email_address(&SessionState::with_tokens(token, ""))
            .await
            .unwrap();
        assert_eq!(email, "admin@local");
        assert_eq!(p.group_cache().get("admin@local"), Some(vec!["local".to_string()]));
    }

    #[tokio::test]
    async fn test_group_array_and_failed_lookup() {
        let server = MockServer::start().await;
        let ok = sign("passport.key", &json!({"sub": "d\\a"}));
        let broken = sign("passport.key", &json!({"sub": "d\\b"}));
        Mock::given(method("GET"))
            .and(path("/connect/userinfo"))
            .and(header("authorization", format!("Bearer {ok}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"group": ["x", "y"]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/connect/userinfo"))
            .and(header("authorization", format!("Bearer {broken}").as_str()))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();

        p.get_email_address(&SessionState::with_tokens(ok, "")).await.unwrap();
        assert_eq!(p.group_cache().get("a@d"), Some(vec!["x".to_string(), "y".to_string()]));

        // lookup failure still records the user, with no groups
        let email = p.get_email_address(&SessionState::with_tokens(broken, "")).await.unwrap();
        assert_eq!(email, "b@d");
        assert_eq!(p.group_cache().get("b@d"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();
        let p = PassportProvider::new(data(&base), &config()).unwrap();

        let forged = sign("other.key", &json!({"sub": "d\\evil"}));
        let err = p
            .get_email_address(&SessionState::with_tokens(forged, ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TamperedOrExpired);
        assert!(p.group_cache().is_empty());

        let err = p
            .get_email_address(&SessionState::with_tokens("not-a-jwt", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Token(_)));
    }

    #[test]
    fn test_validate_request_acl() {
        let base = Url::parse("https://passport.test.com").unwrap();
        let table: AuthorizationTable = [
            ("test.com".to_string(), vec!["*".to_string()]),
            ("secure.com/admin".to_string(), vec!["admins".to_string()]),
        ]
        .into_iter()
        .collect();
        let mut p = PassportProvider::new(data(&base), &config()).unwrap();
        p.table = table;
        p.group_cache().insert("dev@corp", vec!["devs".to_string()]);
        p.group_cache().insert("boss@corp", vec!["admins".to_string()]);

        let mut dev = SessionState::with_tokens("at", "");
        dev.email = "dev@corp".to_string();
        let mut boss = SessionState::with_tokens("at", "");
        boss.email = "boss@corp".to_string();
        let mut stranger = SessionState::with_tokens("at", "");
        stranger.email = "who@corp".to_string();

        // "*" admits anyone, even without cached groups; port is ignored
        assert!(p.validate_request(&request("test.com:8443", "/x"), Some(&stranger)).unwrap());
        // unrelated host has no rule
        assert!(!p.validate_request(&request("other.com", "/x"), Some(&dev)).unwrap());

        assert!(p.validate_request(&request("secure.com", "/admin/panel"), Some(&boss)).unwrap());
        assert!(!p.validate_request(&request("secure.com", "/admin/panel"), Some(&dev)).unwrap());

        let err = p
            .validate_request(&request("secure.com", "/admin/panel"), Some(&stranger))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownUser);

        let err = p.validate_request(&request("test.com", "/"), None).unwrap_err();
        assert!(matches!(err, ProviderError::NoSession));
    }
}
