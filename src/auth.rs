use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::{Deserialize, Serialize};

/// 認証済みのユーザー。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// ユーザーの識別子。メールアドレスを用いる。
    pub id: String,
    pub display_name: String,
}

/// メールアドレスとパスワードでユーザーを認証するためのtrait。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// ユーザーを認証する。
    ///
    /// 認証情報が一致しない場合は`None`を返し、認証先との通信に失敗した場合はエラーを返す。
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>>;
}

/// メモリ上に保持する認証情報。
#[derive(Clone, Debug)]
pub struct Credential {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl Credential {
    pub fn new(email: &str, password: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        }
    }
}

/// メモリ上の認証情報の一覧でユーザーを認証する。
pub struct InMemoryAuthenticator {
    credentials: Vec<Credential>,
}

impl InMemoryAuthenticator {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }
}

impl Default for InMemoryAuthenticator {
    /// デモ用のユーザーを持つ`InMemoryAuthenticator`を返す。
    fn default() -> Self {
        Self::new(vec![
            Credential::new("user1@example.com", "password1", "User One"),
            Credential::new("user2@example.com", "password2", "User Two"),
        ])
    }
}

#[async_trait]
impl Authenticator for InMemoryAuthenticator {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let user = self
            .credentials
            .iter()
            .find(|credential| credential.email == email && credential.password == password)
            .map(|credential| User {
                id: credential.email.clone(),
                display_name: credential.name.clone(),
            });

        Ok(user)
    }
}

/// ログインAPIへのリクエスト。
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// ログインAPIのレスポンスをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct LoginResponse {
    email: String,
    name: String,
}

/// バックエンドのログインAPIでユーザーを認証する。
///
/// # Examples
///
/// ```
/// let authenticator = HttpAuthenticator::new("http://localhost:3000");
/// let user = authenticator.authenticate("user1@example.com", "password1").await?;
/// ```
pub struct HttpAuthenticator {
    client: Client,
    api_url: String,
}

impl HttpAuthenticator {
    /// 新しい`HttpAuthenticator`を返す。
    ///
    /// # Arguments
    ///
    /// * `base_url` - バックエンドのURL。末尾の`/`は取り除く。
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let url = format!("{}/api/login", self.api_url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&LoginRequest { email, password })
            .send()
            .await
            .with_context(|| format!("Failed to send login request to {}", url))?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!("Login rejected for {}", email);
            return Ok(None);
        }

        let login = response
            .error_for_status()
            .context("Login request returned an error status")?
            .json::<LoginResponse>()
            .await
            .context("Failed to deserialize login response")?;
        info!("Logged in via backend: {}", login.email);

        Ok(Some(User {
            id: login.email,
            display_name: login.name,
        }))
    }
}

/// 設定に応じて選択される認証方式。
pub enum AuthProvider {
    InMemory(InMemoryAuthenticator),
    Http(HttpAuthenticator),
}

impl AuthProvider {
    /// URLが指定されている場合はバックエンドで、それ以外はデモ用ユーザーで認証する。
    /// 空白だけのURLは未指定として扱う。
    pub fn from_url(url: Option<&str>) -> Self {
        match url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => AuthProvider::Http(HttpAuthenticator::new(url)),
            None => AuthProvider::InMemory(InMemoryAuthenticator::default()),
        }
    }
}

#[async_trait]
impl Authenticator for AuthProvider {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        match self {
            AuthProvider::InMemory(inner) => inner.authenticate(email, password).await,
            AuthProvider::Http(inner) => inner.authenticate(email, password).await,
        }
    }
}
