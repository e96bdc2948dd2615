/*!
 * Presentation sources.
 *
 * `LocalPresentation` reads slides and narration that already sit in the
 * project. `GoogleSlidesSource` downloads one PNG thumbnail per slide from the
 * Google Slides API and takes each slide's speaker notes as its narration.
 *
 * Google access goes through an OAuth token kept in a `CredentialStore`.
 * A stored token is used while it is valid, refreshed with its refresh token
 * once it expires, and written back after every refresh.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backends::{FetchedPresentation, PresentationSource};
use crate::file_utils::FileManager;
use crate::narration;

const SLIDES_API: &str = "https://slides.googleapis.com/v1";
const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str = "https://www.googleapis.com/auth/presentations.readonly";
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Timeout for downloading one slide image
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;

static SLIDE_FILE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^slide_\d+\.png$").unwrap());

/// File name of the slide image for a 0-based ordinal
pub fn slide_file_name(ordinal: usize) -> String {
    format!("slide_{}.png", ordinal + 1)
}

/// Slides and narration already present in the project directory
#[derive(Debug, Clone)]
pub struct LocalPresentation {
    texts_path: PathBuf,
}

impl LocalPresentation {
    pub fn new(texts_path: impl Into<PathBuf>) -> Self {
        Self { texts_path: texts_path.into() }
    }
}

#[async_trait]
impl PresentationSource for LocalPresentation {
    async fn fetch(&self, _presentation_id: &str, slides_dir: &Path) -> Result<FetchedPresentation> {
        let slides = FileManager::find_numbered_files(slides_dir, "png")?;
        let content = FileManager::read_to_string(&self.texts_path)?;
        Ok(FetchedPresentation {
            slides,
            notes: narration::parse_texts(&content),
        })
    }
}

/// OAuth client registration, as downloaded from the Google console
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
}

fn default_token_uri() -> String {
    TOKEN_ENDPOINT.to_string()
}

fn default_auth_uri() -> String {
    AUTH_ENDPOINT.to_string()
}

#[derive(Deserialize)]
struct ClientFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

impl OAuthClient {
    /// Parse a client file with an `installed` or `web` section
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientFile = serde_json::from_str(json).context("Failed to parse OAuth client file")?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow!("OAuth client file has neither an 'installed' nor a 'web' section"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_json(&FileManager::read_to_string(path)?)
    }

    /// URL the user visits to grant access
    pub fn authorization_url(&self) -> Result<Url> {
        Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .context("Invalid OAuth authorization endpoint")
    }
}

/// Stored OAuth token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp after which the access token is rejected
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// Usable at `now` (Unix seconds), with a safety margin
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.access_token.is_empty()
            && self.expires_at.is_none_or(|expiry| now + EXPIRY_MARGIN_SECS < expiry)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(chrono::Utc::now().timestamp())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    /// Google omits the refresh token on refresh; keep the previous one then
    fn into_token(self, previous_refresh: Option<String>) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self.expires_in.map(|secs| chrono::Utc::now().timestamp() + secs),
            token_type: self.token_type.unwrap_or_else(default_token_type),
        }
    }
}

/// Persists OAuth tokens between runs
pub trait CredentialStore: Send + Sync {
    /// The stored token, or `None` when nothing has been saved yet
    fn load(&self) -> Result<Option<OAuthToken>>;

    fn save(&self, token: &OAuthToken) -> Result<()>;
}

/// Keeps the token as JSON in a file readable only by the current user
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/slidecast/google-token.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("slidecast").join("google-token.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<OAuthToken>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .with_context(|| format!("Failed to parse token file: {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read token file: {:?}", self.path)),
        }
    }

    fn save(&self, token: &OAuthToken) -> Result<()> {
        let json = serde_json::to_vec_pretty(token).context("Failed to serialize OAuth token")?;
        FileManager::write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write token file: {:?}", self.path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict token file: {:?}", self.path))?;
        }
        Ok(())
    }
}

/// Hands out valid access tokens, refreshing through the token endpoint
pub struct GoogleAuthorizer {
    client: OAuthClient,
    store: Arc<dyn CredentialStore>,
    http: Client,
}

impl GoogleAuthorizer {
    pub fn new(client: OAuthClient, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            client,
            store,
            http: Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn oauth_client(&self) -> &OAuthClient {
        &self.client
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http
            .post(&self.client.token_uri)
            .form(params)
            .send()
            .await
            .context("Failed to reach the OAuth token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OAuth token endpoint returned {}: {}", status, body));
        }
        response.json().await.context("Failed to parse OAuth token response")
    }

    /// Trade a refresh token for a new access token and store it
    pub async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token.refresh_token.as_deref()
            .ok_or_else(|| anyhow!("Stored OAuth token has no refresh token"))?;

        let response = self.token_request(&[
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await?;

        let refreshed = response.into_token(token.refresh_token.clone());
        self.store.save(&refreshed)?;
        debug!("Refreshed Google OAuth token");
        Ok(refreshed)
    }

    /// Trade an authorization code typed in by the user for a token and store it
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken> {
        let response = self.token_request(&[
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
            ("code", code.trim()),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ])
        .await?;

        let token = response.into_token(None);
        self.store.save(&token)?;
        info!("Google authorization saved");
        Ok(token)
    }

    /// Whether a usable or refreshable token is stored
    pub fn has_stored_token(&self) -> Result<bool> {
        Ok(self.store.load()?.is_some_and(|t| t.is_valid() || t.refresh_token.is_some()))
    }

    /// A valid access token, refreshing the stored one if it expired
    pub async fn access_token(&self) -> Result<String> {
        let token = self.store.load()?
            .ok_or_else(|| anyhow!("No Google authorization stored; authorize first"))?;

        if token.is_valid() {
            debug!("Using cached OAuth token");
            return Ok(token.access_token);
        }
        Ok(self.refresh(&token).await?.access_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Presentation {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    slides: Vec<Page>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    object_id: String,
    #[serde(default)]
    slide_properties: Option<SlideProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlideProperties {
    #[serde(default)]
    notes_page: Option<NotesPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotesPage {
    #[serde(default)]
    page_elements: Vec<PageElement>,
}

#[derive(Debug, Deserialize)]
struct PageElement {
    #[serde(default)]
    shape: Option<Shape>,
}

#[derive(Debug, Deserialize)]
struct Shape {
    #[serde(default)]
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextContent {
    #[serde(default)]
    text_elements: Vec<TextElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextElement {
    #[serde(default)]
    text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Thumbnail {
    content_url: String,
}

impl Page {
    /// All text runs of the notes page, in document order
    fn speaker_notes(&self) -> String {
        let Some(notes_page) = self.slide_properties.as_ref().and_then(|p| p.notes_page.as_ref()) else {
            return String::new();
        };

        notes_page
            .page_elements
            .iter()
            .filter_map(|element| element.shape.as_ref()?.text.as_ref())
            .flat_map(|text| text.text_elements.iter())
            .filter_map(|element| element.text_run.as_ref())
            .map(|run| run.content.as_str())
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Downloads slides and speaker notes from Google Slides
pub struct GoogleSlidesSource {
    authorizer: Arc<GoogleAuthorizer>,
    http: Client,
    api_base: String,
}

impl GoogleSlidesSource {
    pub fn new(authorizer: Arc<GoogleAuthorizer>) -> Self {
        Self {
            authorizer,
            http: Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: SLIDES_API.to_string(),
        }
    }

    /// Point at another API base, e.g. a local stub
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, token: &str) -> Result<T> {
        let response = self.http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Google Slides API returned {} for {}: {}", status, url, body));
        }
        response.json().await.with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn download(&self, url: &str, output: &Path) -> Result<()> {
        let response = self.http
            .get(url)
            .send()
            .await
            .context("Failed to download slide image")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Failed to download slide image: status {}", status));
        }
        let bytes = response.bytes().await.context("Failed to read slide image")?;
        FileManager::write_atomic(output, &bytes)
            .with_context(|| format!("Failed to write slide image: {:?}", output))
    }
}

/// Remove `slide_<n>.png` files left by an earlier, longer presentation
fn clear_slide_images(slides_dir: &Path) -> Result<()> {
    for path in FileManager::find_numbered_files(slides_dir, "png")? {
        let is_slide = path.file_name()
            .is_some_and(|name| SLIDE_FILE_REGEX.is_match(&name.to_string_lossy()));
        if is_slide {
            std::fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
        }
    }
    Ok(())
}

#[async_trait]
impl PresentationSource for GoogleSlidesSource {
    async fn fetch(&self, presentation_id: &str, slides_dir: &Path) -> Result<FetchedPresentation> {
        let token = self.authorizer.access_token().await?;
        let presentation: Presentation = self
            .get_json(&format!("{}/presentations/{}", self.api_base, presentation_id), &token)
            .await
            .context("Failed to get presentation")?;

        info!(
            "Fetched presentation '{}' with {} slide(s)",
            presentation.title.as_deref().unwrap_or(presentation_id),
            presentation.slides.len()
        );

        FileManager::ensure_dir(slides_dir)?;
        clear_slide_images(slides_dir)?;

        let mut slides = Vec::with_capacity(presentation.slides.len());
        let mut notes = Vec::with_capacity(presentation.slides.len());
        for (index, page) in presentation.slides.iter().enumerate() {
            let thumbnail: Thumbnail = self
                .get_json(
                    &format!(
                        "{}/presentations/{}/pages/{}/thumbnail",
                        self.api_base, presentation_id, page.object_id
                    ),
                    &token,
                )
                .await
                .with_context(|| format!("Failed to get thumbnail for slide {}", index + 1))?;

            let slide_path = slides_dir.join(slide_file_name(index));
            self.download(&thumbnail.content_url, &slide_path)
                .await
                .with_context(|| format!("Failed to download slide {}", index + 1))?;

            let note = page.speaker_notes();
            if note.is_empty() {
                warn!("Slide {} has no speaker notes", index + 1);
            }
            debug!("Processed slide {} ({} note char(s))", index + 1, note.len());

            slides.push(slide_path);
            notes.push(note);
        }

        Ok(FetchedPresentation { slides, notes })
    }
}
