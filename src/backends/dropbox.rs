//! Dropbox backend
//!
//! Uses a long-lived refresh token (obtained once with the no-redirect OAuth flow)
//! to mint access tokens, and upload sessions for chunked uploads.

use super::{
    check_response, fill_chunk, http_client, ArtifactId, BackendError, ListedArtifact, Result,
    StorageBackend, TransferOptions,
};
use crate::config::{Credentials, Destination, DestinationKind};
use crate::utils::naming::{is_backup_archive, ArtifactName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Read;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";
const API_URL: &str = "https://api.dropboxapi.com/2";
const CONTENT_URL: &str = "https://content.dropboxapi.com/2";

/// Metadata of a stored file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_display: String,
    pub server_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
pub enum FolderEntry {
    File(FileEntry),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FolderPage {
    #[serde(default)]
    pub entries: Vec<FolderEntry>,
    #[serde(default)]
    pub cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

/// Dropbox HTTP operations used by the backend
#[cfg_attr(test, mockall::automock)]
pub trait DropboxApi {
    fn authenticate(&mut self) -> Result<()>;

    fn current_account(&mut self) -> Result<String>;

    /// Single request upload
    fn upload(&mut self, path: &str, content: &[u8]) -> Result<FileEntry>;

    /// Open a session with the first chunk and return the session id
    fn upload_session_start(&mut self, chunk: &[u8]) -> Result<String>;

    fn upload_session_append(&mut self, session_id: &str, offset: u64, chunk: &[u8]) -> Result<()>;

    /// Send the final chunk and commit the file at `path`
    fn upload_session_finish(
        &mut self,
        session_id: &str,
        offset: u64,
        chunk: &[u8],
        path: &str,
    ) -> Result<FileEntry>;

    fn list_folder(&mut self, path: &str) -> Result<FolderPage>;

    fn list_folder_continue(&mut self, cursor: &str) -> Result<FolderPage>;

    fn delete(&mut self, path: &str) -> Result<()>;
}

/// Dropbox REST client using app key, app secret and refresh token
pub struct DropboxHttpClient {
    app_key: String,
    app_secret: String,
    refresh_token: String,
    client: reqwest::blocking::Client,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionStart {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    account_id: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Serialize)]
struct Cursor<'a> {
    session_id: &'a str,
    offset: u64,
}

impl DropboxHttpClient {
    pub fn new(app_key: &str, app_secret: &str, refresh_token: &str) -> Result<Self> {
        Ok(Self {
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            client: http_client()?,
            access_token: None,
        })
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| BackendError::Auth("Not authenticated with Dropbox".to_string()))
    }

    /// POST to an RPC endpoint with a JSON body
    fn rpc(&self, endpoint: &str, body: serde_json::Value) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(format!("{}/{}", API_URL, endpoint))
            .bearer_auth(self.token()?)
            .json(&body)
            .send()?;
        check_response(response, &format!("Dropbox {} failed", endpoint))
    }

    /// POST to a content endpoint with the arguments in the `Dropbox-API-Arg` header
    fn content(
        &self,
        endpoint: &str,
        arg: serde_json::Value,
        data: &[u8],
    ) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(format!("{}/{}", CONTENT_URL, endpoint))
            .bearer_auth(self.token()?)
            .header("Dropbox-API-Arg", arg.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec())
            .send()?;
        check_response(response, &format!("Dropbox {} failed", endpoint))
    }
}

fn commit_info(path: &str) -> serde_json::Value {
    json!({ "path": path, "mode": "add", "autorename": false, "mute": true })
}

impl DropboxApi for DropboxHttpClient {
    fn authenticate(&mut self) -> Result<()> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.app_key.as_str()),
                ("client_secret", self.app_secret.as_str()),
            ])
            .send()?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Auth(format!(
                "Dropbox rejected the app credentials (HTTP {}): {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = check_response(response, "Dropbox token request failed")?.json()?;
        self.access_token = Some(token.access_token);
        Ok(())
    }

    fn current_account(&mut self) -> Result<String> {
        let account: Account = self
            .rpc("users/get_current_account", serde_json::Value::Null)?
            .json()?;
        let short_id: String = account.account_id.chars().take(8).collect();
        if account.email.is_empty() {
            Ok(format!("{}...", short_id))
        } else {
            Ok(format!("{}... ({})", short_id, account.email))
        }
    }

    fn upload(&mut self, path: &str, content: &[u8]) -> Result<FileEntry> {
        Ok(self.content("files/upload", commit_info(path), content)?.json()?)
    }

    fn upload_session_start(&mut self, chunk: &[u8]) -> Result<String> {
        let start: SessionStart = self
            .content("files/upload_session/start", json!({ "close": false }), chunk)?
            .json()?;
        Ok(start.session_id)
    }

    fn upload_session_append(&mut self, session_id: &str, offset: u64, chunk: &[u8]) -> Result<()> {
        let arg = json!({ "cursor": Cursor { session_id, offset }, "close": false });
        self.content("files/upload_session/append_v2", arg, chunk)?;
        Ok(())
    }

    fn upload_session_finish(
        &mut self,
        session_id: &str,
        offset: u64,
        chunk: &[u8],
        path: &str,
    ) -> Result<FileEntry> {
        let arg = json!({ "cursor": Cursor { session_id, offset }, "commit": commit_info(path) });
        Ok(self
            .content("files/upload_session/finish", arg, chunk)?
            .json()?)
    }

    fn list_folder(&mut self, path: &str) -> Result<FolderPage> {
        Ok(self
            .rpc("files/list_folder", json!({ "path": path, "recursive": false }))?
            .json()?)
    }

    fn list_folder_continue(&mut self, cursor: &str) -> Result<FolderPage> {
        Ok(self
            .rpc("files/list_folder/continue", json!({ "cursor": cursor }))?
            .json()?)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        self.rpc("files/delete_v2", json!({ "path": path }))?;
        Ok(())
    }
}

/// URL the operator opens to authorise the app and get an access code
pub fn authorize_url(app_key: &str) -> String {
    format!(
        "{}?client_id={}&response_type=code&token_access_type=offline",
        AUTHORIZE_URL, app_key
    )
}

/// Exchange an access code for a long-lived refresh token
pub fn exchange_access_code(app_key: &str, app_secret: &str, code: &str) -> Result<String> {
    let client = http_client()?;
    let response = client
        .post(TOKEN_URL)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("client_id", app_key),
            ("client_secret", app_secret),
        ])
        .send()?;
    let token: TokenResponse = check_response(response, "Dropbox code exchange failed")?.json()?;
    token.refresh_token.ok_or_else(|| {
        BackendError::Auth("Dropbox did not return a refresh token".to_string())
    })
}

/// Dropbox folder path: leading slash, no trailing slash, root is ""
pub fn normalize_folder(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Uploads artifacts into a Dropbox folder
pub struct DropboxBackend<A: DropboxApi = DropboxHttpClient> {
    api: A,
    folder: String,
    chunk_size: usize,
}

impl DropboxBackend<DropboxHttpClient> {
    pub fn from_destination(destination: &Destination, options: TransferOptions) -> Result<Self> {
        let Credentials::Dropbox {
            app_key,
            app_secret,
            app_token,
        } = &destination.credentials
        else {
            return Err(BackendError::Config(
                "Destination is not a Dropbox folder".to_string(),
            ));
        };

        let field = |value: &Option<String>, label: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BackendError::Config(format!("Dropbox {} is not set", label)))
        };
        let client = DropboxHttpClient::new(
            &field(app_key, "app key")?,
            &field(app_secret, "app secret")?,
            &field(app_token, "app token")?,
        )?;

        Ok(Self::with_api(client, &destination.path, options))
    }
}

impl<A: DropboxApi> DropboxBackend<A> {
    pub fn with_api(api: A, folder: &str, options: TransferOptions) -> Self {
        Self {
            api,
            folder: normalize_folder(folder),
            chunk_size: options.chunk_size,
        }
    }

    /// Session upload: the first chunk opens the session, full chunks are appended
    /// while more data follows, and the final (possibly short or empty) chunk commits.
    fn upload_chunked(&mut self, content: &mut dyn Read, path: &str) -> Result<FileEntry> {
        let first = fill_chunk(content, self.chunk_size)?;
        let session_id = self.api.upload_session_start(&first)?;
        let mut offset = first.len() as u64;
        debug!("Dropbox upload session {} started", session_id);

        let mut current = if first.len() < self.chunk_size {
            Vec::new()
        } else {
            fill_chunk(content, self.chunk_size)?
        };

        loop {
            if current.len() < self.chunk_size {
                return self
                    .api
                    .upload_session_finish(&session_id, offset, &current, path);
            }

            let next = fill_chunk(content, self.chunk_size)?;
            if next.is_empty() {
                return self
                    .api
                    .upload_session_finish(&session_id, offset, &current, path);
            }

            self.api
                .upload_session_append(&session_id, offset, &current)?;
            offset += current.len() as u64;
            debug!("Dropbox upload progress: {} bytes", offset);
            current = next;
        }
    }
}

impl<A: DropboxApi> StorageBackend for DropboxBackend<A> {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Dropbox
    }

    fn connect(&mut self) -> Result<()> {
        self.api.authenticate()
    }

    fn upload(&mut self, content: &mut dyn Read, name: &ArtifactName) -> Result<ArtifactId> {
        let path = format!("{}/{}", self.folder, name.file_name());

        let entry = if self.chunk_size == 0 {
            let mut buffer = Vec::new();
            content.read_to_end(&mut buffer)?;
            self.api.upload(&path, &buffer)?
        } else {
            self.upload_chunked(content, &path)?
        };

        info!("Uploaded {} to Dropbox (file id {})", path, entry.id);
        Ok(ArtifactId::new(entry.id))
    }

    fn list(&mut self) -> Result<Vec<ListedArtifact>> {
        let mut page = self.api.list_folder(&self.folder)?;
        let mut files = Vec::new();

        loop {
            files.extend(page.entries.into_iter().filter_map(|entry| match entry {
                FolderEntry::File(file) => Some(file),
                FolderEntry::Other => None,
            }));
            if !page.has_more {
                break;
            }
            page = self.api.list_folder_continue(&page.cursor)?;
        }

        Ok(files
            .into_iter()
            .filter(|file| is_backup_archive(&file.name))
            .map(|file| {
                let location = if file.path_display.is_empty() {
                    format!("{}/{}", self.folder, file.name)
                } else {
                    file.path_display
                };
                ListedArtifact {
                    id: ArtifactId::new(file.id),
                    location,
                    name: file.name,
                    timestamp: file.server_modified,
                }
            })
            .collect())
    }

    fn delete(&mut self, entry: &ListedArtifact) -> Result<()> {
        self.api.delete(&entry.location)?;
        info!("Deleted old backup: {}", entry.name);
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn probe(&mut self) -> Result<String> {
        let account = self.api.current_account()?;
        Ok(format!("Dropbox account {}", account))
    }
}
