//! Google Drive backend
//!
//! Authenticates with a service account (RS256 JWT exchanged for a bearer token)
//! and uploads through a resumable upload session, one chunk at a time.

use super::{
    check_response, fill_chunk, http_client, ArtifactId, BackendError, ListedArtifact, Result,
    StorageBackend, TransferOptions,
};
use crate::config::{Credentials, Destination, DestinationKind, DriveCredentialsType};
use crate::utils::naming::{is_backup_archive, ArtifactExtension, ArtifactName};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use tracing::{debug, info};

const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const ABOUT_URL: &str = "https://www.googleapis.com/drive/v3/about";

/// Google service account key (the JSON downloaded from the cloud console)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Parse a key given as raw JSON or as base64 encoded JSON
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim();
        if let Ok(key) = serde_json::from_str(content) {
            return Ok(key);
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|_| invalid_key_format())?;
        serde_json::from_slice(&decoded).map_err(|_| invalid_key_format())
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let Credentials::Drive {
            credentials_type,
            credentials_file,
            credentials_input,
        } = credentials
        else {
            return Err(BackendError::Config(
                "Destination is not a Google Drive folder".to_string(),
            ));
        };

        match credentials_type {
            Some(DriveCredentialsType::File) => {
                let path = credentials_file.as_ref().ok_or_else(|| {
                    BackendError::Config("Drive credentials file is not set".to_string())
                })?;
                let path = crate::config::expand_tilde(path);
                let content = fs::read_to_string(&path).map_err(|e| {
                    BackendError::Config(format!(
                        "Failed to read Drive credentials file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::parse(&content)
            }
            Some(DriveCredentialsType::Text) => {
                let content = credentials_input.as_deref().ok_or_else(|| {
                    BackendError::Config("Drive credentials input is not set".to_string())
                })?;
                serde_json::from_str(content).map_err(|_| invalid_key_format())
            }
            None => Err(BackendError::Config(
                "Drive credentials type is not set".to_string(),
            )),
        }
    }
}

fn invalid_key_format() -> BackendError {
    BackendError::Config(
        "Incorrect credentials format. The credentials must be a valid service account JSON"
            .to_string(),
    )
}

/// Metadata sent when opening an upload session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub parents: Vec<String>,
    pub description: String,
    pub mime_type: String,
    pub created_time: String,
    pub modified_time: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub created_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Server answer to one chunk of a resumable upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    /// `308 Resume Incomplete`; the server holds bytes `0..persisted`
    Incomplete { persisted: u64 },
    /// The file was created with this id
    Complete(String),
}

/// Drive REST operations used by the backend
#[cfg_attr(test, mockall::automock)]
pub trait DriveApi {
    fn authenticate(&mut self) -> Result<()>;

    /// Display name of the authenticated account
    fn about(&mut self) -> Result<String>;

    /// Open a resumable upload session and return its URI
    fn start_upload(&mut self, metadata: &FileMetadata) -> Result<String>;

    /// Send bytes `offset..offset + chunk.len()`. `total` is set on the last chunk only,
    /// and the server returns the new file id once it has received everything.
    fn upload_chunk(
        &mut self,
        session_uri: &str,
        chunk: &[u8],
        offset: u64,
        total: Option<u64>,
    ) -> Result<ChunkStatus>;

    fn list_files(&mut self, folder_id: &str, page_token: Option<String>) -> Result<FilePage>;

    fn delete_file(&mut self, file_id: &str) -> Result<()>;
}

/// Drive REST client authenticated with a service account
pub struct DriveHttpClient {
    key: ServiceAccountKey,
    client: reqwest::blocking::Client,
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    user: AboutUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveHttpClient {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        Ok(Self {
            key,
            client: http_client()?,
            access_token: None,
        })
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| BackendError::Auth("Not authenticated with Google Drive".to_string()))
    }

    fn signed_assertion(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &self.key.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes()).map_err(|e| {
            BackendError::Config(format!("Invalid service account private key: {}", e))
        })?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| BackendError::Config(format!("Failed to sign token request: {}", e)))
    }
}

impl DriveApi for DriveHttpClient {
    fn authenticate(&mut self) -> Result<()> {
        let assertion = self.signed_assertion()?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Auth(format!(
                "Google rejected the service account (HTTP {}): {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = check_response(response, "Token request failed")?.json()?;
        self.access_token = Some(token.access_token);
        debug!("Authenticated as {}", self.key.client_email);
        Ok(())
    }

    fn about(&mut self) -> Result<String> {
        let response = self
            .client
            .get(ABOUT_URL)
            .bearer_auth(self.token()?)
            .query(&[("fields", "user")])
            .send()?;
        let about: AboutResponse = check_response(response, "Drive about request failed")?.json()?;

        if about.user.display_name.is_empty() {
            Ok(about.user.email_address)
        } else {
            Ok(about.user.display_name)
        }
    }

    fn start_upload(&mut self, metadata: &FileMetadata) -> Result<String> {
        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(self.token()?)
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", "id"),
            ])
            .header("X-Upload-Content-Type", metadata.mime_type.as_str())
            .json(metadata)
            .send()?;
        let response = check_response(response, "Failed to open Drive upload session")?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                BackendError::Transfer("Drive did not return an upload session URI".to_string())
            })
    }

    fn upload_chunk(
        &mut self,
        session_uri: &str,
        chunk: &[u8],
        offset: u64,
        total: Option<u64>,
    ) -> Result<ChunkStatus> {
        let total_label = total.map(|t| t.to_string()).unwrap_or_else(|| "*".to_string());
        let range = if chunk.is_empty() {
            format!("bytes */{}", total_label)
        } else {
            format!(
                "bytes {}-{}/{}",
                offset,
                offset + chunk.len() as u64 - 1,
                total_label
            )
        };

        let response = self
            .client
            .put(session_uri)
            .bearer_auth(self.token()?)
            .header(reqwest::header::CONTENT_RANGE, range)
            .body(chunk.to_vec())
            .send()?;

        // 308 Resume Incomplete
        if response.status().as_u16() == 308 {
            let range = response
                .headers()
                .get(reqwest::header::RANGE)
                .and_then(|value| value.to_str().ok());
            return Ok(ChunkStatus::Incomplete {
                persisted: persisted_bytes(range),
            });
        }

        let created: CreatedFile = check_response(response, "Drive chunk upload failed")?.json()?;
        Ok(ChunkStatus::Complete(created.id))
    }

    fn list_files(&mut self, folder_id: &str, page_token: Option<String>) -> Result<FilePage> {
        let query = format!(
            "'{}' in parents and mimeType='{}' and trashed=false",
            folder_id,
            ArtifactExtension::Zip.mime_type()
        );

        let mut request = self
            .client
            .get(FILES_URL)
            .bearer_auth(self.token()?)
            .query(&[
                ("q", query.as_str()),
                ("fields", "nextPageToken, files(id, name, createdTime)"),
                ("pageSize", "1000"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send()?;
        Ok(check_response(response, "Failed to list Drive folder")?.json()?)
    }

    fn delete_file(&mut self, file_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/{}", FILES_URL, file_id))
            .bearer_auth(self.token()?)
            .query(&[("supportsAllDrives", "true")])
            .send()?;
        check_response(response, "Failed to delete Drive file")?;
        Ok(())
    }
}

/// Uploads artifacts into a Drive folder
pub struct DriveBackend<A: DriveApi = DriveHttpClient> {
    api: A,
    folder_id: String,
    chunk_size: usize,
}

impl DriveBackend<DriveHttpClient> {
    pub fn from_destination(destination: &Destination, options: TransferOptions) -> Result<Self> {
        let key = ServiceAccountKey::from_credentials(&destination.credentials)?;
        let folder_id = destination.path.trim().trim_end_matches('/');
        if folder_id.is_empty() {
            return Err(BackendError::Config(
                "Drive parent folder id is not set".to_string(),
            ));
        }
        Ok(Self::with_api(DriveHttpClient::new(key)?, folder_id, options))
    }
}

impl<A: DriveApi> DriveBackend<A> {
    pub fn with_api(api: A, folder_id: &str, options: TransferOptions) -> Self {
        Self {
            api,
            folder_id: folder_id.to_string(),
            chunk_size: options.chunk_size,
        }
    }

    fn metadata(&self, name: &ArtifactName) -> FileMetadata {
        let stamp = name
            .captured_at()
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        FileMetadata {
            name: name.file_name(),
            parents: vec![self.folder_id.clone()],
            description: "Uploaded by autobackup".to_string(),
            mime_type: name.extension().mime_type().to_string(),
            created_time: stamp.clone(),
            modified_time: stamp,
        }
    }
}

/// Bytes the server holds according to the `Range` header of a 308 answer
///
/// `bytes=0-N` means `N + 1` bytes; no header means nothing was stored yet.
fn persisted_bytes(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.trim().strip_prefix("bytes="))
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.trim().parse::<u64>().ok())
        .map_or(0, |end| end + 1)
}

impl<A: DriveApi> StorageBackend for DriveBackend<A> {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Drive
    }

    fn connect(&mut self) -> Result<()> {
        self.api.authenticate()
    }

    fn upload(&mut self, content: &mut dyn Read, name: &ArtifactName) -> Result<ArtifactId> {
        let metadata = self.metadata(name);
        let session = self.api.start_upload(&metadata)?;

        let file_id = if self.chunk_size == 0 {
            let mut buffer = Vec::new();
            content.read_to_end(&mut buffer)?;
            let total = buffer.len() as u64;
            match self.api.upload_chunk(&session, &buffer, 0, Some(total))? {
                ChunkStatus::Complete(id) => Some(id),
                ChunkStatus::Incomplete { .. } => None,
            }
        } else {
            let mut offset = 0u64;
            let mut current = fill_chunk(content, self.chunk_size)?;
            loop {
                let next = if current.len() < self.chunk_size {
                    Vec::new()
                } else {
                    fill_chunk(content, self.chunk_size)?
                };
                let last = next.is_empty();
                let total = last.then_some(offset + current.len() as u64);

                let status = self.api.upload_chunk(&session, &current, offset, total)?;
                offset += current.len() as u64;

                match status {
                    ChunkStatus::Complete(id) if last => break Some(id),
                    ChunkStatus::Complete(_) => {
                        return Err(BackendError::Transfer(format!(
                            "Drive closed the upload session after {} bytes, before the last chunk",
                            offset
                        )));
                    }
                    ChunkStatus::Incomplete { .. } if last => break None,
                    ChunkStatus::Incomplete { persisted } if persisted != offset => {
                        return Err(BackendError::Transfer(format!(
                            "Drive stored {} of the {} bytes sent",
                            persisted, offset
                        )));
                    }
                    ChunkStatus::Incomplete { .. } => {}
                }
                debug!("Drive upload progress: {} bytes", offset);
                current = next;
            }
        };

        let file_id = file_id.ok_or_else(|| {
            BackendError::Transfer("Drive upload finished without returning a file id".to_string())
        })?;
        info!("Uploaded {} to Drive (file id {})", name, file_id);
        Ok(ArtifactId::new(file_id))
    }

    fn list(&mut self) -> Result<Vec<ListedArtifact>> {
        let mut listing = Vec::new();
        let mut page_token = None;

        loop {
            let page = self.api.list_files(&self.folder_id, page_token)?;
            listing.extend(
                page.files
                    .into_iter()
                    .filter(|file| is_backup_archive(&file.name))
                    .map(|file| ListedArtifact {
                        id: ArtifactId::new(file.id.clone()),
                        location: file.id,
                        name: file.name,
                        timestamp: file.created_time,
                    }),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(listing)
    }

    fn delete(&mut self, entry: &ListedArtifact) -> Result<()> {
        self.api.delete_file(&entry.location)?;
        info!("Deleted old backup: {}", entry.name);
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn probe(&mut self) -> Result<String> {
        let account = self.api.about()?;
        Ok(format!("Google Drive account {}", account))
    }
}
