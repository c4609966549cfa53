use std::{io::ErrorKind, path::PathBuf};

use uuid::Uuid;

use crate::{AppResult, Rejection};

/// URL prefix the store is served under.
pub const PUBLIC_PREFIX: &str = "/avatars";

const EXTENSIONS: [(&str, &str); 4] = [
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Object store for profile pictures, one directory per user.
#[derive(Debug, Clone)]
pub struct AvatarStore {
    root: PathBuf,
}

impl AvatarStore {
    pub fn new(root: impl Into<PathBuf>) -> AvatarStore {
        AvatarStore { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Upserts `{user_id}/avatar.{ext}` and returns its public URL.
    pub async fn put(&self, user_id: Uuid, content_type: &str, bytes: &[u8]) -> AppResult<String> {
        let content_type = content_type.split(';').next().unwrap_or_default().trim();
        let Some((_, ext)) = EXTENSIONS.iter().find(|(mime, _)| *mime == content_type) else {
            return Err(Rejection::Invalid(format!("unsupported image type {content_type:?}")))?;
        };
        if bytes.is_empty() {
            return Err(Rejection::MissingField("image"))?;
        }

        let dir = self.root.join(user_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        for (_, old) in EXTENSIONS.iter().filter(|(_, x)| x != ext) {
            match tokio::fs::remove_file(dir.join(format!("avatar.{old}"))).await {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e)?,
                _ => {}
            }
        }

        tokio::fs::write(dir.join(format!("avatar.{ext}")), bytes).await?;
        Ok(format!("{PUBLIC_PREFIX}/{user_id}/avatar.{ext}"))
    }
}
