use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user's profile as returned by the backend.
///
/// Fields the sync layer does not interpret (experiences, educations, ...)
/// are kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_thumbnail_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProfileRecord {
    /// Shallow merge: every field present in `patch` replaces the current one.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        set(&mut self.full_name, &patch.full_name);
        set(&mut self.headline, &patch.headline);
        set(&mut self.summary, &patch.summary);
        set(&mut self.about, &patch.about);
        set(&mut self.location, &patch.location);
        set(&mut self.email, &patch.email);
        set(&mut self.profile_image_url, &patch.profile_image_url);
        set(&mut self.profile_thumbnail_url, &patch.profile_thumbnail_url);
        if let Some(ref skills) = patch.skills {
            self.skills = skills.clone();
        }
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Name for display, falling back to the email or a placeholder.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or("(unnamed)")
    }
}

/// Partial profile: only the fields that are `Some` get sent or merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_thumbnail_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProfilePatch {
    pub fn headline(headline: impl Into<String>) -> Self {
        Self {
            headline: Some(headline.into()),
            ..Default::default()
        }
    }

    /// Patch touching only the two image fields.
    pub fn images(urls: &ImageUrls) -> Self {
        Self {
            profile_image_url: Some(urls.original.clone()),
            profile_thumbnail_url: Some(urls.thumbnail.clone()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// URLs produced by the backend for an uploaded profile image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrls {
    pub original: String,
    pub thumbnail: String,
}

// API response wrappers

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub profile: ProfileRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUploadResponse {
    pub image_urls: ImageUrls,
}
