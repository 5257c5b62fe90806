//! Data models for the profile sync layer.
//!
//! - `ProfileRecord`: the cached profile entity
//! - `ProfilePatch`: partial profile used for updates and cache merges
//! - `ImageUpload`, `ImageUrls`: profile image upload input and result

pub mod profile;
pub mod upload;

pub use profile::{ImageUploadResponse, ImageUrls, ProfilePatch, ProfileRecord, ProfileResponse};
pub use upload::{ImageUpload, ALLOWED_IMAGE_EXTENSIONS, MAX_IMAGE_BYTES};
