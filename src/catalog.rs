//! Name lookups for hosts and images.
//!
//! The control plane only lists these resources, so a lookup fetches the
//! whole list and returns the first entry whose name matches exactly.

use thiserror::Error;
use tracing::debug;

use crate::client::{ClientError, VmApi};
use crate::model::{Host, Image};

/// Errors raised by catalog lookups.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CatalogError {
    /// No entry carries the requested name.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind (`host` or `image`).
        kind: &'static str,
        /// Name that was looked up.
        name: String,
    },
    /// The list call failed.
    #[error(transparent)]
    Request(#[from] ClientError),
}

/// Finds the host called `name`.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no host matches and
/// [`CatalogError::Request`] when listing fails.
pub async fn find_host<C>(api: &C, name: &str) -> Result<Host, CatalogError>
where
    C: VmApi + ?Sized,
{
    let hosts = api.list_hosts().await?;
    debug!(candidates = hosts.len(), name, "looking up host");
    hosts
        .into_iter()
        .find(|host| host.name == name)
        .ok_or_else(|| not_found("host", name))
}

/// Finds the image called `name`.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no image matches and
/// [`CatalogError::Request`] when listing fails.
pub async fn find_image<C>(api: &C, name: &str) -> Result<Image, CatalogError>
where
    C: VmApi + ?Sized,
{
    let images = api.list_images().await?;
    debug!(candidates = images.len(), name, "looking up image");
    images
        .into_iter()
        .find(|image| image.name == name)
        .ok_or_else(|| not_found("image", name))
}

fn not_found(kind: &'static str, name: &str) -> CatalogError {
    CatalogError::NotFound {
        kind,
        name: name.to_owned(),
    }
}
