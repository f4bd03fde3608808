//! # xrelay-sources
//!
//! Upstream collaborators: the X API post source and the image search
//! used to decorate notifications.

pub mod google_images;
pub mod x_api;

pub use google_images::GoogleImageLookup;
pub use x_api::XApiSource;
