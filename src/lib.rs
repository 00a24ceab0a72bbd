//! filegate: a file-hosting gateway.
//!
//! Uploads land in a blob store, metadata lives in a key/value index, and
//! older files are proxied from a legacy file host. Every delivery goes
//! through [`delivery::DeliveryPipeline`], which resolves the identifier to a
//! backend, applies list-based access control and runs lazy moderation.
//! [`session::SessionGate`] guards everything that is not public.

pub mod config;
pub mod delivery;
pub mod error;
pub mod http;
pub mod keys;
pub mod manage;
pub mod moderation;
pub mod record;
pub mod resolver;
pub mod session;
pub mod status;
pub mod storage;
pub mod upload;

pub use error::{Error, Result};
