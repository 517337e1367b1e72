//! Export pipeline
//!
//! Request parsing, category dispatch, row shaping, projection and
//! serialization for `/api/download`.

pub mod category;
pub mod format;
pub mod gate;
pub mod projection;
pub mod registry;
pub mod request;
pub mod serialize;
pub mod shaping;

pub use category::{Category, CategoryGroup};
pub use format::ExportFormat;
pub use registry::{CategoryHandler, CategoryRegistry, ExportSources};
pub use request::{DownloadQuery, ExportRequest, InvalidParameter};

/// One output record; keys keep insertion order
pub type Row = serde_json::Map<String, serde_json::Value>;
