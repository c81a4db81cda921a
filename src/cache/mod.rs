//! Cache infrastructure for the site.
//!
//! The engine holds an in-memory snapshot of display-ready records and serves
//! it without touching storage on the read path. Three trigger sources drive
//! its refresh: a periodic ticker keyed to presigned-URL expiry, the
//! storage-change notification poller, and on-demand calls after mutations.

pub mod audio;
pub mod engine;
pub mod sheetmusic;
pub mod triggers;

pub use audio::{AudioRecord, AudioSource};
pub use engine::{Cache, RecordSource, Refreshable};
pub use sheetmusic::{SheetMusicRecord, SheetMusicSource};
