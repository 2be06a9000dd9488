//! Mirror output: path mapping and the byte sink
//!
//! - `path`: pure mapping from canonical URL and kind to a relative path
//! - `writer`: the [`MirrorWriter`] trait and its filesystem implementation

mod path;
mod writer;

pub use path::{map_path, MappedPath};
pub use writer::{FsMirrorWriter, MirrorWriter, WriteOutcome};

/// Location of the consolidated stylesheet inside a mirror
pub const STYLESHEET_PATH: &str = "css/styles.css";
