//! CSS consolidation
//!
//! Moves `<style>` blocks and `style` attributes out of mirrored pages into a
//! single stylesheet at [`crate::mirror::STYLESHEET_PATH`]. Inline styles are
//! replaced by generated classes named `<prefix>-<page>-<n>`, unique across
//! the whole mirror.

mod stylesheet;

pub use stylesheet::StyleConsolidator;
