//! Spatial transformation stage.
//!
//! The only transformation is the TPS spatial transformer; `"None"` (or any
//! selector this crate does not know) leaves the stage disabled.

pub mod tps;

pub use tps::TpsSpatialTransformer;

/// Transformation selected by the `transformation` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationKind {
    /// Thin-plate-spline spatial transformer network.
    Tps,
}

impl TransformationKind {
    /// Parses a selector string. Unknown selectors (including `"None"`) yield `None`.
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "TPS" => Some(Self::Tps),
            _ => None,
        }
    }

    /// The selector string for this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tps => "TPS",
        }
    }
}
