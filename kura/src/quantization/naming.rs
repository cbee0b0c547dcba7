use std::borrow::Cow;

use serde::{Deserialize, Serialize};

const ENCODER_NAMESPACE: &str = "encoder.";
const TEXT_ENCODER_PREFIX: &str = "model.";

/// Which parameter tree a weight path belongs to. Trees differ in how their
/// paths are spelled inside archives.
#[derive(
    Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    #[default]
    Transformer,
    TextEncoder,
}

impl TreeKind {
    /// Archive key for a tree path.
    pub fn archive_key<'a>(
        &self,
        path: &'a str,
    ) -> Cow<'a, str> {
        match self {
            TreeKind::TextEncoder if path.starts_with(ENCODER_NAMESPACE) => {
                Cow::Owned(format!("{TEXT_ENCODER_PREFIX}{path}"))
            },
            _ => Cow::Borrowed(path),
        }
    }

    /// Tree path for an archive key; inverse of `archive_key`.
    pub fn tree_path<'a>(
        &self,
        key: &'a str,
    ) -> Cow<'a, str> {
        match self {
            TreeKind::TextEncoder => match key.strip_prefix(TEXT_ENCODER_PREFIX)
            {
                Some(path) if path.starts_with(ENCODER_NAMESPACE) => {
                    Cow::Borrowed(path)
                },
                _ => Cow::Borrowed(key),
            },
            TreeKind::Transformer => Cow::Borrowed(key),
        }
    }
}
