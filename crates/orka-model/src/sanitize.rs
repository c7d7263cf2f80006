// SPDX-License-Identifier: Apache-2.0
//! Strip inline-data parts a model cannot accept.
//!
//! Call [`strip_inline_data_if_unsupported`] before building a
//! [`crate::CompletionRequest`] so that image/binary parts are replaced with
//! a text placeholder whenever the target model is text-only.

use crate::types::{Content, Part, Role};

const INLINE_DATA_OMITTED: &str = "[inline data omitted: model does not support this input]";

/// Replace every [`Part::InlineData`] in `history` with a text placeholder
/// unless `supports_images` is `true`. A no-op when the model accepts
/// inline data.
pub fn strip_inline_data_if_unsupported(history: Vec<Content>, supports_images: bool) -> Vec<Content> {
    if supports_images {
        return history;
    }
    history.into_iter().map(strip_content).collect()
}

fn strip_content(mut content: Content) -> Content {
    content.parts = content
        .parts
        .into_iter()
        .map(|p| match p {
            Part::InlineData { .. } => Part::text(INLINE_DATA_OMITTED),
            other => other,
        })
        .collect();
    content
}
