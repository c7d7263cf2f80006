// SPDX-License-Identifier: Apache-2.0
//! Drops invalid model turns (and the user turn that prompted them) from a
//! conversation history before it is sent back to the model.

use orka_model::{Content, Role};

/// Scan `history` left-to-right. `user` and `function` turns are emitted
/// as-is. Each maximal run of consecutive `model` turns is emitted whole if
/// every turn in the run is a valid model turn; otherwise the whole run is
/// dropped along with the most recently emitted `user` turn, if any.
pub fn curate(history: &[Content]) -> Vec<Content> {
    let mut curated: Vec<Content> = Vec::with_capacity(history.len());
    let mut i = 0;
    while i < history.len() {
        match history[i].role {
            Role::User | Role::Function => {
                curated.push(history[i].clone());
                i += 1;
            }
            Role::Model => {
                let start = i;
                let mut all_valid = true;
                while i < history.len() && history[i].role == Role::Model {
                    if !history[i].is_valid_model_turn() {
                        all_valid = false;
                    }
                    i += 1;
                }
                if all_valid {
                    curated.extend_from_slice(&history[start..i]);
                } else if matches!(curated.last().map(|c| c.role), Some(Role::User)) {
                    curated.pop();
                }
            }
        }
    }
    curated
}
