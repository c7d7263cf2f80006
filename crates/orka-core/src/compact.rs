// SPDX-License-Identifier: Apache-2.0
//! Compression Engine: checks the session's token budget against the
//! model's context window and, when near the limit, asks the model to
//! summarize its own older history so the conversation can continue.

use orka_config::CompactionStrategy;
use orka_model::{CompletionRequest, Content, ModelProvider, Part, Role};
use orka_tools::OutputCategory;
use tracing::warn;

const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarise the following conversation history \
     in a concise, information-dense way. Preserve all technical details, decisions, file \
     names, code snippets, and tool outputs that may be relevant to future work. \
     The summary will replace the original history to free up context space.";

const STRUCTURED_COMPACTION_PROMPT: &str = "\
You are a context compaction assistant for a software engineering agent. \
Produce a structured state checkpoint from the conversation history below. \
Use EXACTLY the following Markdown sections — do not add or remove sections. \
Be information-dense: preserve file paths, function names, error messages, \
code snippets, test names, and technical decisions verbatim where they matter.

## Active Task
Describe in 1-3 sentences what the agent is currently working on.

## Key Decisions & Rationale
List every significant technical decision made and why (bullet points). \
Include file or component names.

## Files & Artifacts
List every file that was read, modified, or created, with a brief note on what was done.

## Constraints & Requirements
List every requirement, constraint, or user preference that must be preserved.

## Pending Items
List every unfinished subtask or open question.

## Session Narrative
Write a dense technical summary (2-5 paragraphs) of what happened, \
capturing the essential flow of events, tool outputs, and reasoning. \
Focus on facts the agent will need to continue correctly.";

/// Which compaction path actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// History was under the trigger threshold; nothing happened.
    Skipped,
    /// Model-produced summary, rebuilt as `[summary, Acknowledged, ...recent tail]`.
    Compacted,
    /// Deterministic drop-and-notice fallback; no model call was made.
    Emergency,
}

fn approx_tokens(history: &[Content]) -> u32 {
    history.iter().map(Content::approx_tokens).sum::<usize>() as u32
}

/// Rewrite `history` into a single compaction-prompt user turn using
/// `strategy`. Returns the turn count the prompt was built from.
pub fn compact_session_with_strategy(
    history: &mut Vec<Content>,
    strategy: &CompactionStrategy,
) -> usize {
    let before = history.len();
    let prompt = match strategy {
        CompactionStrategy::Structured => STRUCTURED_COMPACTION_PROMPT,
        CompactionStrategy::Narrative => SUMMARIZE_PROMPT,
    };
    let history_text = serialize_history(history);
    history.clear();
    history.push(Content::user(format!("{prompt}\n\n---\n\n{history_text}")));
    before
}

/// Deterministic, no-model-call fallback: drop everything but the last
/// `keep_n` turns and prepend a canned notice.
pub fn emergency_compact(history: &mut Vec<Content>, keep_n: usize) -> usize {
    let before = history.len();
    let keep = keep_n.min(history.len());
    let preserved: Vec<Content> = history[history.len() - keep..].to_vec();
    let notice = Content::model_text(
        "[Context emergency-compacted: earlier history was dropped to prevent a \
         context-window overflow. The agent may lack full context for earlier \
         decisions. Proceed carefully and ask the user to re-provide any missing \
         requirements if needed.]",
    );
    history.clear();
    history.push(notice);
    history.extend(preserved);
    before
}

/// Check the session's token usage against `model`'s context window and, if
/// near the limit, compact `history` in place.
///
/// Normal path: the older portion of history (everything before the last
/// `keep_recent` turns) is rewritten into a compaction prompt, sent to the
/// model tool-free, and the resulting summary replaces it — history becomes
/// `[summary, "Acknowledged.", ...preserved recent turns]`. If the model
/// call fails or returns an empty summary, or if even the compaction prompt
/// would overflow the budget, falls back to [`emergency_compact`], which
/// never calls the model and always succeeds.
pub async fn compress_if_needed(
    history: &mut Vec<Content>,
    model: &dyn ModelProvider,
    strategy: &CompactionStrategy,
    threshold: f32,
    keep_recent: usize,
) -> anyhow::Result<(CompactionOutcome, u32, u32)> {
    let limit = model.context_window();
    if limit == 0 {
        return Ok((CompactionOutcome::Skipped, 0, 0));
    }

    let tokens_before = approx_tokens(history);
    let fraction = tokens_before as f32 / limit as f32;
    if fraction < threshold {
        return Ok((CompactionOutcome::Skipped, tokens_before, tokens_before));
    }

    let preserve_count = if history.len() > keep_recent * 2 { keep_recent } else { 0 };
    let mut summarize_count = history.len().saturating_sub(preserve_count);

    // Never split inside a functionCall/functionResponse pair: back up past
    // any `function`-role turn until the recent tail starts on a `user` or
    // a self-contained `model` turn.
    while summarize_count > 0 && summarize_count < history.len() {
        if history[summarize_count].role == Role::Function {
            summarize_count -= 1;
        } else {
            break;
        }
    }

    let recent_tokens: u32 =
        history[summarize_count..].iter().map(Content::approx_tokens).sum::<usize>() as u32;
    let compaction_input = tokens_before.saturating_sub(recent_tokens);
    let emergency_fraction = 0.95_f32;
    let would_overflow =
        summarize_count == 0 || (compaction_input as f32 / limit as f32) >= emergency_fraction;

    if would_overflow {
        emergency_compact(history, keep_recent);
        let tokens_after = approx_tokens(history);
        return Ok((CompactionOutcome::Emergency, tokens_before, tokens_after));
    }

    let recent_tail: Vec<Content> = history[summarize_count..].to_vec();
    let mut to_compact: Vec<Content> = history[..summarize_count].to_vec();
    compact_session_with_strategy(&mut to_compact, strategy);

    let req = CompletionRequest { system_instruction: None, history: to_compact, tools: Vec::new() };
    let summary = match run_to_text(model, req).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("compaction returned an empty summary, falling back to emergency compact");
            emergency_compact(history, keep_recent);
            let tokens_after = approx_tokens(history);
            return Ok((CompactionOutcome::Emergency, tokens_before, tokens_after));
        }
        Err(e) => {
            warn!("compaction model call failed, falling back to emergency compact: {e}");
            emergency_compact(history, keep_recent);
            let tokens_after = approx_tokens(history);
            return Ok((CompactionOutcome::Emergency, tokens_before, tokens_after));
        }
    };

    history.clear();
    history.push(Content::user(summary));
    history.push(Content::model_text("Acknowledged."));
    history.extend(recent_tail);
    let tokens_after = approx_tokens(history);
    Ok((CompactionOutcome::Compacted, tokens_before, tokens_after))
}

async fn run_to_text(model: &dyn ModelProvider, req: CompletionRequest) -> anyhow::Result<String> {
    use futures::StreamExt;
    use orka_model::ResponseEvent;

    let mut stream = model.generate_content_stream(req).await?;
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::TextDelta(delta) => text.push_str(&delta),
            ResponseEvent::Done => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Deterministic, content-aware tool-result truncation. See `OutputCategory`
/// for what each variant preserves.
pub fn smart_truncate(content: &str, category: OutputCategory, cap_tokens: usize) -> String {
    if cap_tokens == 0 {
        return content.to_string();
    }
    let cap_chars = cap_tokens * 4;
    if content.len() <= cap_chars {
        return content.to_string();
    }
    let omitted_bytes = content.len().saturating_sub(cap_chars);
    match category {
        OutputCategory::HeadTail => head_tail_lines(
            content,
            cap_chars,
            60,
            40,
            &format!("[... {{lines}} lines / {omitted_bytes} bytes omitted ...]"),
        ),
        OutputCategory::MatchList => head_lines(
            content,
            cap_chars,
            &format!(
                "[... {{lines}} more matches omitted ({omitted_bytes} bytes); \
                     use a more specific pattern to see them ...]"
            ),
        ),
        OutputCategory::FileContent => head_tail_lines(
            content,
            cap_chars,
            usize::MAX,
            usize::MAX,
            &format!(
                "[... {{lines}} lines omitted ({omitted_bytes} bytes); \
                     use an offset/limit read to see more ...]"
            ),
        ),
        OutputCategory::Generic => {
            let cut = content[..cap_chars].rfind('\n').map(|p| p + 1).unwrap_or(cap_chars);
            format!(
                "{}\n[... {omitted_bytes} bytes omitted; \
                 content truncated to fit context budget ...]",
                &content[..cut]
            )
        }
    }
}

fn serialize_history(history: &[Content]) -> String {
    history
        .iter()
        .map(|c| {
            let role = match c.role {
                Role::User => "User",
                Role::Model => "Model",
                Role::Function => "Tool",
            };
            let text = c
                .parts
                .iter()
                .map(|p| match p {
                    Part::Text { text } => text.clone(),
                    Part::Thought { subject, description } => format!("[thought: {subject} — {description}]"),
                    Part::FunctionCall { name, args, .. } => format!("[tool_call: {name}({args})]"),
                    Part::FunctionResponse { name, response, .. } => {
                        format!("[tool_result {name}: {response}]")
                    }
                    Part::InlineData { mime_type, .. } => format!("[inline_data: {mime_type}]"),
                })
                .collect::<Vec<_>>()
                .join(" ");
            format!("{role}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn head_lines(content: &str, cap_chars: usize, notice_template: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut kept = String::with_capacity(cap_chars);
    let mut kept_count = 0usize;
    for line in &lines {
        let needed = if kept.is_empty() { line.len() } else { line.len() + 1 };
        if kept.len() + needed > cap_chars {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        kept_count += 1;
    }
    let omitted = lines.len().saturating_sub(kept_count);
    if omitted == 0 {
        return content[..cap_chars.min(content.len())].to_string();
    }
    let notice = notice_template.replace("{lines}", &omitted.to_string());
    format!("{kept}\n{notice}")
}

fn head_tail_lines(
    content: &str,
    cap_chars: usize,
    max_head: usize,
    max_tail: usize,
    notice_template: &str,
) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let half_cap = cap_chars / 2;

    let mut head = String::with_capacity(half_cap);
    let mut head_count = 0usize;
    for line in lines.iter().take(max_head) {
        let needed = if head.is_empty() { line.len() } else { line.len() + 1 };
        if head.len() + needed > half_cap {
            break;
        }
        if !head.is_empty() {
            head.push('\n');
        }
        head.push_str(line);
        head_count += 1;
    }

    let mut tail_lines: Vec<&str> = Vec::new();
    let mut tail_chars = 0usize;
    for line in lines.iter().rev().take(max_tail) {
        let needed = if tail_lines.is_empty() { line.len() } else { line.len() + 1 };
        if tail_chars + needed > half_cap {
            break;
        }
        tail_chars += needed;
        tail_lines.push(line);
    }
    tail_lines.reverse();
    let tail_count = tail_lines.len();
    let tail = tail_lines.join("\n");

    let omitted = lines.len().saturating_sub(head_count + tail_count);
    if omitted == 0 {
        return content[..cap_chars.min(content.len())].to_string();
    }
    let notice = notice_template.replace("{lines}", &omitted.to_string());
    format!("{head}\n{notice}\n{tail}")
}
