use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Auditor, ReviewRequest, Verdict};
use crate::core::providers::{Message, Provider};

const DEFAULT_INSTRUCTIONS: &str = "You are a security code reviewer. Compare the proposed file \
content with the current content. Approve only if the proposal is a complete file, keeps \
existing behavior intact, and addresses the reported problem without introducing new risk.\n\
Reply with exactly these two lines:\n\
RESULT: APPROVED or RESULT: REJECTED\n\
REASON: <one sentence>";

/// Auditor backed by a second model call.
pub struct ModelAuditor {
    provider: Arc<dyn Provider>,
    instructions: String,
}

impl ModelAuditor {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    fn render_request(request: &ReviewRequest) -> String {
        let mut body = format!("FILE: {}\n\n", request.path);
        match &request.current {
            Some(current) => {
                let _ = write!(body, "CURRENT CONTENT:\n```\n{current}\n```\n\n");
            }
            None => body.push_str("CURRENT CONTENT: (new file)\n\n"),
        }
        let _ = write!(body, "PROPOSED CONTENT:\n```\n{}\n```\n", request.proposed);
        if let Some(evidence) = &request.evidence {
            let _ = write!(body, "\nLATEST FAILURE EVIDENCE:\n{evidence}\n");
        }
        body
    }
}

#[async_trait]
impl Auditor for ModelAuditor {
    async fn review(&self, request: &ReviewRequest) -> anyhow::Result<Verdict> {
        let transcript = vec![
            Message::system(&self.instructions),
            Message::user(Self::render_request(request)),
        ];
        let turn = self.provider.complete(&transcript, &[]).await?;
        let reply = turn.content.unwrap_or_default();
        debug!(path = %request.path, reply_len = reply.len(), "auditor replied");
        Ok(parse_verdict(&reply))
    }
}

/// Strict parse of an auditor reply.
///
/// Exactly one whole-line `RESULT: APPROVED` or `RESULT: REJECTED` must be present
/// (keyword case-insensitive, optional brackets). Anything else fails closed to `Rejected`.
pub fn parse_verdict(reply: &str) -> Verdict {
    let mut approved = false;
    let mut rejected = false;
    let mut reason: Option<String> = None;

    for line in reply.lines() {
        let line = line.trim().trim_matches('*').trim();
        if let Some(value) = strip_label(line, "RESULT:") {
            let value = value
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .trim();
            if value.eq_ignore_ascii_case("APPROVED") {
                approved = true;
            } else if value.eq_ignore_ascii_case("REJECTED") {
                rejected = true;
            }
        } else if let Some(value) = strip_label(line, "REASON:")
            && reason.is_none()
        {
            let value = value.trim();
            if !value.is_empty() {
                reason = Some(value.to_string());
            }
        }
    }

    let rationale = || reason.clone().unwrap_or_else(|| "no reason given".to_string());
    match (approved, rejected) {
        (true, false) => Verdict::approved(rationale()),
        (false, true) => Verdict::rejected(rationale()),
        (true, true) => {
            warn!("auditor reply contained both verdicts");
            Verdict::rejected("auditor reply was ambiguous (both APPROVED and REJECTED)")
        }
        (false, false) => {
            warn!("auditor reply contained no verdict line");
            Verdict::rejected("auditor reply could not be parsed (no RESULT line)")
        }
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| &line[label.len()..])
}
