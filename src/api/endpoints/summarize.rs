//! Report summarization endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Deserialize)]
pub struct SummarizeRequest {
    pub report_text: String,
    pub max_chars: Option<usize>,
}

#[derive(Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
    pub truncated: bool,
}

/// Collapse whitespace and cut at a char boundary, never mid-codepoint.
pub(crate) fn format_summary(raw: &str, max_chars: usize) -> (String, bool) {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return (collapsed, false);
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    (format!("{}...", cut.trim_end()), true)
}

/// `POST /api/summarize-report`
pub async fn report(
    State(ctx): State<ApiContext>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    if request.report_text.trim().is_empty() {
        return Err(ApiError::BadRequest("report_text is required".into()));
    }

    let model = ctx.core.models.summarizer.clone();
    let input = request.report_text.clone();
    let raw = ctx.core.pool.run(move || model.summarize(&input)).await?;

    let limit = request
        .max_chars
        .unwrap_or(ctx.core.settings.summary_max_chars);
    let (summary, truncated) = format_summary(&raw, limit);

    Ok(Json(SummarizeResponse { summary, truncated }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_summaries_pass_through() {
        let (out, truncated) = format_summary("Stable   labs,\nno action.", 100);
        assert_eq!(out, "Stable labs, no action.");
        assert!(!truncated);
    }

    #[test]
    fn long_summaries_cut_at_char_boundary() {
        let (out, truncated) = format_summary("température élevée et toux", 12);
        assert!(truncated);
        assert_eq!(out, "température...");
    }
}
