// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly for the worker tasks.
//!
//! Prompts ask for strict JSON matching the parser's schema; everything
//! else about the wording is deliberately plain.

use crate::task_args::{AnalyzeArgs, PageVisualArgs, RecoverArgs, RegenerateArgs, StepVisualArgs,
    UiVisualArgs};

fn json_block(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub(super) fn analyze_form_page(args: &AnalyzeArgs) -> String {
    let mut prompt = String::from(
        "You map web forms for automated testing. From the DOM below, produce the ordered \
         list of steps that fills and submits the form once.\n\
         Respond with JSON only: {\"steps\": [{\"step_number\", \"action\", \"selector\", \
         \"value\", \"description\", \"full_xpath\", \"is_junction\", \"junction_info\": \
         {\"junction_name\", \"all_options\", \"junction_type\"}}]}.\n\
         Mark any input that changes which other inputs appear (dropdown, radio group, \
         checkbox group) with is_junction and its full option list.\n",
    );
    if !args.junction_instructions.is_empty() {
        prompt.push_str("Force these junction choices (selector -> option):\n");
        prompt.push_str(&json_block(&args.junction_instructions));
        prompt.push('\n');
    }
    if let Some(inputs) = &args.user_inputs {
        prompt.push_str("Prefer these user-supplied field values:\n");
        prompt.push_str(&json_block(inputs));
        prompt.push('\n');
    }
    if let Some(test_case) = &args.test_case {
        prompt.push_str("Test case under mapping:\n");
        prompt.push_str(test_case);
        prompt.push('\n');
    }
    if let Some(doc) = &args.spec_document {
        prompt.push_str("Form specification document:\n");
        prompt.push_str(doc);
        prompt.push('\n');
    }
    prompt.push_str("\nDOM:\n");
    prompt.push_str(&args.dom_html);
    prompt
}

pub(super) fn regenerate_steps(args: &RegenerateArgs) -> String {
    format!(
        "The form changed under a running mapping. These steps already executed:\n{}\n\
         From the current DOM below, produce ONLY the remaining steps to finish and submit \
         the form, as JSON {{\"steps\": [...]}} in the same schema.\n\nDOM:\n{}",
        json_block(&args.executed),
        args.dom_html
    )
}

pub(super) fn analyze_failure(args: &RecoverArgs) -> String {
    let mut prompt = format!(
        "A browser step failed during form mapping.\nStep:\n{}\nError: {}\n",
        json_block(&args.step),
        args.error
    );
    if let Some(history) = &args.recovery_history {
        prompt.push_str(&format!("Previous recovery decision: {history}\n"));
    }
    prompt.push_str(
        "Classify the failure and respond with JSON only, one of:\n\
         {\"kind\": \"locator_changed\", \"new_selector\": ..., \"new_xpath\": ...}\n\
         {\"kind\": \"page_general_error\"}  (404, blank page, network unreachable)\n\
         {\"kind\": \"need_healing\"}  (the remaining steps no longer fit the page)\n\
         {\"kind\": \"correction_steps\", \"pre_steps\": [...], \"replacement\": ...}\n",
    );
    if let Some(dom) = &args.dom_html {
        prompt.push_str("\nDOM at failure:\n");
        prompt.push_str(dom);
    }
    prompt
}

pub(super) fn verify_ui_visual(args: &UiVisualArgs) -> String {
    format!(
        "Inspect the page screenshot (object key {}) for visual defects: overlapping \
         elements, cut-off labels, broken layout. Already reported, do not repeat:\n{}\n\
         Respond with JSON only: {{\"new_issues\": \"...\"}} with an empty string when clean.",
        args.screenshot_key.as_deref().unwrap_or("<none>"),
        json_block(&args.prior_issues)
    )
}

pub(super) fn verify_page_visual(args: &PageVisualArgs) -> String {
    format!(
        "A form was submitted; the screenshot (object key {}) shows the result page. \
         Check that every executed input below is reflected there.\n\
         Executed steps:\n{}\n\
         Respond with JSON only: {{\"ready\": bool, \"failures\": [{{\"field\", \"passed\", \
         \"severity\": \"low\"|\"medium\"|\"high\", \"detail\"}}]}}. \
         ready=false when the page is still loading or transitional.",
        args.screenshot_key.as_deref().unwrap_or("<none>"),
        json_block(&args.executed)
    )
}

pub(super) fn verify_dynamic_step(args: &StepVisualArgs) -> String {
    format!(
        "Verify against the screenshot (object key {}): {}\n\
         Also screen for blocking page issues: loading overlay, 404, expired session.\n\
         Respond with JSON only: {{\"passed\": bool, \"blocking_issue\": string|null, \
         \"detail\": string|null}}.",
        args.screenshot_key.as_deref().unwrap_or("<none>"),
        args.description
    )
}
