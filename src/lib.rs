//! `jirabuf` is the data core of an editor plugin for Jira-style trackers:
//! it fetches paged sprint/backlog/search results into a bounded issue
//! batch, rebuilds the parent/child forest the list view renders, and
//! converts issue bodies between the structured document format and
//! Markdown in both directions. Windows, highlights, and keymaps belong to
//! the host editor.

/// Structured-document ⇄ Markdown conversion.
pub mod adf;
/// Runtime configuration loading and validation.
pub mod config;
/// Paginated fetch pipeline over the Jira client and sprint cache.
pub mod fetch;
/// Jira API client and issue data models.
pub mod jira;
/// Logging helpers used throughout the crate.
pub mod logging;
/// Runtime metrics counters.
pub mod metrics;
/// Forest and detail-view text rendering.
pub mod render;
/// Persistent board/sprint lookup cache.
pub mod sprint_cache;
/// Issue forest construction from flat batches.
pub mod tree;
