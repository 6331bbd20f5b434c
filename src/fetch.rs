use std::sync::Arc;

use crate::jira::{IssueRecord, JiraClient, JiraError, RawIssue};
use crate::logging;
use crate::metrics::Metrics;
use crate::sprint_cache::{SprintCache, SprintRef};

/// Upper bound on records accumulated across pages of one fetch.
pub const DEFAULT_LIMIT: usize = 200;

/// Per-request page cap; the server rejects larger pages anyway.
const MAX_PAGE_SIZE: usize = 100;

/// Placeholder in a filter expression that stands for the authenticated
/// user. Resolved against the identity endpoint before paging starts.
const CURRENT_USER_TOKEN: &str = "@me";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("a project key is required")]
    ProjectRequired,
    #[error("no boards found for project {project}")]
    NoBoardsFound { project: String },
    #[error("authenticated identity has no account id; cannot resolve '@me'")]
    CurrentUserUnresolved,
    #[error(transparent)]
    Transport(#[from] JiraError),
}

/// Assembles bounded, deduplicated issue batches from the paged remote API.
///
/// At most one page request is in flight per invocation: the next page is
/// requested only after the previous one has been decoded. A page failure
/// aborts the whole fetch and discards anything already accumulated.
pub struct FetchPipeline {
    client: Arc<JiraClient>,
    cache: Arc<SprintCache>,
    metrics: Arc<Metrics>,
    limit: usize,
}

impl FetchPipeline {
    pub fn new(client: Arc<JiraClient>, cache: Arc<SprintCache>, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            cache,
            metrics,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Fetches the project's active-sprint issues, in rank order.
    ///
    /// Sprint resolution goes through the cache unless `force_refresh` is
    /// set. A project with a board but no active sprint yields an empty
    /// batch; that is a valid terminal state, not an error.
    pub fn fetch_sprint_issues(
        &self,
        project: &str,
        force_refresh: bool,
    ) -> Result<Vec<IssueRecord>, FetchError> {
        if project.trim().is_empty() {
            return Err(FetchError::ProjectRequired);
        }

        let sprint = match self.resolve_sprint(project, force_refresh)? {
            Some(sprint) => sprint,
            None => {
                logging::info(format!("project {project} has no active sprint"));
                return Ok(Vec::new());
            }
        };

        self.paginate_sprint(sprint.sprint_id)
    }

    /// Fetches issues matching a filter expression, resolving the
    /// current-user placeholder first. No sprint-cache interaction.
    pub fn fetch_by_query(
        &self,
        project: &str,
        filter: &str,
    ) -> Result<Vec<IssueRecord>, FetchError> {
        if project.trim().is_empty() {
            return Err(FetchError::ProjectRequired);
        }

        let jql = self.resolve_current_user(filter)?;
        self.paginate_search(&jql)
    }

    /// Backlog listing: in the project, not in an open sprint, not an Epic,
    /// not yet done, in rank order.
    pub fn fetch_backlog(&self, project: &str) -> Result<Vec<IssueRecord>, FetchError> {
        if project.trim().is_empty() {
            return Err(FetchError::ProjectRequired);
        }

        let jql = format!(
            "project = {project} AND sprint IS EMPTY AND issuetype != Epic \
             AND statusCategory != Done ORDER BY Rank ASC"
        );
        self.fetch_by_query(project, &jql)
    }

    fn resolve_sprint(
        &self,
        project: &str,
        force_refresh: bool,
    ) -> Result<Option<SprintRef>, FetchError> {
        if !force_refresh {
            if let Some(cached) = self.cache.get(project) {
                self.metrics.inc_cache_hit();
                logging::debug(format!(
                    "using cached sprint {} on board {} for {}",
                    cached.sprint_id, cached.board_id, project
                ));
                return Ok(Some(cached));
            }
        }
        self.metrics.inc_cache_miss();

        let boards = self.client.get_boards(project)?;
        let board = boards.first().ok_or_else(|| FetchError::NoBoardsFound {
            project: project.to_string(),
        })?;

        let sprints = self.client.get_active_sprints(board.id)?;
        let sprint = match sprints.first() {
            Some(sprint) => sprint,
            None => return Ok(None),
        };

        self.cache.put(project, board.id, sprint.id);
        logging::info(format!(
            "resolved sprint {} ({}) on board {} for {}",
            sprint.id,
            sprint.name.as_deref().unwrap_or("unnamed"),
            board.id,
            project
        ));

        Ok(Some(SprintRef {
            board_id: board.id,
            sprint_id: sprint.id,
        }))
    }

    fn paginate_sprint(&self, sprint_id: u64) -> Result<Vec<IssueRecord>, FetchError> {
        let mut collected = Vec::new();
        let mut offset = 0usize;

        loop {
            let page_size = MAX_PAGE_SIZE.min(self.limit - collected.len());
            if page_size == 0 {
                break;
            }

            let page = self.client.get_sprint_issues(sprint_id, offset, page_size)?;
            self.metrics.inc_page();
            let page_len = page.issues.len();
            offset += page_len;
            self.normalize_into(page.issues, &mut collected);

            if page_len == 0 || offset >= page.total || collected.len() >= self.limit {
                break;
            }
        }

        Ok(collected)
    }

    fn paginate_search(&self, jql: &str) -> Result<Vec<IssueRecord>, FetchError> {
        let mut collected = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page_size = MAX_PAGE_SIZE.min(self.limit - collected.len());
            if page_size == 0 {
                break;
            }

            let page = self.client.search_issues(jql, token.as_deref(), page_size)?;
            self.metrics.inc_page();
            let page_len = page.issues.len();
            self.normalize_into(page.issues, &mut collected);

            if page_len == 0 || collected.len() >= self.limit {
                break;
            }
            token = match page.next_page_token {
                Some(next) if !next.is_empty() && page.is_last != Some(true) => Some(next),
                _ => break,
            };
        }

        Ok(collected)
    }

    fn normalize_into(&self, raw: Vec<RawIssue>, out: &mut Vec<IssueRecord>) {
        for issue in raw {
            match IssueRecord::from_raw(issue) {
                Some(record) => out.push(record),
                None => {
                    self.metrics.inc_record_skipped();
                    logging::warn("skipping issue record with no key");
                }
            }
        }
    }

    fn resolve_current_user(&self, filter: &str) -> Result<String, FetchError> {
        if !filter.contains(CURRENT_USER_TOKEN) {
            return Ok(filter.to_string());
        }

        let identity = self.client.get_myself()?;
        let account_id = identity
            .account_id
            .filter(|id| !id.is_empty())
            .ok_or(FetchError::CurrentUserUnresolved)?;
        Ok(filter.replace(CURRENT_USER_TOKEN, &format!("\"{account_id}\"")))
    }
}
