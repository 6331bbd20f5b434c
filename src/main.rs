use std::sync::Arc;
use std::time::Duration;

use jirabuf::config;
use jirabuf::fetch::FetchPipeline;
use jirabuf::jira::JiraClient;
use jirabuf::logging;
use jirabuf::metrics::Metrics;
use jirabuf::render::render_forest;
use jirabuf::sprint_cache::SprintCache;
use jirabuf::tree::build_forest;

fn usage() -> &'static str {
    "usage: jirabuf [--backlog | --jql <filter>] [--refresh] [project]"
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load()?;

    let mut project: Option<String> = cfg.jira.project.clone();
    let mut backlog = false;
    let mut jql: Option<String> = None;
    let mut force_refresh = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backlog" => backlog = true,
            "--jql" => {
                jql = Some(args.next().ok_or(usage())?);
            }
            "--refresh" => force_refresh = true,
            "--help" | "-h" => {
                println!("{}", usage());
                return Ok(());
            }
            other if !other.starts_with('-') => project = Some(other.to_string()),
            _ => return Err(usage().into()),
        }
    }

    let project = project.ok_or("no project key given and jira.project is unset")?;

    let metrics = Arc::new(Metrics::new());
    let client = Arc::new(JiraClient::new_with_metrics(
        cfg.jira.base_url.clone(),
        cfg.jira.email.clone(),
        cfg.jira.api_token.clone(),
        Arc::clone(&metrics),
    )?);
    logging::info(format!("using jira base url {}", client.base_url));

    let cache = Arc::new(SprintCache::load(
        &cfg.cache_path()?,
        Duration::from_secs(cfg.cache.ttl_secs),
    ));

    let pipeline =
        FetchPipeline::new(client, cache, Arc::clone(&metrics)).with_limit(cfg.fetch.limit);

    let records = if let Some(filter) = jql {
        pipeline.fetch_by_query(&project, &filter)?
    } else if backlog {
        pipeline.fetch_backlog(&project)?
    } else {
        pipeline.fetch_sprint_issues(&project, force_refresh)?
    };

    if records.is_empty() {
        println!("no issues");
        return Ok(());
    }

    let count = records.len();
    let forest = build_forest(records);
    print!("{}", render_forest(&forest));

    let snap = metrics.snapshot();
    logging::debug(format!(
        "fetched {} issues over {} page(s), {} api request(s)",
        count, snap.pages_fetched, snap.api_requests
    ));

    Ok(())
}
