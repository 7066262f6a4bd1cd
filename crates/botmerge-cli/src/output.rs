//! Plain-text and JSON rendering of engine output.
//!
//! All presentation lives here; the engine only returns structured data.

use anyhow::Result;
use botmerge_core::types::{MergeResult, ProcessResult};

/// Renders discovery results.
pub fn render_process(results: &[ProcessResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    for result in results {
        if let Some(error) = &result.error {
            println!("{}/{}: ERROR: {error}", result.provider, result.repository);
            continue;
        }
        let ready = result.pull_requests.iter().filter(|p| p.ready).count();
        println!(
            "{}/{}: {} pull request(s), {} ready",
            result.provider,
            result.repository,
            result.pull_requests.len(),
            ready
        );
        for pr in &result.pull_requests {
            let marker = if pr.ready {
                "ready"
            } else if pr.skipped {
                "skip "
            } else if pr.error.is_some() {
                "error"
            } else {
                "wait "
            };
            println!(
                "  [{marker}] #{} {} ({}) - {}",
                pr.pull_request.number, pr.pull_request.title, pr.pull_request.author, pr.reason
            );
            if let Some(error) = &pr.error {
                println!("          {error}");
            }
        }
    }
    Ok(())
}

/// Renders merge outcomes.
pub fn render_merge(outcomes: &[MergeResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }

    for outcome in outcomes {
        let marker = if outcome.success {
            "merged"
        } else if outcome.skipped {
            "skipped"
        } else {
            "failed"
        };
        print!(
            "[{marker}] {}/{} #{} {} - {}",
            outcome.provider, outcome.repository, outcome.number, outcome.title, outcome.reason
        );
        if let Some(sha) = &outcome.commit_sha {
            print!(" ({sha})");
        }
        println!();
        if let Some(error) = &outcome.error {
            println!("         {error}");
        }
    }

    let merged = outcomes.iter().filter(|o| o.success).count();
    let skipped = outcomes.iter().filter(|o| o.skipped).count();
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    println!("{merged} merged, {skipped} skipped, {failed} failed");
    Ok(())
}
