//! Deterministic HTML rendering for the `documentation` step (§4.H).
use crate::adapters::Ticket;

/// Renders the fixed-structure release documentation page: release info,
/// ticket table, per-repo deployment section, per-repo rollback section, a
/// fixed checklist, and an emergency contacts placeholder.
pub fn render_release_page(
    version: &str,
    sprint_name: &str,
    tickets: &[Ticket],
    repositories: &[String],
) -> String {
    let mut html = String::new();
    html.push_str(&format!("<h1>Release {version}</h1>\n"));
    html.push_str(&format!("<p>Sprint: {sprint_name}</p>\n"));

    html.push_str("<h2>Included Tickets</h2>\n<table><tr><th>Key</th><th>Summary</th><th>Status</th></tr>\n");
    for t in tickets {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            t.key, t.summary, t.status
        ));
    }
    html.push_str("</table>\n");

    html.push_str("<h2>Deployment</h2>\n<ul>\n");
    for repo in repositories {
        html.push_str(&format!("<li>{repo}: deploy release/{version} to production</li>\n"));
    }
    html.push_str("</ul>\n");

    html.push_str("<h2>Rollback</h2>\n<ul>\n");
    for repo in repositories {
        html.push_str(&format!(
            "<li>{repo}: revert to rollback/v-{} if deployment fails</li>\n",
            version.trim_start_matches('v')
        ));
    }
    html.push_str("</ul>\n");

    html.push_str(
        "<h2>Checklist</h2>\n<ul>\n\
         <li>All feature branches merged</li>\n\
         <li>All PRs approved</li>\n\
         <li>Release branches tagged</li>\n\
         <li>Rollback branches created</li>\n\
         </ul>\n",
    );

    html.push_str("<h2>Emergency Contacts</h2>\n<p>TBD</p>\n");

    html
}

/// Builds the release documentation page title; used both to render and to
/// look up an existing page before creating a new one (§4.H `documentation`).
pub fn page_title(version: &str) -> String {
    format!("Release {version} Deployment")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_fixed_sections() {
        let tickets = vec![Ticket {
            key: "PROJ-1".to_string(),
            summary: "Fix bug".to_string(),
            status: "Done".to_string(),
            fix_version: "v2.0.0".to_string(),
        }];
        let repos = vec!["api-service".to_string()];
        let html = render_release_page("v2.0.0", "sprint-1", &tickets, &repos);
        assert!(html.contains("PROJ-1"));
        assert!(html.contains("Deployment"));
        assert!(html.contains("Rollback"));
        assert!(html.contains("Checklist"));
        assert!(html.contains("Emergency Contacts"));
    }
}
