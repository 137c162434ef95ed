//! Third-party adapter capability set (§6, §4.K): issue tracker, source
//! forge and wiki, expressed as traits plus deterministic mock realizations.
use crate::errors::AdapterResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub fix_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub key: String,
    pub name: String,
}

/// Issue-tracker capability set (§6).
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn tickets_by_fix_version(&self, fix_version: &str) -> AdapterResult<Vec<Ticket>>;
    async fn ticket(&self, key: &str) -> AdapterResult<Option<Ticket>>;
    async fn search(&self, jql: &str, max: usize) -> AdapterResult<Vec<Ticket>>;
    async fn projects(&self) -> AdapterResult<Vec<Project>>;
    async fn validate(&self) -> AdapterResult<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub head: String,
    pub base: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStatus {
    Merged,
    Unmerged,
    Conflict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    pub sha: String,
}

/// Source-forge (GitHub-shaped) capability set (§6).
#[async_trait]
pub trait SourceForge: Send + Sync {
    async fn repository(&self, name: &str) -> AdapterResult<Repository>;
    async fn branches(&self, repo: &str) -> AdapterResult<Vec<String>>;
    async fn find_feature_branches(&self, repo: &str, ticket_ids: &[String]) -> AdapterResult<Vec<String>>;
    async fn check_merge_status(&self, repo: &str, src: &str, dst: &str) -> AdapterResult<MergeStatus>;
    async fn create_pr(&self, repo: &str, title: &str, body: &str, head: &str, base: &str) -> AdapterResult<PullRequest>;
    async fn merge_branches(&self, repo: &str, src: &str, dst: &str) -> AdapterResult<MergeStatus>;
    async fn create_branch(&self, repo: &str, name: &str, source: &str) -> AdapterResult<()>;
    async fn create_tag(&self, repo: &str, name: &str, sha: &str, message: &str) -> AdapterResult<TagInfo>;
    async fn tags(&self, repo: &str) -> AdapterResult<Vec<TagInfo>>;
    async fn validate(&self) -> AdapterResult<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPage {
    pub id: String,
    pub space: String,
    pub title: String,
    pub content: String,
    pub version: u32,
}

/// Wiki (Confluence-shaped) capability set (§6).
#[async_trait]
pub trait Wiki: Send + Sync {
    async fn spaces(&self) -> AdapterResult<Vec<String>>;
    async fn page(&self, id: &str) -> AdapterResult<Option<WikiPage>>;
    async fn create_page(&self, space: &str, title: &str, content: &str, parent: Option<&str>) -> AdapterResult<WikiPage>;
    async fn update_page(&self, id: &str, title: &str, content: &str, version: u32) -> AdapterResult<WikiPage>;
    async fn search_pages(&self, space: &str, title: Option<&str>) -> AdapterResult<Vec<WikiPage>>;
    async fn delete_page(&self, id: &str) -> AdapterResult<()>;
    async fn create_deployment_page(&self, space: &str, version: &str, repos: &[String]) -> AdapterResult<WikiPage>;
    async fn validate(&self) -> AdapterResult<bool>;
}

/// Deterministic, seeded issue tracker used when `adapters.use_mock_apis` is set.
pub struct MockIssueTracker {
    tickets: Vec<Ticket>,
}

impl MockIssueTracker {
    pub fn new() -> Self {
        Self {
            tickets: vec![
                Ticket {
                    key: "PROJ-101".to_string(),
                    summary: "Fix login redirect".to_string(),
                    status: "Done".to_string(),
                    fix_version: "v2.0.0".to_string(),
                },
                Ticket {
                    key: "PROJ-102".to_string(),
                    summary: "Add dark mode".to_string(),
                    status: "Done".to_string(),
                    fix_version: "v2.0.0".to_string(),
                },
            ],
        }
    }
}

impl Default for MockIssueTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssueTracker for MockIssueTracker {
    async fn tickets_by_fix_version(&self, fix_version: &str) -> AdapterResult<Vec<Ticket>> {
        Ok(self
            .tickets
            .iter()
            .filter(|t| t.fix_version == fix_version)
            .cloned()
            .collect())
    }

    async fn ticket(&self, key: &str) -> AdapterResult<Option<Ticket>> {
        Ok(self.tickets.iter().find(|t| t.key == key).cloned())
    }

    async fn search(&self, _jql: &str, max: usize) -> AdapterResult<Vec<Ticket>> {
        Ok(self.tickets.iter().take(max).cloned().collect())
    }

    async fn projects(&self) -> AdapterResult<Vec<Project>> {
        Ok(vec![Project {
            key: "PROJ".to_string(),
            name: "Project".to_string(),
        }])
    }

    async fn validate(&self) -> AdapterResult<bool> {
        Ok(true)
    }
}

/// Deterministic, seeded source-forge adapter used when mocks are enabled.
/// State is mutable (branch/tag creation) and serialized behind a mutex so
/// the node bodies' concurrent per-repository work is safe.
pub struct MockSourceForge {
    branches: Mutex<HashMap<String, Vec<String>>>,
    tags: Mutex<HashMap<String, Vec<TagInfo>>>,
}

impl MockSourceForge {
    pub fn new() -> Self {
        let mut branches = HashMap::new();
        branches.insert(
            "api-service".to_string(),
            vec![
                "develop".to_string(),
                "master".to_string(),
                "feature/PROJ-101".to_string(),
                "feature/PROJ-102".to_string(),
            ],
        );
        branches.insert(
            "frontend-app".to_string(),
            vec![
                "develop".to_string(),
                "master".to_string(),
                "feature/PROJ-101".to_string(),
                "feature/PROJ-102".to_string(),
            ],
        );
        Self {
            branches: Mutex::new(branches),
            tags: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MockSourceForge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceForge for MockSourceForge {
    async fn repository(&self, name: &str) -> AdapterResult<Repository> {
        Ok(Repository {
            name: name.to_string(),
            default_branch: "main".to_string(),
        })
    }

    async fn branches(&self, repo: &str) -> AdapterResult<Vec<String>> {
        Ok(self.branches.lock().unwrap().get(repo).cloned().unwrap_or_default())
    }

    async fn find_feature_branches(&self, repo: &str, ticket_ids: &[String]) -> AdapterResult<Vec<String>> {
        let all = self.branches(repo).await?;
        Ok(ticket_ids
            .iter()
            .map(|id| format!("feature/{id}"))
            .filter(|b| all.contains(b))
            .collect())
    }

    async fn check_merge_status(&self, _repo: &str, _src: &str, _dst: &str) -> AdapterResult<MergeStatus> {
        Ok(MergeStatus::Merged)
    }

    async fn create_pr(&self, repo: &str, title: &str, _body: &str, head: &str, base: &str) -> AdapterResult<PullRequest> {
        Ok(PullRequest {
            number: 1,
            title: title.to_string(),
            head: head.to_string(),
            base: base.to_string(),
            url: format!("https://source-forge.local/{repo}/pull/1"),
        })
    }

    async fn merge_branches(&self, _repo: &str, _src: &str, _dst: &str) -> AdapterResult<MergeStatus> {
        Ok(MergeStatus::Merged)
    }

    async fn create_branch(&self, repo: &str, name: &str, _source: &str) -> AdapterResult<()> {
        let mut branches = self.branches.lock().unwrap();
        let entry = branches.entry(repo.to_string()).or_default();
        if !entry.contains(&name.to_string()) {
            entry.push(name.to_string());
        }
        Ok(())
    }

    async fn create_tag(&self, repo: &str, name: &str, sha: &str, _message: &str) -> AdapterResult<TagInfo> {
        let tag = TagInfo {
            name: name.to_string(),
            sha: sha.to_string(),
        };
        self.tags.lock().unwrap().entry(repo.to_string()).or_default().push(tag.clone());
        Ok(tag)
    }

    async fn tags(&self, repo: &str) -> AdapterResult<Vec<TagInfo>> {
        Ok(self.tags.lock().unwrap().get(repo).cloned().unwrap_or_default())
    }

    async fn validate(&self) -> AdapterResult<bool> {
        Ok(true)
    }
}

/// Deterministic, seeded wiki adapter used when mocks are enabled.
pub struct MockWiki {
    pages: Mutex<HashMap<String, WikiPage>>,
    next_id: Mutex<u64>,
}

impl MockWiki {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    fn alloc_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        let id = next.to_string();
        *next += 1;
        id
    }
}

impl Default for MockWiki {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Wiki for MockWiki {
    async fn spaces(&self) -> AdapterResult<Vec<String>> {
        Ok(vec!["RELEASES".to_string()])
    }

    async fn page(&self, id: &str) -> AdapterResult<Option<WikiPage>> {
        Ok(self.pages.lock().unwrap().get(id).cloned())
    }

    async fn create_page(&self, space: &str, title: &str, content: &str, _parent: Option<&str>) -> AdapterResult<WikiPage> {
        let id = self.alloc_id();
        let page = WikiPage {
            id: id.clone(),
            space: space.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            version: 1,
        };
        self.pages.lock().unwrap().insert(id, page.clone());
        Ok(page)
    }

    async fn update_page(&self, id: &str, title: &str, content: &str, version: u32) -> AdapterResult<WikiPage> {
        let mut pages = self.pages.lock().unwrap();
        let page = pages.entry(id.to_string()).or_insert_with(|| WikiPage {
            id: id.to_string(),
            space: "RELEASES".to_string(),
            title: title.to_string(),
            content: content.to_string(),
            version,
        });
        page.title = title.to_string();
        page.content = content.to_string();
        page.version = version + 1;
        Ok(page.clone())
    }

    async fn search_pages(&self, space: &str, title: Option<&str>) -> AdapterResult<Vec<WikiPage>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.space == space)
            .filter(|p| title.map(|t| p.title == t).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn delete_page(&self, id: &str) -> AdapterResult<()> {
        self.pages.lock().unwrap().remove(id);
        Ok(())
    }

    async fn create_deployment_page(&self, space: &str, version: &str, repos: &[String]) -> AdapterResult<WikiPage> {
        let title = format!("Release {version} Deployment");
        if let Some(existing) = self.search_pages(space, Some(&title)).await?.into_iter().next() {
            return self
                .update_page(&existing.id, &title, &format!("Repos: {}", repos.join(", ")), existing.version)
                .await;
        }
        self.create_page(space, &title, &format!("Repos: {}", repos.join(", ")), None).await
    }

    async fn validate(&self) -> AdapterResult<bool> {
        Ok(true)
    }
}

/// The three adapters a pipeline node body needs, bundled for convenient
/// injection into node closures.
#[derive(Clone)]
pub struct AdapterBundle {
    pub issue_tracker: std::sync::Arc<dyn IssueTracker>,
    pub source_forge: std::sync::Arc<dyn SourceForge>,
    pub wiki: std::sync::Arc<dyn Wiki>,
}

impl AdapterBundle {
    pub fn mock() -> Self {
        Self {
            issue_tracker: std::sync::Arc::new(MockIssueTracker::new()),
            source_forge: std::sync::Arc::new(MockSourceForge::new()),
            wiki: std::sync::Arc::new(MockWiki::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_issue_tracker_filters_by_fix_version() {
        let tracker = MockIssueTracker::new();
        let tickets = tracker.tickets_by_fix_version("v2.0.0").await.unwrap();
        assert_eq!(tickets.len(), 2);
    }

    #[tokio::test]
    async fn mock_source_forge_finds_feature_branches() {
        let sf = MockSourceForge::new();
        let found = sf
            .find_feature_branches("api-service", &["PROJ-101".to_string(), "PROJ-999".to_string()])
            .await
            .unwrap();
        assert_eq!(found, vec!["feature/PROJ-101".to_string()]);
    }

    #[tokio::test]
    async fn mock_wiki_deployment_page_is_idempotent() {
        let wiki = MockWiki::new();
        let first = wiki
            .create_deployment_page("RELEASES", "v2.0.0", &["api-service".to_string()])
            .await
            .unwrap();
        let second = wiki
            .create_deployment_page("RELEASES", "v2.0.0", &["api-service".to_string(), "frontend-app".to_string()])
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.version, 2);
    }
}
