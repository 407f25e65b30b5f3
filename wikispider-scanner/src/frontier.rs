use crate::error::VisitRejection;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Per-fetch state carried with a URL from the moment it is accepted until
/// its page has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub url: String,
    pub depth: usize,
    pub title: Option<String>,
}

impl RequestContext {
    pub fn new(url: String, depth: usize) -> Self {
        Self {
            url,
            depth,
            title: None,
        }
    }

    /// Title of the page as seen so far, empty if none was found.
    pub fn page_title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// Host check shared by admission and redirect following. The port is
/// ignored and an empty allow-list admits every host.
pub fn is_allowed_host(allowed_domains: &HashSet<String>, url: &Url) -> bool {
    if allowed_domains.is_empty() {
        return true;
    }
    url.host_str()
        .map(|h| allowed_domains.contains(h))
        .unwrap_or(false)
}

#[derive(Default)]
struct FrontierState {
    queue: VecDeque<RequestContext>,
    visited: HashSet<String>,
    in_flight: usize,
    accepted: usize,
}

/// Shared work queue of a crawl run.
///
/// Admission enforces, in order: cancellation, the depth bound, the domain
/// allow-list and the visited set. A run is drained once the queue is empty
/// and nothing is in flight.
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    max_depth: usize,
    allowed_domains: HashSet<String>,
    cancel: CancellationToken,
}

impl Frontier {
    pub fn new<I>(max_depth: usize, allowed_domains: I, cancel: CancellationToken) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            max_depth,
            allowed_domains: allowed_domains.into_iter().collect(),
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// An empty allow-list admits every host.
    pub fn is_allowed_domain(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| is_allowed_host(&self.allowed_domains, &u))
            .unwrap_or(false)
    }

    fn admit(&self, state: &mut FrontierState, url: &str, depth: usize) -> Result<(), VisitRejection> {
        if self.cancel.is_cancelled() {
            return Err(VisitRejection::Cancelled);
        }
        if depth > self.max_depth {
            return Err(VisitRejection::MaxDepth);
        }
        if Url::parse(url).is_err() {
            return Err(VisitRejection::InvalidUrl);
        }
        if !self.is_allowed_domain(url) {
            return Err(VisitRejection::ForbiddenDomain);
        }
        if !state.visited.insert(url.to_string()) {
            return Err(VisitRejection::AlreadyVisited);
        }
        state.accepted += 1;
        Ok(())
    }

    /// Accept the start page at depth 0. It is returned directly rather than
    /// queued and counts as in flight until [`Frontier::complete`].
    pub fn admit_seed(&self, url: &str) -> Result<RequestContext, VisitRejection> {
        let mut state = self.lock();
        self.admit(&mut state, url, 0)?;
        state.in_flight += 1;
        Ok(RequestContext::new(url.to_string(), 0))
    }

    /// Queue `url` for a later fetch at `depth`.
    pub fn push(&self, url: &str, depth: usize) -> Result<(), VisitRejection> {
        {
            let mut state = self.lock();
            self.admit(&mut state, url, depth)?;
            state
                .queue
                .push_back(RequestContext::new(url.to_string(), depth));
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Wait for the next URL to fetch. Returns `None` once the frontier is
    /// drained or the run has been cancelled.
    pub async fn next(&self) -> Option<RequestContext> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if self.cancel.is_cancelled() {
                    return None;
                }
                if let Some(ctx) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(ctx);
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.cancel.cancelled() => return None,
            }
        }
    }

    /// Mark one in-flight URL as handled.
    pub fn complete(&self) {
        let drained = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0 && state.queue.is_empty()
        };
        if drained {
            self.notify.notify_waiters();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of URLs ever accepted, the seed included.
    pub fn accepted(&self) -> usize {
        self.lock().accepted
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Completes an in-flight URL when dropped, so a panicking page handler
/// cannot leave the frontier waiting forever.
pub struct InFlight<'a> {
    frontier: &'a Frontier,
}

impl<'a> InFlight<'a> {
    pub fn new(frontier: &'a Frontier) -> Self {
        Self { frontier }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.frontier.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier(max_depth: usize, domains: &[&str]) -> Frontier {
        Frontier::new(
            max_depth,
            domains.iter().map(|d| d.to_string()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_depth_bound() {
        let f = frontier(1, &["example.org"]);
        assert!(f.push("https://example.org/wiki/A", 1).is_ok());
        assert_eq!(
            f.push("https://example.org/wiki/B", 2),
            Err(VisitRejection::MaxDepth)
        );
    }

    #[test]
    fn test_zero_depth_rejects_every_child() {
        let f = frontier(0, &["example.org"]);
        f.admit_seed("https://example.org/wiki/Start").unwrap();
        assert_eq!(
            f.push("https://example.org/wiki/A", 1),
            Err(VisitRejection::MaxDepth)
        );
        assert_eq!(f.pending(), 0);
        assert_eq!(f.accepted(), 1);
    }

    #[test]
    fn test_allowed_host_ignores_port() {
        let allowed: HashSet<String> = ["127.0.0.1".to_string()].into_iter().collect();
        let local = Url::parse("http://127.0.0.1:8080/wiki/A").unwrap();
        let other = Url::parse("http://localhost:8080/wiki/A").unwrap();

        assert!(is_allowed_host(&allowed, &local));
        assert!(!is_allowed_host(&allowed, &other));
        assert!(is_allowed_host(&HashSet::new(), &other));
    }

    #[test]
    fn test_forbidden_domain() {
        let f = frontier(3, &["en.wikipedia.org"]);
        assert_eq!(
            f.push("https://de.wikipedia.org/wiki/Idaho", 1),
            Err(VisitRejection::ForbiddenDomain)
        );
        assert!(f.push("https://en.wikipedia.org/wiki/Idaho", 1).is_ok());
    }

    #[test]
    fn test_port_is_ignored_for_domain_check() {
        let f = frontier(3, &["127.0.0.1"]);
        assert!(f.push("http://127.0.0.1:8080/wiki/Idaho", 1).is_ok());
    }

    #[test]
    fn test_empty_allow_list_admits_all() {
        let f = frontier(3, &[]);
        assert!(f.push("https://anywhere.example/wiki/Idaho", 1).is_ok());
    }

    #[test]
    fn test_already_visited() {
        let f = frontier(3, &["example.org"]);
        f.admit_seed("https://example.org/wiki/Start").unwrap();
        assert_eq!(
            f.push("https://example.org/wiki/Start", 1),
            Err(VisitRejection::AlreadyVisited)
        );
    }

    #[test]
    fn test_invalid_url() {
        let f = frontier(3, &[]);
        assert_eq!(f.push("/wiki/Idaho", 1), Err(VisitRejection::InvalidUrl));
    }

    #[test]
    fn test_cancelled_rejects_pushes() {
        let token = CancellationToken::new();
        let f = Frontier::new(3, Vec::new(), token.clone());
        token.cancel();
        assert_eq!(
            f.push("https://example.org/wiki/A", 1),
            Err(VisitRejection::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_next_drains_in_order() {
        let f = frontier(3, &["example.org"]);
        f.push("https://example.org/wiki/A", 1).unwrap();
        f.push("https://example.org/wiki/B", 1).unwrap();

        let a = f.next().await.unwrap();
        assert_eq!(a.url, "https://example.org/wiki/A");
        f.complete();
        let b = f.next().await.unwrap();
        assert_eq!(b.url, "https://example.org/wiki/B");
        f.complete();

        assert!(f.next().await.is_none());
        assert_eq!(f.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_waiting_worker_wakes_on_push() {
        let f = std::sync::Arc::new(frontier(3, &["example.org"]));
        let seed = f.admit_seed("https://example.org/wiki/Start").unwrap();
        assert_eq!(seed.depth, 0);

        let waiter = {
            let f = f.clone();
            tokio::spawn(async move { f.next().await })
        };
        tokio::task::yield_now().await;

        f.push("https://example.org/wiki/A", 1).unwrap();
        let next = waiter.await.unwrap().unwrap();
        assert_eq!(next.url, "https://example.org/wiki/A");
        assert_eq!(next.depth, 1);
    }

    #[tokio::test]
    async fn test_waiting_worker_exits_when_drained() {
        let f = std::sync::Arc::new(frontier(3, &["example.org"]));
        f.admit_seed("https://example.org/wiki/Start").unwrap();

        let waiter = {
            let f = f.clone();
            tokio::spawn(async move { f.next().await })
        };
        tokio::task::yield_now().await;

        f.complete();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting_workers() {
        let token = CancellationToken::new();
        let f = std::sync::Arc::new(Frontier::new(3, Vec::new(), token.clone()));
        f.admit_seed("https://example.org/wiki/Start").unwrap();

        let waiter = {
            let f = f.clone();
            tokio::spawn(async move { f.next().await })
        };
        tokio::task::yield_now().await;

        token.cancel();
        assert!(waiter.await.unwrap().is_none());
    }
}
