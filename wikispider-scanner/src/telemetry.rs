/// Counter sink the traversal engine reports to.
pub trait Telemetry: Send + Sync {
    /// One per dispatched fetch.
    fn page_visited(&self, url: &str);

    /// One per eligible anchor, tagged with the title of the page it was found on.
    fn link_found(&self, page_title: &str);

    /// One per rejected or failed visit attempt.
    fn visit_error(&self, reason: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn page_visited(&self, _url: &str) {}

    fn link_found(&self, _page_title: &str) {}

    fn visit_error(&self, _reason: &str) {}
}
