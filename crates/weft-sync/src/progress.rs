/// Progress callbacks for a push.
pub trait PushProgress: Send + Sync {
    /// Called after every upload round with the totals so far.
    fn uploaded(&self, uploaded: usize, remaining: usize);
}

/// Progress callbacks for a pull.
pub trait PullProgress: Send + Sync {
    /// Entities whose download just completed.
    fn downloaded(&self, count: usize);

    /// Entities newly scheduled for download.
    fn queued_for_download(&self, count: usize);
}

/// Discards all progress reports.
pub struct NoProgress;

impl PushProgress for NoProgress {
    fn uploaded(&self, _uploaded: usize, _remaining: usize) {}
}

impl PullProgress for NoProgress {
    fn downloaded(&self, _count: usize) {}

    fn queued_for_download(&self, _count: usize) {}
}
