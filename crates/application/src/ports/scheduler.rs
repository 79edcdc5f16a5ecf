/// The single retry timer. Arming replaces any previous deadline.
pub trait Scheduler {
    /// Fire once at `deadline_ms` (unix milliseconds).
    fn arm(&self, deadline_ms: u64);

    fn disarm(&self);
}
