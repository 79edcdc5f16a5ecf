pub trait Clock {
    /// Wall clock in unix milliseconds.
    fn now_ms(&self) -> u64;

    fn now_secs(&self) -> u64 {
        self.now_ms() / 1000
    }
}
