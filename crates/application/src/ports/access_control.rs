use std::net::SocketAddr;

pub trait AccessControl {
    /// Whether `client` may have its queries resolved recursively.
    fn allow_recursion(&self, client: SocketAddr) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn allow_recursion(&self, _client: SocketAddr) -> bool {
        true
    }
}
