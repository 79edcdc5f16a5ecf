use lodestone_dns_domain::DomainError;
use std::net::SocketAddr;

/// Outbound side of the server. Sends never block; a failed send is reported
/// and the caller moves on.
pub trait Transport {
    /// Reply to a client on the socket its request arrived on.
    fn send_to_client(&self, client: SocketAddr, bytes: &[u8]) -> Result<(), DomainError>;

    /// Datagram to an upstream server.
    fn send_datagram(&self, server: SocketAddr, bytes: &[u8]) -> Result<(), DomainError>;

    /// Stream (TCP) exchange with an upstream server. The reply is fed back
    /// through the same path as datagram replies.
    fn send_stream(&self, server: SocketAddr, bytes: &[u8]) -> Result<(), DomainError>;
}
