use bytes::Bytes;
use rand::Rng;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use dns_types::protocol::serialise;
use dns_types::protocol::types::*;

/// Size of the receive buffer.  Longer datagrams are truncated.
pub const RECV_BUFFER_LEN: usize = 1024;

/// How long to wait for each reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A reply to a query, paired with the transaction ID the query was
/// sent with.  Not every `Transport` checks the octets against the
/// ID: consumers MUST do that before trusting the decoded response.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServerResponse {
    pub id: u16,
    pub octets: Bytes,
}

/// Something which can ask a nameserver a question.
///
/// Queries are made one at a time.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send a query for `question` to `server` and wait for the reply.
    ///
    /// # Errors
    ///
    /// If the query cannot be encoded, sent, or received.  Timeouts
    /// are not errors.
    async fn query(
        &self,
        question: &Question,
        server: SocketAddr,
    ) -> Result<ServerResponse, TransportError>;
}

/// A query which has been sent but not yet answered.
#[derive(Debug, Clone)]
pub struct Outstanding {
    pub id: u16,
    datagram: Bytes,
    server: SocketAddr,
}

/// The real transport: a single UDP socket on an ephemeral port.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    timeout: Duration,
}

impl UdpTransport {
    /// # Errors
    ///
    /// If the socket cannot be bound.
    pub async fn bind(timeout: Duration) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        tracing::debug!(local_addr = ?socket.local_addr().ok(), ?timeout, "bound socket");
        Ok(Self { socket, timeout })
    }

    /// Encode and send a query with a fresh random transaction ID.
    ///
    /// # Errors
    ///
    /// If the question cannot be encoded, or sending fails.
    pub async fn send(
        &self,
        question: &Question,
        server: SocketAddr,
    ) -> Result<Outstanding, TransportError> {
        let query = Query {
            id: rand::thread_rng().gen(),
            question: question.clone(),
        };
        let datagram = query.to_octets()?;

        tracing::trace!(id = %query.id, %question, %server, "sending query");
        self.socket.send_to(&datagram, server).await?;

        Ok(Outstanding {
            id: query.id,
            datagram,
            server,
        })
    }

    /// Wait for a reply.  If none arrives in time the query is sent
    /// again and there is one more wait.  If that times out too, the
    /// result is a zero-filled buffer, which decodes to a response
    /// with no records.
    ///
    /// # Errors
    ///
    /// If resending or receiving fails.
    pub async fn receive(&self, outstanding: &Outstanding) -> Result<Bytes, TransportError> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        if let Some(len) = self.wait_for_reply(outstanding, &mut buf).await? {
            tracing::trace!(%len, "received reply");
            buf.truncate(len);
            return Ok(Bytes::from(buf));
        }

        tracing::debug!(id = %outstanding.id, server = %outstanding.server, "timed out - resending");
        self.socket
            .send_to(&outstanding.datagram, outstanding.server)
            .await?;

        if let Some(len) = self.wait_for_reply(outstanding, &mut buf).await? {
            tracing::trace!(%len, "received reply after resend");
            buf.truncate(len);
            return Ok(Bytes::from(buf));
        }

        tracing::warn!(id = %outstanding.id, server = %outstanding.server, "timed out twice");
        Ok(Bytes::from(vec![0u8; RECV_BUFFER_LEN]))
    }

    /// Read datagrams until one comes from the queried server with the
    /// query's ID, or until the timeout.  Anything else, such as a late
    /// reply to an earlier query, is dropped.
    async fn wait_for_reply(
        &self,
        outstanding: &Outstanding,
        buf: &mut [u8],
    ) -> Result<Option<usize>, TransportError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let Ok(res) = timeout_at(deadline, self.socket.recv_from(buf)).await else {
                return Ok(None);
            };
            let (len, from) = res?;

            if from == outstanding.server && len >= 2 && buf[..2] == outstanding.id.to_be_bytes() {
                return Ok(Some(len));
            }

            tracing::debug!(id = %outstanding.id, %len, %from, "dropping stray datagram");
        }
    }
}

impl Transport for UdpTransport {
    async fn query(
        &self,
        question: &Question,
        server: SocketAddr,
    ) -> Result<ServerResponse, TransportError> {
        let outstanding = self.send(question, server).await?;
        let octets = self.receive(&outstanding).await?;
        Ok(ServerResponse {
            id: outstanding.id,
            octets,
        })
    }
}

/// Errors from talking to a nameserver.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not encode query: {0}")]
    Encode(#[from] serialise::Error),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(any(feature = "test-util", test))]
#[allow(clippy::missing_panics_doc)]
pub mod test_util {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::net::IpAddr;

    use dns_types::protocol::types::test_util::*;

    use super::*;

    /// A transport which answers from a script, keyed by server
    /// address and question.  Unscripted queries get the zero-filled
    /// buffer, as if they timed out twice.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        script: HashMap<(IpAddr, Question), Scripted>,
        queries: RefCell<Vec<(IpAddr, Question)>>,
    }

    #[derive(Debug, Clone)]
    struct Scripted {
        id_matches: bool,
        answers: Vec<ResourceRecord>,
        authority: Vec<ResourceRecord>,
        additional: Vec<ResourceRecord>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer(
            &mut self,
            server: Ipv4Addr,
            question: &Question,
            answers: &[ResourceRecord],
            authority: &[ResourceRecord],
            additional: &[ResourceRecord],
        ) {
            self.script.insert(
                (IpAddr::V4(server), question.clone()),
                Scripted {
                    id_matches: true,
                    answers: answers.into(),
                    authority: authority.into(),
                    additional: additional.into(),
                },
            );
        }

        /// Like `answer`, but the reply carries the wrong transaction ID.
        pub fn answer_with_wrong_id(
            &mut self,
            server: Ipv4Addr,
            question: &Question,
            answers: &[ResourceRecord],
        ) {
            self.script.insert(
                (IpAddr::V4(server), question.clone()),
                Scripted {
                    id_matches: false,
                    answers: answers.into(),
                    authority: Vec::new(),
                    additional: Vec::new(),
                },
            );
        }

        /// Every query made so far, in order.
        pub fn queries(&self) -> Vec<(IpAddr, Question)> {
            self.queries.borrow().clone()
        }
    }

    impl Transport for ScriptedTransport {
        async fn query(
            &self,
            question: &Question,
            server: SocketAddr,
        ) -> Result<ServerResponse, TransportError> {
            let id = {
                let mut queries = self.queries.borrow_mut();
                queries.push((server.ip(), question.clone()));
                u16::try_from(queries.len()).unwrap()
            };

            let octets = match self.script.get(&(server.ip(), question.clone())) {
                Some(scripted) => response_octets(
                    if scripted.id_matches { id } else { !id },
                    true,
                    question,
                    &scripted.answers,
                    &scripted.authority,
                    &scripted.additional,
                ),
                None => vec![0; RECV_BUFFER_LEN],
            };

            Ok(ServerResponse {
                id,
                octets: Bytes::from(octets),
            })
        }
    }
}
