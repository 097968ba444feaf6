//! Transport abstraction for the digest-sync substrate.
//!
//! The transport layer publishes payloads, announces other sessions' new
//! sequence numbers and resolves fetches. Calls into a transport never block:
//! anything that completes later is delivered as a [`TransportEvent`].

use std::time::Duration;

use bytes::Bytes;

use parley_core::{Name, RootDigest, SeqNo, SessionId, SyncDiff};

use crate::error::Result;
use crate::fetch::{FetchCompletion, FetchRequest};

/// Something the transport reports to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A batch of sessions produced new sequence numbers.
    SyncUpdate(Vec<SyncDiff>),
    /// A fetch finished, successfully or not.
    FetchCompleted(FetchCompletion),
}

/// Transport trait for the presence engine.
///
/// All methods are called from the engine's single worker and must return
/// promptly.
pub trait Transport: Send {
    /// Join the sync group broadcasting under `sync_prefix` as a new local
    /// session, forgetting the previous one.
    fn reset(&mut self, sync_prefix: &Name, local_session: &SessionId);

    /// Publish `payload` as sequence number `seq` of the local session.
    fn publish(&mut self, seq: SeqNo, payload: Bytes, freshness: Duration) -> Result<()>;

    /// Start fetching a payload. The completion arrives later as
    /// [`TransportEvent::FetchCompleted`].
    fn fetch(&mut self, request: FetchRequest);

    /// Current root digest of the sync tree.
    fn root_digest(&self) -> RootDigest;
}

/// A transport that records everything for inspection.
///
/// Fetches are never resolved by the transport itself; tests feed
/// completions to the room directly.
pub mod recording {
    use super::*;
    use crate::error::SyncError;
    use parley_core::{ChatMessage, CoreError};

    /// One recorded publish.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Published {
        pub session: SessionId,
        pub seq: SeqNo,
        pub payload: Bytes,
        pub freshness: Duration,
    }

    impl Published {
        /// Decode the payload as a chat message.
        pub fn message(&self) -> std::result::Result<ChatMessage, CoreError> {
            ChatMessage::decode(&self.payload)
        }
    }

    /// Recording transport implementation.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        sync_prefix: Option<Name>,
        session: Option<SessionId>,
        sessions: Vec<SessionId>,
        published: Vec<Published>,
        fetches: Vec<FetchRequest>,
        digest: RootDigest,
        fail_publish: bool,
    }

    impl RecordingTransport {
        /// Create an empty recording transport.
        pub fn new() -> Self {
            Self::default()
        }

        /// The sync group joined by the last `reset`.
        pub fn sync_prefix(&self) -> Option<&Name> {
            self.sync_prefix.as_ref()
        }

        /// The session the transport currently publishes under.
        pub fn session(&self) -> Option<&SessionId> {
            self.session.as_ref()
        }

        /// Every session passed to `reset`, oldest first.
        pub fn sessions(&self) -> &[SessionId] {
            &self.sessions
        }

        /// Every successful publish, oldest first.
        pub fn published(&self) -> &[Published] {
            &self.published
        }

        /// Decoded messages of every successful publish.
        pub fn published_messages(&self) -> Vec<ChatMessage> {
            self.published
                .iter()
                .filter_map(|p| p.message().ok())
                .collect()
        }

        /// Fetch requests issued so far.
        pub fn fetches(&self) -> &[FetchRequest] {
            &self.fetches
        }

        /// Drain the recorded fetch requests.
        pub fn take_fetches(&mut self) -> Vec<FetchRequest> {
            std::mem::take(&mut self.fetches)
        }

        /// Set the digest reported by `root_digest`.
        pub fn set_root_digest(&mut self, digest: RootDigest) {
            self.digest = digest;
        }

        /// Make subsequent publishes fail.
        pub fn fail_publishes(&mut self, fail: bool) {
            self.fail_publish = fail;
        }
    }

    impl Transport for RecordingTransport {
        fn reset(&mut self, sync_prefix: &Name, local_session: &SessionId) {
            self.sync_prefix = Some(sync_prefix.clone());
            self.session = Some(local_session.clone());
            self.sessions.push(local_session.clone());
        }

        fn publish(&mut self, seq: SeqNo, payload: Bytes, freshness: Duration) -> Result<()> {
            let session = self.session.clone().ok_or(SyncError::NotInitialized)?;
            if self.fail_publish {
                return Err(SyncError::TransportError("publish refused".into()));
            }
            self.published.push(Published {
                session,
                seq,
                payload,
                freshness,
            });
            Ok(())
        }

        fn fetch(&mut self, request: FetchRequest) {
            self.fetches.push(request);
        }

        fn root_digest(&self) -> RootDigest {
            self.digest
        }
    }
}

/// An in-memory multicast network for multi-peer tests and simulations.
///
/// Members are partitioned into sync groups by the prefix passed to `reset`.
/// Every published payload is retained and announced to the other members of
/// the publisher's group as a single-sequence diff. A member that joins under
/// a new session receives one catch-up batch covering every session already
/// in its group.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    use tokio::sync::mpsc;

    use crate::error::SyncError;
    use crate::fetch::FetchOutcome;
    use crate::validator::{AcceptAll, Validator};

    /// Member record inside the network.
    struct Member {
        group: Option<Name>,
        session: Option<SessionId>,
        inbox: mpsc::UnboundedSender<TransportEvent>,
    }

    /// Highest published seq of a session and the group it publishes into.
    struct Head {
        group: Name,
        seq: SeqNo,
    }

    #[derive(Default)]
    struct NetworkState {
        /// Published payloads indexed by position.
        data: HashMap<(SessionId, SeqNo), Bytes>,
        /// Highest published seq per live session.
        heads: BTreeMap<SessionId, Head>,
        /// Connected members.
        members: HashMap<u64, Member>,
    }

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        state: Mutex<NetworkState>,
        validator: Arc<dyn Validator>,
        retry_delay: Duration,
        next_member: AtomicU64,
    }

    impl MemoryNetwork {
        /// Create a network that validates every payload.
        pub fn new() -> Arc<Self> {
            Self::with_validator(Arc::new(AcceptAll))
        }

        /// Create a network using `validator` for fetched payloads.
        pub fn with_validator(validator: Arc<dyn Validator>) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(NetworkState::default()),
                validator,
                retry_delay: Duration::from_millis(50),
                next_member: AtomicU64::new(0),
            })
        }

        /// Create a transport connected to this network, with the receiver
        /// its events are delivered on.
        ///
        /// Must be called from within a Tokio runtime; fetches are resolved
        /// on that runtime.
        pub async fn create_transport(
            self: &Arc<Self>,
        ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let member = self.next_member.fetch_add(1, Ordering::Relaxed);

            self.state().members.insert(
                member,
                Member {
                    group: None,
                    session: None,
                    inbox: tx,
                },
            );

            let transport = MemoryTransport {
                member,
                network: Arc::clone(self),
                runtime: tokio::runtime::Handle::current(),
            };
            (transport, rx)
        }

        /// Forget a published payload so fetches for it fail.
        pub fn drop_data(&self, session: &SessionId, seq: SeqNo) -> bool {
            self.state().data.remove(&(session.clone(), seq)).is_some()
        }

        /// Number of connected members.
        pub fn member_count(&self) -> usize {
            self.state().members.len()
        }

        /// Head sequence number of a session, if it published anything.
        pub fn head(&self, session: &SessionId) -> Option<SeqNo> {
            self.state().heads.get(session).map(|head| head.seq)
        }

        fn state(&self) -> MutexGuard<'_, NetworkState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn digest(&self, group: &Name) -> RootDigest {
            let state = self.state();
            let mut heads = state.heads.iter().filter(|(_, h)| &h.group == group).peekable();
            if heads.peek().is_none() {
                return RootDigest::ZERO;
            }
            let mut hasher = blake3::Hasher::new();
            hasher.update(b"parley-tree-v0:");
            hasher.update(group.to_string().as_bytes());
            for (session, head) in heads {
                hasher.update(session.to_string().as_bytes());
                hasher.update(&head.seq.to_be_bytes());
            }
            RootDigest(*hasher.finalize().as_bytes())
        }

        async fn resolve(&self, request: &FetchRequest) -> FetchOutcome {
            let attempts = request.retry_budget.max(1);
            for attempt in 1..=attempts {
                let found = self
                    .state()
                    .data
                    .get(&(request.session.clone(), request.seq))
                    .cloned();

                if let Some(payload) = found {
                    let validation = self
                        .validator
                        .validate(&request.session, request.seq, &payload)
                        .await;
                    return FetchOutcome::Fetched {
                        payload,
                        validation,
                    };
                }

                tracing::trace!(
                    session = %request.session,
                    seq = request.seq,
                    attempt,
                    "fetch miss"
                );
                if attempt < attempts {
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
            FetchOutcome::Failed {
                reason: format!("no data after {} attempts", attempts),
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        member: u64,
        network: Arc<MemoryNetwork>,
        runtime: tokio::runtime::Handle,
    }

    impl MemoryTransport {
        /// Session this transport currently publishes under.
        pub fn session(&self) -> Option<SessionId> {
            self.network
                .state()
                .members
                .get(&self.member)
                .and_then(|m| m.session.clone())
        }
    }

    impl Transport for MemoryTransport {
        fn reset(&mut self, sync_prefix: &Name, local_session: &SessionId) {
            let mut state = self.network.state();

            let previous = state.members.get_mut(&self.member).and_then(|m| {
                m.group = Some(sync_prefix.clone());
                m.session.replace(local_session.clone())
            });
            if let Some(previous) = previous {
                state.heads.remove(&previous);
            }

            let catch_up: Vec<SyncDiff> = state
                .heads
                .iter()
                .filter(|(session, head)| *session != local_session && &head.group == sync_prefix)
                .map(|(session, head)| SyncDiff::new(session.clone(), 1, head.seq))
                .collect();

            if !catch_up.is_empty() {
                if let Some(member) = state.members.get(&self.member) {
                    let _ = member.inbox.send(TransportEvent::SyncUpdate(catch_up));
                }
            }
        }

        fn publish(&mut self, seq: SeqNo, payload: Bytes, _freshness: Duration) -> Result<()> {
            let mut state = self.network.state();

            let (group, session) = state
                .members
                .get(&self.member)
                .and_then(|m| Some((m.group.clone()?, m.session.clone()?)))
                .ok_or(SyncError::NotInitialized)?;

            state.data.insert((session.clone(), seq), payload);
            let head = state.heads.entry(session.clone()).or_insert(Head {
                group: group.clone(),
                seq,
            });
            head.seq = head.seq.max(seq);

            for (id, member) in state.members.iter() {
                if *id == self.member
                    || member.session.is_none()
                    || member.group.as_ref() != Some(&group)
                {
                    continue;
                }
                // Ignore errors for broadcast (some members may have stopped)
                let _ = member
                    .inbox
                    .send(TransportEvent::SyncUpdate(vec![SyncDiff::single(
                        session.clone(),
                        seq,
                    )]));
            }
            Ok(())
        }

        fn fetch(&mut self, request: FetchRequest) {
            let inbox = match self.network.state().members.get(&self.member) {
                Some(member) => member.inbox.clone(),
                None => return,
            };
            let network = Arc::clone(&self.network);

            self.runtime.spawn(async move {
                let outcome = network.resolve(&request).await;
                let _ = inbox.send(TransportEvent::FetchCompleted(FetchCompletion {
                    request,
                    outcome,
                }));
            });
        }

        fn root_digest(&self) -> RootDigest {
            let group = self
                .network
                .state()
                .members
                .get(&self.member)
                .and_then(|m| m.group.clone());
            match group {
                Some(group) => self.network.digest(&group),
                None => RootDigest::ZERO,
            }
        }
    }

    impl Drop for MemoryTransport {
        fn drop(&mut self) {
            let mut state = self.network.state();
            if let Some(member) = state.members.remove(&self.member) {
                if let Some(session) = member.session {
                    state.heads.remove(&session);
                }
            }
        }
    }
}
