//! Proptest generators for property-based testing.

use proptest::prelude::*;

use parley_core::{ChatMessage, MessageKind, Name, SeqNo, SessionId, SyncDiff};

/// Generate a name component.
pub fn name_component() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,11}".prop_map(String::from)
}

/// Generate a name with 1 to `max_len` components.
pub fn name(max_len: usize) -> impl Strategy<Value = Name> {
    prop::collection::vec(name_component(), 1..=max_len.max(1)).prop_map(|components| {
        components
            .into_iter()
            .fold(Name::empty(), |name, component| name.append(component))
    })
}

/// Generate a session id shaped like `<identity>/CHRONOCHAT-CHATDATA/<room>/<n>`.
pub fn session_id() -> impl Strategy<Value = SessionId> {
    (name(3), name_component(), any::<u32>()).prop_map(|(identity, room, number)| {
        SessionId::new(
            identity
                .append("CHRONOCHAT-CHATDATA")
                .append(room)
                .append(number.to_string()),
        )
    })
}

/// Generate a valid sequence number (1-indexed).
pub fn seq() -> impl Strategy<Value = SeqNo> {
    1u64..=1_000_000
}

/// Generate a reasonable timestamp in seconds.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800
}

/// Generate a well-formed diff with a gap of at most `max_gap`.
pub fn sync_diff(max_gap: u64) -> impl Strategy<Value = SyncDiff> {
    (session_id(), seq(), 0..=max_gap)
        .prop_map(|(session, low, gap)| SyncDiff::new(session, low, low + gap))
}

/// Generate a batch of up to `max_len` diffs.
pub fn diff_batch(max_len: usize) -> impl Strategy<Value = Vec<SyncDiff>> {
    prop::collection::vec(sync_diff(10), 0..=max_len)
}

/// Generate a MessageKind.
pub fn message_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::Join),
        Just(MessageKind::Hello),
        Just(MessageKind::Leave),
        Just(MessageKind::Chat),
        Just(MessageKind::Other),
    ]
}

/// Generate a nickname.
pub fn nickname() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 _]{0,15}".prop_map(String::from)
}

/// Parameters for generating a message.
#[derive(Debug, Clone)]
pub struct MessageParams {
    pub kind: MessageKind,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
    pub text: String,
}

impl Arbitrary for MessageParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            message_kind(),
            nickname(),
            name_component(),
            timestamp(),
            ".{0,64}",
        )
            .prop_map(|(kind, from, to, timestamp, text)| MessageParams {
                kind,
                from,
                to,
                timestamp,
                text,
            })
            .boxed()
    }
}

/// Build a message from parameters. Only CHAT carries the text.
pub fn message_from_params(params: &MessageParams) -> ChatMessage {
    let data = (params.kind == MessageKind::Chat).then(|| params.text.clone());
    ChatMessage::new(
        params.kind,
        params.from.as_str(),
        params.to.as_str(),
        params.timestamp,
        data,
    )
}
