use proptest::prelude::*;

use crate::{
    envelope::IceCandidate,
    state::Phase,
    traits::MealyMachine,
    types::{Interests, Role},
};

// ─── Interest generators ────────────────────────────────────────────────────

pub fn arb_tag() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("games".to_string()),
        Just("art".to_string()),
        Just("music".to_string()),
        Just("travel".to_string()),
        "[a-z]{1,8}",
    ]
}

pub fn arb_interests() -> impl Strategy<Value = Interests> {
    prop::collection::vec(arb_tag(), 0..4).prop_map(Interests::new)
}

/// Raw tag lists as a user might type them: mixed case, padding, blanks.
pub fn arb_raw_tags() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        (arb_tag(), any::<bool>(), " {0,2}").prop_map(|(tag, upper, pad)| {
            let tag = match upper {
                true => tag.to_uppercase(),
                false => tag,
            };
            format!("{pad}{tag}{pad}")
        }),
        0..5,
    )
}

// ─── State generators ───────────────────────────────────────────────────────

pub fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Initiator), Just(Role::Receiver)]
}

pub fn arb_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Idle),
        Just(Phase::AcquiringMedia),
        Just(Phase::ConnectingTransport),
        Just(Phase::WaitingForMatch),
        Just(Phase::Paired),
        Just(Phase::Connected),
        Just(Phase::Disconnected),
        Just(Phase::PeerLeft),
        Just(Phase::TransportError),
        Just(Phase::MediaError),
    ]
}

pub fn arb_candidate() -> impl Strategy<Value = IceCandidate> {
    (1u32..=4, any::<u32>(), 1024u16..65535, any::<u8>()).prop_map(
        |(component, priority, port, host)| IceCandidate {
            candidate: format!(
                "candidate:{component} 1 udp {priority} 192.168.0.{host} {port} typ host"
            ),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        },
    )
}

pub fn arb_candidates() -> impl Strategy<Value = Vec<IceCandidate>> {
    prop::collection::vec(arb_candidate(), 0..8)
}

pub fn arb_chat_lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 ?!]{1,24}", 0..10)
}

// ─── Drivers ────────────────────────────────────────────────────────────────

/// Feed `events` through `machine` in order, collecting every command.
pub fn run_events<M: MealyMachine>(machine: M, events: Vec<M::Event>) -> (M, Vec<M::Command>) {
    events
        .into_iter()
        .fold((machine, Vec::new()), |(state, mut all), event| {
            let (state, commands) = state.transition(event);
            all.extend(commands);
            (state, all)
        })
}
