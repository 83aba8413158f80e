//! `PeerConnector` backed by webrtc-rs.
//!
//! The initiator creates the `chat` data channel; the receiver adopts the one
//! announced by the remote side. Local capture is not published, so media
//! transceivers are receive-only.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use webrtc::{
    api::{
        APIBuilder, interceptor_registry::register_default_interceptors, media_engine::MediaEngine,
    },
    data_channel::{
        RTCDataChannel, data_channel_message::DataChannelMessage,
        data_channel_state::RTCDataChannelState,
    },
    ice_transport::{ice_candidate::RTCIceCandidateInit, ice_server::RTCIceServer},
    interceptor::registry::Registry,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
    rtp_transceiver::{
        RTCRtpTransceiverInit, rtp_codec::RTPCodecType,
        rtp_transceiver_direction::RTCRtpTransceiverDirection,
    },
};

use super::peer::{HandshakeError, PeerConnector, PeerLink, PeerSignals};
use crate::{
    envelope::{self, IceCandidate, PeerMessage, SdpKind, SessionDescription},
    protocol::{DATA_CHANNEL_LABEL, DEFAULT_STUN_SERVERS},
    state::LinkState,
    types::{MediaHandle, Role},
};

type SharedChannel = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

#[derive(Debug, Clone)]
pub struct RtcConnector {
    ice_servers: Vec<String>,
}

impl Default for RtcConnector {
    fn default() -> Self {
        Self::new(DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect())
    }
}

impl RtcConnector {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }

    async fn peer_connection(&self) -> Result<RTCPeerConnection, HandshakeError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = match self.ice_servers.is_empty() {
            true => vec![],
            false => vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        Ok(api.new_peer_connection(config).await?)
    }
}

#[async_trait]
impl PeerConnector for RtcConnector {
    async fn open(
        &self,
        role: Role,
        local_media: Option<MediaHandle>,
        signals: PeerSignals,
    ) -> Result<Box<dyn PeerLink>, HandshakeError> {
        let pc = Arc::new(self.peer_connection().await?);
        let channel: SharedChannel = Arc::new(Mutex::new(None));

        let ice = signals.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let signals = ice.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => signals.local_candidate(from_init(init)),
                    Err(e) => tracing::debug!(error = %e, "unserializable local candidate"),
                }
            })
        }));

        let state = signals.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let signals = state.clone();
            Box::pin(async move {
                if let Some(link) = link_state(s) {
                    signals.link_state(link);
                }
            })
        }));

        let tracks = signals.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let signals = tracks.clone();
            Box::pin(async move {
                tracing::debug!(kind = %track.kind(), "remote track");
                signals.remote_media(MediaHandle::new(format!("remote-{}", track.id())));
            })
        }));

        match role {
            Role::Initiator => {
                if local_media.is_some() {
                    for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
                        pc.add_transceiver_from_kind(
                            kind,
                            Some(RTCRtpTransceiverInit {
                                direction: RTCRtpTransceiverDirection::Recvonly,
                                send_encodings: vec![],
                            }),
                        )
                        .await?;
                    }
                }
                let dc = pc.create_data_channel(DATA_CHANNEL_LABEL, None).await?;
                wire_channel(&dc, &signals);
                *channel.lock().await = Some(dc);
            }
            Role::Receiver => {
                let adopted = Arc::clone(&channel);
                let announced = signals.clone();
                pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                    let channel = Arc::clone(&adopted);
                    let signals = announced.clone();
                    Box::pin(async move {
                        if dc.label() != DATA_CHANNEL_LABEL {
                            tracing::debug!(label = %dc.label(), "ignoring unexpected data channel");
                            return;
                        }
                        wire_channel(&dc, &signals);
                        *channel.lock().await = Some(dc);
                    })
                }));
            }
        }

        Ok(Box::new(RtcLink { pc, channel }))
    }
}

fn wire_channel(dc: &Arc<RTCDataChannel>, signals: &PeerSignals) {
    let opened = signals.clone();
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            opened.channel_opened();
        })
    }));

    let closed = signals.clone();
    dc.on_close(Box::new(move || {
        let signals = closed.clone();
        Box::pin(async move {
            signals.channel_closed();
        })
    }));

    let inbound = signals.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let signals = inbound.clone();
        Box::pin(async move {
            match msg.is_string {
                true => match std::str::from_utf8(&msg.data) {
                    Ok(text) => signals.message(text),
                    Err(e) => tracing::debug!(error = %e, "non-utf8 text frame"),
                },
                false => tracing::debug!(len = msg.data.len(), "ignoring binary frame"),
            }
        })
    }));
}

fn link_state(state: RTCPeerConnectionState) -> Option<LinkState> {
    match state {
        RTCPeerConnectionState::New | RTCPeerConnectionState::Connecting => {
            Some(LinkState::Connecting)
        }
        RTCPeerConnectionState::Connected => Some(LinkState::Connected),
        RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
        RTCPeerConnectionState::Failed => Some(LinkState::Failed),
        RTCPeerConnectionState::Closed => Some(LinkState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

// ─── Link ───────────────────────────────────────────────────────────────────

struct RtcLink {
    pc: Arc<RTCPeerConnection>,
    channel: SharedChannel,
}

impl RtcLink {
    async fn local(&self, kind: SdpKind) -> Result<SessionDescription, HandshakeError> {
        let local = self
            .pc
            .local_description()
            .await
            .ok_or(HandshakeError::MissingLocalDescription(kind))?;
        Ok(SessionDescription {
            kind,
            sdp: local.sdp,
        })
    }
}

#[async_trait]
impl PeerLink for RtcLink {
    async fn create_offer(&self) -> Result<SessionDescription, HandshakeError> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        self.local(SdpKind::Offer).await
    }

    async fn create_answer(&self) -> Result<SessionDescription, HandshakeError> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer).await?;
        self.local(SdpKind::Answer).await
    }

    async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), HandshakeError> {
        let remote = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        };
        self.pc.set_remote_description(remote).await?;
        Ok(())
    }

    async fn apply_candidate(&self, candidate: IceCandidate) -> Result<(), HandshakeError> {
        self.pc.add_ice_candidate(to_init(candidate)).await?;
        Ok(())
    }

    async fn send(&self, message: &PeerMessage) -> Result<(), HandshakeError> {
        let channel = self.channel.lock().await.clone();
        let dc = match channel {
            Some(dc) if dc.ready_state() == RTCDataChannelState::Open => dc,
            Some(_) | None => return Err(HandshakeError::ChannelClosed),
        };
        let text = envelope::encode(message)?;
        dc.send_text(text).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), HandshakeError> {
        self.pc.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_states_map_onto_link_states() {
        assert_eq!(link_state(RTCPeerConnectionState::New), Some(LinkState::Connecting));
        assert_eq!(link_state(RTCPeerConnectionState::Connected), Some(LinkState::Connected));
        assert_eq!(link_state(RTCPeerConnectionState::Failed), Some(LinkState::Failed));
        assert_eq!(link_state(RTCPeerConnectionState::Unspecified), None);
    }

    #[test]
    fn candidate_conversion_keeps_every_field() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.0.2.1 50000 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: Some("abcd".to_string()),
        };
        assert_eq!(from_init(to_init(candidate.clone())), candidate);
    }

    #[tokio::test]
    async fn initiator_produces_an_offer_with_a_data_channel() {
        let (events_tx, _events) = tokio::sync::mpsc::unbounded_channel();
        let signals = PeerSignals::new(crate::types::Epoch::initial(), events_tx);
        let link = RtcConnector::new(vec![])
            .open(Role::Initiator, None, signals)
            .await
            .expect("peer connection builds offline");

        let offer = link.create_offer().await.expect("offer");
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.contains("webrtc-datachannel"));
        assert!(matches!(
            link.send(&PeerMessage::Typing(crate::envelope::TypingPayload { is_typing: true })).await,
            Err(HandshakeError::ChannelClosed)
        ));
        link.close().await.expect("close");
    }
}
