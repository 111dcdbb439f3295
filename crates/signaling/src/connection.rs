//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Beim Aufbau vergibt der Server die Teilnehmer-ID und
//! meldet sie mit `welcome`.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Kommt `verbindungs_timeout_sek` lang kein Frame, wird getrennt

use futures_util::{SinkExt, StreamExt};
use nexus_core::types::ParticipantId;
use nexus_protocol::signal::{ErrorCode, SignalMessage, SignalPayload};
use nexus_protocol::wire::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht. Generisch ueber den Stream, damit Tests mit
    /// `tokio::io::duplex` arbeiten koennen.
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: tokio::sync::watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        let mut framed = Framed::new(stream, FrameCodec::with_max_size(self.state.config.max_frame_size));

        let participant = ParticipantId::new();
        let mut ausgehend = self.state.broadcaster.client_registrieren(participant);
        let mut ctx = DispatcherContext::neu(peer_addr, participant);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        tracing::info!(peer = %peer_addr, participant = %participant, "Neue Verbindung");

        let welcome = SignalMessage::new(SignalPayload::Welcome {
            participant_id: participant,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        });
        if let Err(e) = framed.send(welcome).await {
            tracing::warn!(peer = %peer_addr, fehler = %e, "Welcome konnte nicht gesendet werden");
            dispatcher.client_cleanup(&mut ctx).await;
            return;
        }

        let mut letzter_empfang = Instant::now();
        let mut keepalive = interval_at(Instant::now() + keepalive_intervall, keepalive_intervall);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(
                                peer = %peer_addr,
                                typ = nachricht.payload.typ(),
                                "Nachricht empfangen"
                            );

                            if let Some(antwort) = dispatcher.dispatch(nachricht, &mut ctx).await {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus dem Broadcaster
                ausgabe = ausgehend.recv() => {
                    let Some(nachricht) = ausgabe else {
                        // Broadcaster hat den Client nach Queue-Ueberlauf entfernt
                        tracing::warn!(peer = %peer_addr, participant = %participant, "Send-Queue uebergelaufen – Verbindung wird getrennt");
                        break;
                    };
                    if let Err(e) = framed.send(nachricht).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Broadcast-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping und Timeout-Pruefung
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                        break;
                    }
                    let ts = chrono::Utc::now().timestamp_millis().max(0) as u64;
                    if let Err(e) = framed.send(SignalMessage::ping(ts)).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = SignalMessage::error(
                            None,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break;
                    }
                }
            }
        }

        dispatcher.client_cleanup(&mut ctx).await;
        tracing::info!(peer = %peer_addr, participant = %participant, "Verbindungs-Task beendet");
    }
}
