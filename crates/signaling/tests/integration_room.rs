//! Integration-Tests fuer Raum-Actor, Call-Session und Bildschirmfreigabe
//!
//! Laufen mit pausierter tokio-Uhr; Timer-Ereignisse werden dadurch
//! deterministisch.

use nexus_core::types::{ParticipantId, RoomId, TransportId};
use nexus_core::NexusError;
use nexus_media::MediaConfig;
use nexus_protocol::params::{DtlsFingerprint, DtlsParameters, DtlsRole, MediaKind, TransportDirection};
use nexus_protocol::signal::{CallState, ErrorCode, SignalMessage, SignalPayload};
use nexus_signaling::{CallEvent, RoomHandle, SignalingConfig, SignalingError, SignalingState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;

struct Teilnehmer {
    id: ParticipantId,
    rx: mpsc::Receiver<SignalMessage>,
}

fn state() -> Arc<SignalingState> {
    SignalingState::neu(SignalingConfig::default(), MediaConfig::default())
}

fn teilnehmer(state: &SignalingState) -> Teilnehmer {
    let id = ParticipantId::new();
    let rx = state.broadcaster.client_registrieren(id);
    Teilnehmer { id, rx }
}

fn dtls() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".into(),
            value: "AB:CD".into(),
        }],
    }
}

/// Liest bis zur ersten Nachricht des gesuchten Typs
fn suchen(rx: &mut mpsc::Receiver<SignalMessage>, typ: &str) -> Option<SignalMessage> {
    while let Ok(n) = rx.try_recv() {
        if n.payload.typ() == typ {
            return Some(n);
        }
    }
    None
}

fn ereignisse(rx: &mut broadcast::Receiver<CallEvent>) -> Vec<CallEvent> {
    let mut alle = Vec::new();
    while let Ok(e) = rx.try_recv() {
        alle.push(e);
    }
    alle
}

/// Legt Send- und Receive-Transport an und verbindet beide
async fn transports_aufbauen(h: &RoomHandle, t: &mut Teilnehmer) -> (TransportId, TransportId) {
    let mut ids = Vec::new();
    for direction in [TransportDirection::Send, TransportDirection::Receive] {
        h.signal(t.id, SignalPayload::CreateTransport { direction })
            .await
            .unwrap();
        h.snapshot().await.unwrap();
        let Some(SignalMessage {
            payload: SignalPayload::TransportCreated(desc),
            ..
        }) = suchen(&mut t.rx, "transport-created")
        else {
            panic!("transport-created erwartet");
        };
        h.signal(
            t.id,
            SignalPayload::ConnectTransport {
                transport_id: desc.id,
                dtls_parameters: dtls(),
            },
        )
        .await
        .unwrap();
        ids.push(desc.id);
    }
    h.snapshot().await.unwrap();
    (ids[0], ids[1])
}

async fn verbundener_anruf(state: &SignalingState, a: &Teilnehmer, b: &Teilnehmer) -> RoomHandle {
    let room = RoomId::from("raum-1");
    let h = state.rooms.beitreten(&room, a.id).await.unwrap();
    state.rooms.beitreten(&room, b.id).await.unwrap();
    h.start_call(a.id).await.unwrap();
    h.remote_accept(b.id).await.unwrap();
    h
}

#[tokio::test(start_paused = true)]
async fn dauer_zaehlt_ab_annahme() {
    let state = state();
    let a = teilnehmer(&state);
    let b = teilnehmer(&state);
    let room = RoomId::from("raum-1");

    let h = state.rooms.beitreten(&room, a.id).await.unwrap();
    state.rooms.beitreten(&room, b.id).await.unwrap();
    h.start_call(a.id).await.unwrap();
    assert_eq!(h.snapshot().await.unwrap().status, CallState::Calling);

    sleep(Duration::from_secs(2)).await;
    h.remote_accept(b.id).await.unwrap();

    sleep(Duration::from_millis(3500)).await;
    let snap = h.snapshot().await.unwrap();
    assert_eq!(snap.status, CallState::Connected);
    assert_eq!(snap.duration, 3);
    assert_eq!(snap.participants.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn status_wird_beobachtbar_veroeffentlicht() {
    let state = state();
    let a = teilnehmer(&state);
    let b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;

    let mut status = h.status_abonnieren();
    sleep(Duration::from_millis(1500)).await;
    status.changed().await.unwrap();
    let snap = status.borrow_and_update().clone();
    assert_eq!(snap.status, CallState::Connected);
    assert_eq!(snap.duration, 1);
}

#[tokio::test(start_paused = true)]
async fn nicht_angenommen_genau_einmal_verpasst() {
    let state = state();
    let mut bus = state.call_events_abonnieren();
    let mut a = teilnehmer(&state);
    let room = RoomId::from("raum-1");

    let h = state.rooms.beitreten(&room, a.id).await.unwrap();
    h.start_call(a.id).await.unwrap();

    sleep(Duration::from_secs(29)).await;
    assert_eq!(h.snapshot().await.unwrap().status, CallState::Calling);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(h.snapshot().await.unwrap().status, CallState::Idle);

    let verpasst = ereignisse(&mut bus)
        .into_iter()
        .filter(|e| matches!(e, CallEvent::Verpasst { .. }))
        .count();
    assert_eq!(verpasst, 1);
    assert!(suchen(&mut a.rx, "call-missed").is_some());
    // Reine Benachrichtigung, keine Fehlermeldung
    assert!(suchen(&mut a.rx, "error").is_none());

    // Verspaetete Annahme aendert nichts
    let err = h.remote_accept(a.id).await.unwrap_err();
    assert!(matches!(err, SignalingError::Kern(NexusError::NotRinging(_))));
    assert_eq!(h.snapshot().await.unwrap().status, CallState::Idle);
}

#[tokio::test(start_paused = true)]
async fn anrufer_kann_nicht_selbst_annehmen() {
    let state = state();
    let mut bus = state.call_events_abonnieren();
    let a = teilnehmer(&state);
    let b = teilnehmer(&state);
    let room = RoomId::from("raum-1");

    let h = state.rooms.beitreten(&room, a.id).await.unwrap();
    state.rooms.beitreten(&room, b.id).await.unwrap();
    h.start_call(a.id).await.unwrap();

    let err = h.remote_accept(a.id).await.unwrap_err();
    assert!(matches!(err, SignalingError::Kern(NexusError::NotRinging(_))));
    assert_eq!(h.snapshot().await.unwrap().status, CallState::Calling);
    assert!(!ereignisse(&mut bus)
        .iter()
        .any(|e| matches!(e, CallEvent::Verbunden { .. })));

    h.remote_accept(b.id).await.unwrap();
    assert_eq!(h.snapshot().await.unwrap().status, CallState::Connected);
}

#[tokio::test(start_paused = true)]
async fn zweiter_anruf_wird_abgelehnt() {
    let state = state();
    let a = teilnehmer(&state);
    let b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;

    let err = h.start_call(b.id).await.unwrap_err();
    assert!(matches!(err, SignalingError::Kern(NexusError::AlreadyInCall(_))));
    assert_eq!(h.snapshot().await.unwrap().status, CallState::Connected);
}

#[tokio::test(start_paused = true)]
async fn auflegen_raeumt_alle_medien_ab() {
    let state = state();
    let mut bus = state.call_events_abonnieren();
    let mut a = teilnehmer(&state);
    let mut b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;

    let (send_a, _) = transports_aufbauen(&h, &mut a).await;
    transports_aufbauen(&h, &mut b).await;

    h.signal(
        a.id,
        SignalPayload::Produce {
            transport_id: send_a,
            kind: MediaKind::Audio,
            rtp_parameters: json!({"codecs": []}),
        },
    )
    .await
    .unwrap();
    h.snapshot().await.unwrap();

    let Some(SignalMessage {
        payload: SignalPayload::NewProducer { producer_id, .. },
        sender_id,
        ..
    }) = suchen(&mut b.rx, "new-producer")
    else {
        panic!("new-producer erwartet");
    };
    assert_eq!(sender_id, Some(a.id));

    h.signal(b.id, SignalPayload::Consume { producer_id })
        .await
        .unwrap();
    h.snapshot().await.unwrap();
    assert!(suchen(&mut b.rx, "consumed").is_some());

    let stat = state.registry.statistik();
    assert_eq!((stat.transports, stat.producers, stat.consumers), (4, 1, 1));

    sleep(Duration::from_millis(2500)).await;
    h.hangup(b.id).await.unwrap();

    let stat = state.registry.statistik();
    assert_eq!((stat.transports, stat.producers, stat.consumers), (0, 0, 0));
    let snap = h.snapshot().await.unwrap();
    assert_eq!((snap.status, snap.duration), (CallState::Idle, 0));
    assert!(ereignisse(&mut bus).contains(&CallEvent::Beendet {
        room_id: RoomId::from("raum-1"),
        dauer: 2,
    }));
}

#[tokio::test(start_paused = true)]
async fn veraltete_nachricht_nach_abbau_wird_verworfen() {
    let state = state();
    let mut bus = state.call_events_abonnieren();
    let mut a = teilnehmer(&state);
    let b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;

    let (send_a, _) = transports_aufbauen(&h, &mut a).await;
    h.hangup(a.id).await.unwrap();
    while a.rx.try_recv().is_ok() {}

    // ConnectTransport auf einen geschlossenen Transport
    h.signal(
        a.id,
        SignalPayload::ConnectTransport {
            transport_id: send_a,
            dtls_parameters: dtls(),
        },
    )
    .await
    .unwrap();
    h.snapshot().await.unwrap();

    assert!(suchen(&mut a.rx, "error").is_none(), "Protokollfehler gehen nicht an den Client");
    assert!(ereignisse(&mut bus).contains(&CallEvent::ProtokollfehlerVerworfen {
        room_id: RoomId::from("raum-1"),
        code: ErrorCode::UnknownTransport,
    }));
}

#[tokio::test(start_paused = true)]
async fn bildschirmfreigabe_ueber_den_client() {
    let state = state();
    let mut a = teilnehmer(&state);
    let mut b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;
    transports_aufbauen(&h, &mut a).await;

    let antwort = h.toggle_screen_share(a.id).await.unwrap();
    h.snapshot().await.unwrap();
    sleep(Duration::from_millis(10)).await;

    let Some(SignalMessage {
        payload: SignalPayload::CaptureRequest { request_id },
        ..
    }) = suchen(&mut a.rx, "capture-request")
    else {
        panic!("capture-request erwartet");
    };

    state.capture.zugesagt(a.id, request_id, json!({"codec": "vp8"}));
    assert_eq!(antwort.await.unwrap(), Ok(true));

    let snap = h.snapshot().await.unwrap();
    assert!(snap.screen_sharing);
    let Some(SignalMessage {
        payload: SignalPayload::NewProducer { producer_id, kind, .. },
        ..
    }) = suchen(&mut b.rx, "new-producer")
    else {
        panic!("new-producer erwartet");
    };
    assert_eq!(kind, MediaKind::Screen);

    // Client beendet die Aufnahme (z.B. Betriebssystem-Dialog)
    state.capture.beendet(a.id, request_id);
    sleep(Duration::from_millis(10)).await;
    let snap = h.snapshot().await.unwrap();
    assert!(!snap.screen_sharing);

    let Some(SignalMessage {
        payload: SignalPayload::ProducerClosed { producer_id: geschlossen },
        ..
    }) = suchen(&mut b.rx, "producer-closed")
    else {
        panic!("producer-closed erwartet");
    };
    assert_eq!(geschlossen, producer_id);
    assert_eq!(state.registry.statistik().producers, 0);
}

#[tokio::test(start_paused = true)]
async fn bildschirmfreigabe_abgelehnt() {
    let state = state();
    let mut a = teilnehmer(&state);
    let b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;
    transports_aufbauen(&h, &mut a).await;

    let antwort = h.toggle_screen_share(a.id).await.unwrap();
    h.snapshot().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    let Some(SignalMessage {
        payload: SignalPayload::CaptureRequest { request_id },
        ..
    }) = suchen(&mut a.rx, "capture-request")
    else {
        panic!("capture-request erwartet");
    };

    state.capture.abgelehnt(a.id, request_id);
    assert_eq!(antwort.await.unwrap(), Err(NexusError::CapturePermissionDenied));
    assert!(!h.snapshot().await.unwrap().screen_sharing);
    assert_eq!(state.registry.statistik().producers, 0);
}

#[tokio::test(start_paused = true)]
async fn bildschirmfreigabe_nur_verbunden() {
    let state = state();
    let a = teilnehmer(&state);
    let room = RoomId::from("raum-1");
    let h = state.rooms.beitreten(&room, a.id).await.unwrap();

    let antwort = h.toggle_screen_share(a.id).await.unwrap();
    assert!(matches!(antwort.await.unwrap(), Err(NexusError::NotConnected(_))));
}

#[tokio::test(start_paused = true)]
async fn raum_schliesst_wenn_leer() {
    let state = state();
    let mut bus = state.call_events_abonnieren();
    let a = teilnehmer(&state);
    let room = RoomId::from("raum-1");

    let h = state.rooms.beitreten(&room, a.id).await.unwrap();
    h.start_call(a.id).await.unwrap();
    h.leave(a.id).await.unwrap();

    loop {
        match bus.recv().await.unwrap() {
            CallEvent::RaumGeschlossen { room_id } => {
                assert_eq!(room_id, room);
                break;
            }
            _ => continue,
        }
    }
    assert_eq!(state.rooms.anzahl(), 0);
    assert!(!state.registry.ist_aktiv(&room));
    assert!(matches!(h.snapshot().await, Err(SignalingError::RaumBeendet)));

    // Neuer Beitritt startet einen frischen Raum
    let neu = state.rooms.beitreten(&room, a.id).await.unwrap();
    assert_eq!(neu.snapshot().await.unwrap().status, CallState::Idle);
}

#[tokio::test(start_paused = true)]
async fn aushandlung_wird_weitergeleitet() {
    let state = state();
    let a = teilnehmer(&state);
    let mut b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;

    // Kandidat 1 kommt vor Kandidat 0 an
    for sequence in [1u64, 0] {
        h.signal(
            a.id,
            SignalPayload::IceCandidate {
                target: Some(b.id),
                candidate: json!({"candidate": format!("c{}", sequence)}),
                generation: 0,
                sequence: Some(sequence),
            },
        )
        .await
        .unwrap();
    }
    h.snapshot().await.unwrap();

    let mut reihenfolge = Vec::new();
    while let Some(n) = suchen(&mut b.rx, "ice-candidate") {
        assert_eq!(n.sender_id, Some(a.id));
        if let SignalPayload::IceCandidate { sequence, .. } = n.payload {
            reihenfolge.push(sequence);
        }
    }
    assert_eq!(reihenfolge, vec![Some(0), Some(1)]);
}

#[tokio::test(start_paused = true)]
async fn kandidaten_ohne_nummer_werden_alle_zugestellt() {
    let state = state();
    let a = teilnehmer(&state);
    let mut b = teilnehmer(&state);
    let h = verbundener_anruf(&state, &a, &b).await;

    for i in 0..3 {
        let json = format!(
            r#"{{"payload":{{"type":"ice-candidate","candidate":{{"candidate":"c{}","sdpMid":"0"}}}}}}"#,
            i
        );
        let nachricht = SignalMessage::from_json(&json).unwrap();
        h.signal(a.id, nachricht.payload).await.unwrap();
    }
    h.snapshot().await.unwrap();

    let mut zugestellt = Vec::new();
    while let Some(n) = suchen(&mut b.rx, "ice-candidate") {
        if let SignalPayload::IceCandidate { candidate, .. } = n.payload {
            zugestellt.push(candidate["candidate"].as_str().unwrap_or_default().to_string());
        }
    }
    assert_eq!(zugestellt, vec!["c0", "c1", "c2"]);
}
