//! Unit-Tests fuer Profil-Updates

use crate::error::ChatError;
use crate::profile::{anwenden, profil_aktualisieren, update_parsen};
use crate::types::{Profil, ProfileUpdate};

fn profil() -> Profil {
    Profil {
        username: "DevUser".into(),
        avatar: String::new(),
    }
}

#[test]
fn username_wird_uebernommen() {
    let neu = profil_aktualisieren(&profil(), r#"{"username": "  Alice  "}"#).unwrap();
    assert_eq!(neu.username, "Alice");
    assert_eq!(neu.avatar, "");
}

#[test]
fn avatar_allein_ist_erlaubt() {
    let neu = profil_aktualisieren(&profil(), r#"{"avatar": "https://cdn.example/a.png"}"#).unwrap();
    assert_eq!(neu.username, "DevUser");
    assert_eq!(neu.avatar, "https://cdn.example/a.png");
}

#[test]
fn unbekanntes_feld_wird_abgelehnt() {
    let err = update_parsen(r#"{"username": "x", "isAdmin": true}"#).unwrap_err();
    match err {
        ChatError::UnknownField(feld) => assert_eq!(feld, "isAdmin"),
        andere => panic!("UnknownField erwartet, bekommen: {:?}", andere),
    }
}

#[test]
fn leeres_update_wird_abgelehnt() {
    assert!(matches!(
        profil_aktualisieren(&profil(), "{}"),
        Err(ChatError::UngueltigeEingabe(_))
    ));
}

#[test]
fn leerer_oder_zu_langer_name() {
    let leer = ProfileUpdate {
        username: Some("   ".into()),
        avatar: None,
    };
    assert!(anwenden(&profil(), leer).is_err());

    let lang = ProfileUpdate {
        username: Some("x".repeat(33)),
        avatar: None,
    };
    assert!(anwenden(&profil(), lang).is_err());
}

#[test]
fn kaputtes_json_ist_ungueltig() {
    assert!(matches!(
        update_parsen("{username"),
        Err(ChatError::UngueltigeEingabe(_))
    ));
}
