//! Profil-Updates aus JSON
//!
//! Der Client schickt ein lose geformtes Objekt; angenommen werden nur
//! `username` und `avatar`.

use crate::error::{ChatError, ChatResult};
use crate::types::{Profil, ProfileUpdate, MAX_USERNAME_LAENGE};

/// Parst ein Update; unbekannte Felder werden als `UnknownField` gemeldet
pub fn update_parsen(json: &str) -> ChatResult<ProfileUpdate> {
    serde_json::from_str::<ProfileUpdate>(json).map_err(|e| {
        let text = e.to_string();
        match unbekanntes_feld(&text) {
            Some(feld) => ChatError::UnknownField(feld.to_string()),
            None => ChatError::ungueltig(text),
        }
    })
}

/// Wendet ein Update an und gibt das neue Profil zurueck
pub fn anwenden(profil: &Profil, update: ProfileUpdate) -> ChatResult<Profil> {
    if update.ist_leer() {
        return Err(ChatError::ungueltig("Profil-Update ohne Aenderung"));
    }

    let mut neu = profil.clone();
    if let Some(username) = update.username {
        let username = username.trim();
        if username.is_empty() {
            return Err(ChatError::ungueltig("Benutzername darf nicht leer sein"));
        }
        if username.chars().count() > MAX_USERNAME_LAENGE {
            return Err(ChatError::ungueltig(format!(
                "Benutzername zu lang (Maximum: {} Zeichen)",
                MAX_USERNAME_LAENGE
            )));
        }
        neu.username = username.to_string();
    }
    if let Some(avatar) = update.avatar {
        neu.avatar = avatar;
    }

    tracing::debug!(username = %neu.username, "Profil aktualisiert");
    Ok(neu)
}

/// Parst und wendet in einem Schritt an
pub fn profil_aktualisieren(profil: &Profil, json: &str) -> ChatResult<Profil> {
    anwenden(profil, update_parsen(json)?)
}

// serde_json meldet: "unknown field `xyz`, expected ..."
fn unbekanntes_feld(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("unknown field `")?;
    rest.split('`').next()
}
