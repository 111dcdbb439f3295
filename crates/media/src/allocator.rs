//! Vergabe von ICE- und DTLS-Parametern
//!
//! Die Werte sind fuer den Kern opak: ICE-Credentials stammen aus
//! UUIDv4-Material, der DTLS-Fingerprint ist ein SHA-256 ueber zufaellige
//! Bytes. Kandidaten-Ports werden reihum aus dem konfigurierten Bereich
//! vergeben.

use nexus_protocol::params::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters,
};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

/// Prioritaet eines UDP-Host-Kandidaten
const HOST_PRIORITAET: u32 = 1_076_302_079;

/// Netzwerkparameter fuer Transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConfig {
    /// IP-Adresse, die Clients in ICE-Kandidaten sehen
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 49999,
        }
    }
}

/// Erzeugt Transportparameter, thread-safe
#[derive(Debug)]
pub struct ParameterAllocator {
    config: MediaConfig,
    port_zaehler: AtomicU32,
}

impl ParameterAllocator {
    pub fn neu(config: MediaConfig) -> Self {
        Self {
            config,
            port_zaehler: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn ice_parameter(&self) -> IceParameters {
        let ufrag = Uuid::new_v4().simple().to_string();
        IceParameters {
            username_fragment: ufrag[..16].to_string(),
            password: format!(
                "{}{}",
                Uuid::new_v4().simple(),
                Uuid::new_v4().simple()
            ),
            ice_lite: true,
        }
    }

    pub fn ice_kandidaten(&self) -> Vec<IceCandidate> {
        vec![IceCandidate {
            foundation: "udpcandidate".to_string(),
            priority: HOST_PRIORITAET,
            ip: self.config.announced_ip.clone(),
            port: self.naechster_port(),
            protocol: "udp".to_string(),
            candidate_type: "host".to_string(),
        }]
    }

    pub fn dtls_parameter(&self) -> DtlsParameters {
        let digest = Sha256::digest(Uuid::new_v4().as_bytes());
        let wert = digest
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");
        DtlsParameters {
            role: DtlsRole::Auto,
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".to_string(),
                value: wert,
            }],
        }
    }

    fn naechster_port(&self) -> u16 {
        let min = self.config.rtc_min_port.min(self.config.rtc_max_port) as u32;
        let max = self.config.rtc_min_port.max(self.config.rtc_max_port) as u32;
        let bereich = max - min + 1;
        let n = self.port_zaehler.fetch_add(1, Ordering::Relaxed) % bereich;
        (min + n) as u16
    }
}

impl Default for ParameterAllocator {
    fn default() -> Self {
        Self::neu(MediaConfig::default())
    }
}
