//! Reihenfolge von ICE-Kandidaten
//!
//! Kandidaten einer Aushandlung tragen `(generation, sequence)`. Der
//! `IceCandidateSequencer` gibt sie strikt in dieser Reihenfolge frei:
//! vorgezogene Kandidaten werden gepuffert, veraltete Generationen und
//! Duplikate verworfen. Eine hoehere Generation (ICE-Restart) ersetzt die
//! laufende vollstaendig. Kandidaten ohne `sequence` bekommen die naechste
//! freie Nummer und sind damit in Ankunftsreihenfolge.

use std::collections::BTreeMap;

/// Maximale Anzahl gepufferter Kandidaten pro Aushandlung
pub const MAX_GEPUFFERT: usize = 64;

/// Ergebnis der Einordnung eines Kandidaten
#[derive(Debug, PartialEq, Eq)]
pub enum Einordnung<T> {
    /// Diese Kandidaten sind jetzt in Reihenfolge zustellbar
    Freigegeben(Vec<T>),
    /// Kandidat wartet auf Vorgaenger
    Gepuffert,
    /// Veraltet, doppelt oder Puffer voll
    Verworfen,
}

/// Sortiert ICE-Kandidaten einer einzelnen Aushandlung
#[derive(Debug)]
pub struct IceCandidateSequencer<T> {
    generation: u32,
    naechste_sequenz: u64,
    puffer: BTreeMap<u64, T>,
}

impl<T> IceCandidateSequencer<T> {
    pub fn new() -> Self {
        Self {
            generation: 0,
            naechste_sequenz: 0,
            puffer: BTreeMap::new(),
        }
    }

    /// Aktuelle Generation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Anzahl wartender Kandidaten
    pub fn gepuffert(&self) -> usize {
        self.puffer.len()
    }

    /// Ordnet einen Kandidaten ein
    pub fn einordnen(&mut self, generation: u32, sequenz: Option<u64>, kandidat: T) -> Einordnung<T> {
        if generation < self.generation {
            return Einordnung::Verworfen;
        }

        if generation > self.generation {
            self.generation = generation;
            self.naechste_sequenz = 0;
            self.puffer.clear();
        }

        let sequenz = sequenz.unwrap_or(self.naechste_sequenz);
        if sequenz < self.naechste_sequenz || self.puffer.contains_key(&sequenz) {
            return Einordnung::Verworfen;
        }

        if sequenz > self.naechste_sequenz {
            if self.puffer.len() >= MAX_GEPUFFERT {
                return Einordnung::Verworfen;
            }
            self.puffer.insert(sequenz, kandidat);
            return Einordnung::Gepuffert;
        }

        let mut frei = vec![kandidat];
        self.naechste_sequenz += 1;
        while let Some(k) = self.puffer.remove(&self.naechste_sequenz) {
            frei.push(k);
            self.naechste_sequenz += 1;
        }
        Einordnung::Freigegeben(frei)
    }
}

impl<T> Default for IceCandidateSequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_reihenfolge_sofort_frei() {
        let mut s = IceCandidateSequencer::new();
        assert_eq!(s.einordnen(0, Some(0), "a"), Einordnung::Freigegeben(vec!["a"]));
        assert_eq!(s.einordnen(0, Some(1), "b"), Einordnung::Freigegeben(vec!["b"]));
    }

    #[test]
    fn luecke_wird_gepuffert_und_dann_geschlossen() {
        let mut s = IceCandidateSequencer::new();
        assert_eq!(s.einordnen(0, Some(2), "c"), Einordnung::Gepuffert);
        assert_eq!(s.einordnen(0, Some(1), "b"), Einordnung::Gepuffert);
        assert_eq!(s.gepuffert(), 2);
        assert_eq!(
            s.einordnen(0, Some(0), "a"),
            Einordnung::Freigegeben(vec!["a", "b", "c"])
        );
        assert_eq!(s.gepuffert(), 0);
    }

    #[test]
    fn duplikate_und_alte_generation_verworfen() {
        let mut s = IceCandidateSequencer::new();
        s.einordnen(1, Some(0), "x");
        assert_eq!(s.einordnen(1, Some(0), "x"), Einordnung::Verworfen);
        assert_eq!(s.einordnen(0, Some(5), "alt"), Einordnung::Verworfen);
    }

    #[test]
    fn neue_generation_ersetzt_puffer() {
        let mut s = IceCandidateSequencer::new();
        assert_eq!(s.einordnen(0, Some(3), "alt"), Einordnung::Gepuffert);
        assert_eq!(s.einordnen(1, Some(0), "neu"), Einordnung::Freigegeben(vec!["neu"]));
        assert_eq!(s.generation(), 1);
        assert_eq!(s.gepuffert(), 0);
    }

    #[test]
    fn ohne_nummer_in_ankunftsreihenfolge() {
        let mut s = IceCandidateSequencer::new();
        for k in ["a", "b", "c"] {
            assert_eq!(s.einordnen(0, None, k), Einordnung::Freigegeben(vec![k]));
        }

        // Eine fehlende Nummer schliesst eine Luecke vor gepufferten Kandidaten
        let mut s = IceCandidateSequencer::new();
        assert_eq!(s.einordnen(0, Some(1), "b"), Einordnung::Gepuffert);
        assert_eq!(
            s.einordnen(0, None, "a"),
            Einordnung::Freigegeben(vec!["a", "b"])
        );
    }

    #[test]
    fn puffer_begrenzt() {
        let mut s = IceCandidateSequencer::new();
        for i in 1..=MAX_GEPUFFERT as u64 {
            assert_eq!(s.einordnen(0, Some(i), i), Einordnung::Gepuffert);
        }
        assert_eq!(s.einordnen(0, Some(1000), 1000), Einordnung::Verworfen);
    }
}
