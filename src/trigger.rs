//! Envelope Trigger Coordinator
//!
//! Wraps note events for both voices. While voice 2's envelope drives the
//! filter, the coordinator keeps the set of held notes and fires the shared
//! filter envelope only on the empty→non-empty and non-empty→empty edges of
//! that set, so chords and legato playing sweep the filter once. Notes the
//! voices steal to make room drop out of the set.

use crate::filter_routing::{FilterRoutingController, RoutingState};
use crate::graph::Patch;
use crate::note::{Note, ScheduleTime};
use crate::voice::VoiceEngine;
use std::collections::BTreeSet;

/// Tracks held notes and gates the shared filter envelope
#[derive(Debug, Default)]
pub struct EnvelopeTriggerCoordinator {
    active: BTreeSet<Note>,
    attacks_fired: u64,
    releases_fired: u64,
}

impl EnvelopeTriggerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct notes currently held in shared mode
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, note: &Note) -> bool {
        self.active.contains(note)
    }

    /// Shared-envelope attacks fired since creation
    pub fn attacks_fired(&self) -> u64 {
        self.attacks_fired
    }

    /// Shared-envelope releases fired since creation
    pub fn releases_fired(&self) -> u64 {
        self.releases_fired
    }

    pub fn note_on(
        &mut self,
        patch: &mut Patch,
        voices: &[VoiceEngine],
        routing: &FilterRoutingController,
        note: &Note,
        velocity: Option<f64>,
        time: Option<ScheduleTime>,
    ) {
        for voice in voices {
            voice.note_on(patch, note, velocity, time);
        }

        if routing.state() != RoutingState::FilterDriven {
            return;
        }

        let was_empty = self.active.is_empty();
        if self.active.insert(note.clone()) && was_empty {
            routing.trigger_attack(patch, time);
            self.attacks_fired += 1;
        }

        // Notes stolen by the voices no longer count as held
        let patch: &Patch = patch;
        self.active
            .retain(|held| voices.iter().any(|voice| voice.holds_note(patch, held)));
    }

    pub fn note_off(
        &mut self,
        patch: &mut Patch,
        voices: &[VoiceEngine],
        routing: &FilterRoutingController,
        note: &Note,
        time: Option<ScheduleTime>,
    ) {
        for voice in voices {
            voice.note_off(patch, note, time);
        }

        if routing.state() != RoutingState::FilterDriven {
            return;
        }

        if self.active.remove(note) && self.active.is_empty() {
            routing.trigger_release(patch, time);
            self.releases_fired += 1;
        }
    }

    /// Clear the held set and force-release every voice and the shared envelope
    pub fn release_all(
        &mut self,
        patch: &mut Patch,
        voices: &[VoiceEngine],
        routing: &FilterRoutingController,
    ) {
        for voice in voices {
            voice.release_all(patch);
        }
        self.reset(patch, routing);
    }

    /// Forget held notes and close the shared envelope
    ///
    /// Used when the envelope stops driving the filter, so that a later return
    /// to shared mode starts from an empty set.
    pub fn reset(&mut self, patch: &mut Patch, routing: &FilterRoutingController) {
        self.active.clear();
        routing.release_envelope(patch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvelopeDestination, VoiceConfig};

    struct Rig {
        patch: Patch,
        voices: Vec<VoiceEngine>,
        routing: FilterRoutingController,
        coordinator: EnvelopeTriggerCoordinator,
    }

    impl Rig {
        fn new(destination: EnvelopeDestination) -> Self {
            Self::with_polyphony(destination, 8)
        }

        fn with_polyphony(destination: EnvelopeDestination, max_polyphony: usize) -> Self {
            let mut patch = Patch::new(44100.0);
            let voices = vec![
                VoiceEngine::new(&mut patch, "voice1", max_polyphony).unwrap(),
                VoiceEngine::new(&mut patch, "voice2", max_polyphony).unwrap(),
            ];
            let mut routing = FilterRoutingController::new(&mut patch, 256).unwrap();
            routing
                .set_destination(&mut patch, destination, &voices[1], &VoiceConfig::default())
                .unwrap();
            Self {
                patch,
                voices,
                routing,
                coordinator: EnvelopeTriggerCoordinator::new(),
            }
        }

        fn on(&mut self, name: &str) {
            let note = Note::parse(name).unwrap();
            self.coordinator
                .note_on(&mut self.patch, &self.voices, &self.routing, &note, None, None);
        }

        fn off(&mut self, name: &str) {
            let note = Note::parse(name).unwrap();
            self.coordinator
                .note_off(&mut self.patch, &self.voices, &self.routing, &note, None);
        }

        fn release_all(&mut self) {
            self.coordinator
                .release_all(&mut self.patch, &self.voices, &self.routing);
        }
    }

    #[test]
    fn test_overlapping_notes_fire_once() {
        let mut rig = Rig::new(EnvelopeDestination::FilterCutoff);
        rig.on("C4");
        rig.on("E4");
        rig.off("C4");
        assert!(rig.routing.envelope_open(&rig.patch));
        rig.off("E4");

        assert_eq!(rig.coordinator.attacks_fired(), 1);
        assert_eq!(rig.coordinator.releases_fired(), 1);
        assert!(!rig.routing.envelope_open(&rig.patch));
    }

    #[test]
    fn test_count_tracks_distinct_held_notes() {
        let mut rig = Rig::new(EnvelopeDestination::FilterCutoff);
        let events: &[(&str, bool)] = &[
            ("C4", true),
            ("C4", true),
            ("D4", true),
            ("F4", false),
            ("C4", false),
            ("C4", false),
            ("D4", false),
            ("D4", false),
            ("G4", true),
        ];

        let mut held = BTreeSet::new();
        for &(name, on) in events {
            if on {
                rig.on(name);
                held.insert(name);
            } else {
                rig.off(name);
                held.remove(name);
            }
            assert_eq!(rig.coordinator.active_count(), held.len());
        }
        assert_eq!(rig.coordinator.attacks_fired(), 2);
        assert_eq!(rig.coordinator.releases_fired(), 1);
    }

    #[test]
    fn test_stolen_notes_leave_active_set() {
        let mut rig = Rig::with_polyphony(EnvelopeDestination::FilterCutoff, 2);
        for name in ["C4", "E4", "G4", "B4"] {
            rig.on(name);
            let held = rig.voices[0].held_notes(&rig.patch);
            assert!(rig.coordinator.active_count() <= held);
        }
        assert_eq!(rig.coordinator.active_count(), 2);
        assert!(!rig.coordinator.is_active(&Note::parse("C4").unwrap()));
        assert!(rig.coordinator.is_active(&Note::parse("B4").unwrap()));

        // Releasing the surviving notes closes the shared envelope
        rig.off("G4");
        rig.off("B4");
        assert_eq!(rig.coordinator.releases_fired(), 1);
        assert!(!rig.routing.envelope_open(&rig.patch));

        // A stolen note's late release is ignored
        rig.off("C4");
        assert_eq!(rig.coordinator.releases_fired(), 1);
    }

    #[test]
    fn test_voice_amplitude_mode_passes_through() {
        let mut rig = Rig::new(EnvelopeDestination::VoiceAmplitude);
        rig.on("C4");
        rig.on("E4");
        assert_eq!(rig.coordinator.active_count(), 0);
        assert_eq!(rig.coordinator.attacks_fired(), 0);
        assert!(!rig.routing.envelope_open(&rig.patch));

        for voice in &rig.voices {
            assert_eq!(voice.held_notes(&rig.patch), 2);
        }
    }

    #[test]
    fn test_release_all_then_fresh_note() {
        let mut rig = Rig::new(EnvelopeDestination::FilterCutoff);
        rig.on("C4");
        rig.on("E4");
        rig.release_all();

        assert_eq!(rig.coordinator.active_count(), 0);
        assert!(!rig.routing.envelope_open(&rig.patch));
        for voice in &rig.voices {
            assert_eq!(voice.held_notes(&rig.patch), 0);
        }

        rig.on("A3");
        assert_eq!(rig.coordinator.active_count(), 1);
        assert_eq!(rig.coordinator.attacks_fired(), 2);
        assert!(rig.routing.envelope_open(&rig.patch));
    }

    #[test]
    fn test_unmatched_note_off_ignored() {
        let mut rig = Rig::new(EnvelopeDestination::FilterCutoff);
        rig.off("B2");
        assert_eq!(rig.coordinator.active_count(), 0);
        assert_eq!(rig.coordinator.releases_fired(), 0);
    }
}
