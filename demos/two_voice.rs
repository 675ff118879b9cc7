//! Demo: Two Voices and Cross-Modulation
//!
//! Plays the same chord through each modulation mode and prints the level and
//! the wiring the engine built for it.
//!
//! Run with: cargo run --example two_voice

use duosynth::prelude::*;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let sample_rate = 44100.0;
    let config = EngineConfig::default().with_sample_rate(sample_rate);

    let mut snapshot = SynthSnapshot::default();
    snapshot.voice1.fat = true;
    snapshot.voice2.semitone = 7;
    snapshot.modulation.amount = 60.0;

    let mut engine = match SynthEngine::new(config, &snapshot) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to start engine: {}", err);
            return;
        }
    };

    println!("=== Two-Voice Modulation Demo ===\n");

    for mode in ModulationType::ALL {
        snapshot.modulation.modulation_type = mode;
        engine.apply_snapshot(&snapshot);

        for note in ["C3", "G3", "C4"] {
            engine.note_on(note, Some(0.8), None);
        }

        // Half a second held, then released
        let mut block = vec![0.0f32; (sample_rate / 2.0) as usize];
        engine.render(&mut block);
        let peak = block.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        engine.release_all();
        engine.render(&mut block);

        println!("--- {} (peak {:.3}) ---", mode, peak);
        for (from, to) in engine.patch().named_edges() {
            println!("  {:<28} -> {}", from, to);
        }
        println!();
    }

    engine.shutdown();
}
