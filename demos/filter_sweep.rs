//! Demo: Envelope-Driven Filter Sweep
//!
//! Routes voice 2's envelope to the filter cutoff and plays an overlapping
//! phrase. The filter sweeps once per phrase, not once per note, which the
//! spectrum centroid printout makes visible.
//!
//! Run with: cargo run --example filter_sweep

use duosynth::prelude::*;

fn spectral_centroid(spectrum: &[f32], sample_rate: f64) -> f64 {
    let bin_width = sample_rate / (spectrum.len() * 2) as f64;
    let (weighted, total) = spectrum
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(weighted, total), (bin, &db)| {
            let magnitude = 10f64.powf(f64::from(db) / 20.0);
            (weighted + magnitude * bin as f64 * bin_width, total + magnitude)
        });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let sample_rate = 44100.0;
    let config = EngineConfig {
        sample_rate,
        analyser_mode: AnalyserMode::Fft,
        ..EngineConfig::default()
    };

    let mut snapshot = SynthSnapshot::default();
    snapshot.envelope_destination = EnvelopeDestination::FilterCutoff;
    snapshot.filter.frequency = 400.0;
    snapshot.filter.q = 6.0;
    snapshot.filter.envelope_amount = 60.0;
    snapshot.filter.distortion_enabled = true;
    snapshot.filter.distortion_curve = DistortionCurve::Soft;
    snapshot.voice2.envelope = Adsr::new(0.3, 0.8, 0.2, 1.0);

    let mut engine = match SynthEngine::new(config, &snapshot) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to start engine: {}", err);
            return;
        }
    };

    println!("=== Filter Sweep Demo ===\n");
    println!("Time(s) | Held | Centroid (Hz)");
    println!("--------|------|--------------");

    // (time in 100 ms steps, note, on)
    let phrase = [
        (0, "A2", true),
        (3, "C3", true),
        (5, "A2", false),
        (7, "E3", true),
        (9, "C3", false),
        (12, "E3", false),
    ];

    let step = (sample_rate / 10.0) as usize;
    let mut block = vec![0.0f32; step];
    for tick in 0..25 {
        for &(at, note, on) in &phrase {
            if at == tick {
                if on {
                    engine.note_on(note, None, None);
                } else {
                    engine.note_off(note, None);
                }
            }
        }

        engine.render(&mut block);
        let centroid = spectral_centroid(&engine.analysis().read(), sample_rate);
        println!(
            "{:>7.1} | {:>4} | {:>12.0}",
            tick as f64 / 10.0,
            engine.coordinator().active_count(),
            centroid
        );
    }

    println!(
        "\nShared envelope: {} attack(s), {} release(s)",
        engine.coordinator().attacks_fired(),
        engine.coordinator().releases_fired()
    );

    engine.shutdown();
}
